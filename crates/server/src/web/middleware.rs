use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use storm_common::{AGENT_ID_HEADER, API_KEY_HEADER};

use crate::web::{error::ApiError, AppState};

/// Reject requests whose `x-api-key` does not match the shared secret.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.config.api_key.as_str()) {
        return Err(ApiError::Unauthorized(
            "missing or invalid api key".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

/// Pull the calling agent's id out of the `x-agent-id` header.
pub fn agent_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AGENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {AGENT_ID_HEADER} header")))
}
