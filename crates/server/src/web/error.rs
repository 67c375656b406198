use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::persist::PersistError;
use crate::registry::RegistryError;
use crate::targets::TargetConfigError;

/// Request-layer errors. Each becomes a `{"success": false, "error": …}`
/// JSON response; none of them crash the coordinator.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Distinct from plain NotFound so agents know to re-register.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownAgent(id) => ApiError::UnknownAgent(id),
            RegistryError::Persist(e) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<TargetConfigError> for ApiError {
    fn from(err: TargetConfigError) -> Self {
        match err {
            TargetConfigError::Validation(msg) => ApiError::Validation(msg),
            TargetConfigError::Persist(e) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        ApiError::Storage(err.to_string())
    }
}
