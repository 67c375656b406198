use std::env;
use std::path::PathBuf;

/// Coordinator configuration, loaded from environment variables.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub api_key: String,
    /// Outbound alert webhook. `None` turns the alert sink into a no-op.
    pub webhook_url: Option<String>,
    /// Root of the persistent state tree (`config/targets.json`, `db/…`).
    pub data_dir: PathBuf,
    /// Daily records older than this are pruned.
    pub retention_days: i64,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// `API_KEY` is required; everything else has a default. `SERVER_PORT`
    /// defaults to 3000, `DATA_DIR` to `./data`, `RETENTION_DAYS` to 400.
    pub fn load() -> Result<Self, String> {
        let api_key = env::var("API_KEY")
            .map_err(|_| "Missing required config: `API_KEY`".to_string())?;
        if api_key.trim().is_empty() {
            return Err("`API_KEY` must not be empty".to_string());
        }

        let port = match env::var("SERVER_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("`SERVER_PORT` is not a valid port: {raw}"))?,
            Err(_) => 3000,
        };

        let webhook_url = env::var("DISCORD_WEBHOOK")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let retention_days = match env::var("RETENTION_DAYS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| format!("`RETENTION_DAYS` is not a positive integer: {raw}"))?,
            Err(_) => 400,
        };

        Ok(ServerConfig {
            port,
            api_key,
            webhook_url,
            data_dir,
            retention_days,
        })
    }

    pub fn targets_path(&self) -> PathBuf {
        self.data_dir.join("config/targets.json")
    }

    pub fn agents_path(&self) -> PathBuf {
        self.data_dir.join("db/agents.json")
    }

    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join("db/results.json")
    }
}
