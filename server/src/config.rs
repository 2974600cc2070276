use shared::{DEFAULT_PORT, DEFAULT_SAVE_INTERVAL_SECS, DEFAULT_STATE_FILE};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for a [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to listen on
    pub host: String,
    /// Port to listen on. 0 picks a free port.
    pub port: u16,
    /// World file, relative to the working directory unless absolute
    pub state_file: PathBuf,
    /// How often a non-empty world is saved in the background
    pub save_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            save_interval: Duration::from_secs(DEFAULT_SAVE_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
