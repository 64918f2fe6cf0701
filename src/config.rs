use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::reqwest_client::{ReqwestHttpClient, DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_COUNT};
use crate::domain::{Result, TunnelError};

const APP_NAME: &str = "wire-http-tunnel";

/// Settings shared by both ends of the tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Stream name the server is mounted on and the client opens.
    pub stream_name: String,
    pub retry_count: u32,
    pub http_timeout_secs: u64,
    /// Tracing filter directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            stream_name: "tunnel".to_string(),
            retry_count: DEFAULT_RETRY_COUNT,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
            log_filter: "info".to_string(),
        }
    }
}

impl TunnelConfig {
    /// Loads from the platform configuration directory, writing defaults on first use.
    pub fn load() -> Result<Self> {
        confy::load(APP_NAME, None).map_err(|e| TunnelError::Config(format!("{}", e)))
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        confy::load_path(path).map_err(|e| TunnelError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Real HTTP client honouring the configured retry count and timeout.
    pub fn http_client(&self) -> Result<ReqwestHttpClient> {
        ReqwestHttpClient::with_settings(self.retry_count, self.http_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("wire-http-tunnel-{}.toml", Uuid::new_v4()))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = scratch_path();

        let config = TunnelConfig::load_path(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config, TunnelConfig::default());
        assert_eq!(config.http_timeout(), Duration::from_secs(120));
        assert_eq!(config.retry_count, 10);
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let path = scratch_path();
        std::fs::write(&path, "stream_name = \"http\"\nretry_count = 3\n").unwrap();

        let config = TunnelConfig::load_path(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.stream_name, "http");
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.log_filter, "info");
    }
}
