use std::time::Duration;

use serde::Deserialize;

use crate::Result;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
struct EngineConfigFile {
    base_url: String,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

/// Engine configuration: where the device lives and how eagerly to poll it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the device's web server, e.g. `http://192.168.4.1/`.
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn new(base_url: &str) -> Self {
        EngineConfig {
            base_url: base_url.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl From<EngineConfigFile> for EngineConfig {
    fn from(t: EngineConfigFile) -> Self {
        EngineConfig {
            base_url: t.base_url,
            poll_interval: Duration::from_millis(
                t.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            request_timeout: Duration::from_millis(
                t.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
        }
    }
}

pub fn engine_config_from_toml_str(s: &str) -> Result<EngineConfig> {
    let parsed: EngineConfigFile = toml::from_str(s)?;
    Ok(EngineConfig::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = engine_config_from_toml_str(
            r#"
            base_url = "http://192.168.4.1/"
            poll_interval_ms = 250
            request_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://192.168.4.1/");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn missing_intervals_fall_back_to_defaults() {
        let config = engine_config_from_toml_str(r#"base_url = "http://device.local/""#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(engine_config_from_toml_str("base_url = ").is_err());
    }
}
