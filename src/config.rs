// Layered settings: defaults -> optional TOML file -> COINBOARD_* environment

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::market_data::adapters::coingecko::COINGECKO_BASE_URL;
use crate::market_data::CachePolicy;

pub const DEFAULT_CONFIG_FILE: &str = "coinboard.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    pub base_url: String,
    // None keeps the transport default
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub dedupe_in_flight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub log_filter: String,
    pub metrics_bind: String,
}

impl Settings {
    /// Load from `path` (or `coinboard.toml` if present) plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = defaults()?.add_source(file).add_source(
            Environment::with_prefix("COINBOARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::from_config(builder.build()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let built = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_config(built)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.ttl_secs",
                reason: "must be positive".to_string(),
            });
        }
        if !self.upstream.base_url.starts_with("http://") && !self.upstream.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "upstream.base_url",
                reason: format!("not an http(s) URL: {}", self.upstream.base_url),
            });
        }
        Ok(())
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            max_attempts: self.cache.max_attempts,
            base_delay: Duration::from_millis(self.cache.base_delay_ms),
            dedupe_in_flight: self.cache.dedupe_in_flight,
        }
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream.timeout_secs.map(Duration::from_secs)
    }
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.bind", "0.0.0.0:3000")?
        .set_default("upstream.base_url", COINGECKO_BASE_URL)?
        .set_default("cache.ttl_secs", 30i64)?
        .set_default("cache.max_attempts", 3i64)?
        .set_default("cache.base_delay_ms", 500i64)?
        .set_default("cache.dedupe_in_flight", true)?
        .set_default("telemetry.log_filter", "coinboard=info,tower_http=info")?
        .set_default("telemetry.metrics_bind", "0.0.0.0:9000")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cache_contract() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.cache_policy(), CachePolicy::default());
        assert_eq!(settings.upstream.base_url, COINGECKO_BASE_URL);
        assert_eq!(settings.upstream_timeout(), None);
        assert_eq!(settings.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [server]
            bind = "127.0.0.1:8080"

            [upstream]
            base_url = "http://localhost:9999/api/v3"
            timeout_secs = 10

            [cache]
            ttl_secs = 5
            dedupe_in_flight = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.bind, "127.0.0.1:8080");
        assert_eq!(settings.upstream_timeout(), Some(Duration::from_secs(10)));
        let policy = settings.cache_policy();
        assert_eq!(policy.ttl, Duration::from_secs(5));
        assert!(!policy.dedupe_in_flight);
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = Settings::from_toml_str("[cache]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "cache.max_attempts", .. }));
    }

    #[test]
    fn test_rejects_non_http_upstream() {
        let err = Settings::from_toml_str("[upstream]\nbase_url = \"ftp://example\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "upstream.base_url", .. }));
    }
}
