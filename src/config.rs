use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { url: default_redis_url() }
    }
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }

/// The two deadline settings, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_timeout_ms")]
    pub match_request_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub match_acceptance_ms: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            match_request_ms: default_timeout_ms(),
            match_acceptance_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 { 30_000 }

impl MatchingSettings {
    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_request_ms)
    }

    pub fn acceptance_timeout(&self) -> Duration {
        Duration::from_millis(self.match_acceptance_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with MATCHPOOL_)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            // Add default config file
            .add_source(File::with_name("config/default").required(false))
            // Add local config file (for development overrides)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with MATCHPOOL_)
            // e.g., MATCHPOOL_SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("MATCHPOOL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("MATCHPOOL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply the plain REDIS_URL convention on top of the layered sources
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    // We check REDIS_URL first, then MATCHPOOL_REDIS__URL
    let redis_url = env::var("REDIS_URL")
        .or_else(|_| env::var("MATCHPOOL_REDIS__URL"))
        .ok();

    let mut builder = Config::builder().add_source(settings);

    if let Some(url) = redis_url {
        builder = builder.set_override("redis.url", url)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let matching = MatchingSettings::default();
        assert_eq!(matching.match_request_ms, 30_000);
        assert_eq!(matching.match_acceptance_ms, 30_000);
        assert_eq!(matching.match_timeout(), Duration::from_millis(30_000));
        assert_eq!(matching.acceptance_timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_default_redis() {
        assert_eq!(RedisSettings::default().url, "redis://127.0.0.1:6379");
    }
}
