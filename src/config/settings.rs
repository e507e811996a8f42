//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::app::store::DEFAULT_MAX_ITEMS;
use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// HTTP listener and protocol identity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Widget asset.
    #[serde(default)]
    pub widget: WidgetConfig,

    /// Item store limits.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.server.mcp_path;
        if !path.starts_with('/') || path == "/" || path.ends_with('/') {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid mcp_path '{path}'. Must start with '/', must not be '/' and must not end with '/'"
                ),
            });
        }

        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server name must not be empty".to_string(),
            });
        }

        if self.server.session_idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "session_idle_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.server.session_sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "session_sweep_interval_secs must be greater than zero".to_string(),
            });
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_body_bytes must be greater than zero".to_string(),
            });
        }

        if self.store.max_items == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_items must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Applies environment overrides.
    ///
    /// - `PORT`: listening port
    /// - `LOG_FORMAT`: `text` or `json`
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORT") {
            self.server.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "PORT", value })?;
        }

        if let Some(value) = lookup("LOG_FORMAT") {
            self.logging.format =
                LogFormat::parse(&value).ok_or(ConfigError::InvalidEnv {
                    name: "LOG_FORMAT",
                    value,
                })?;
        }

        Ok(())
    }
}

/// HTTP listener and protocol identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to. Overridden by the `PORT` environment variable.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the MCP endpoint is served on.
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,

    /// Server name reported by `initialize`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Server version reported by `initialize`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Sessions idle for longer than this are evicted.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    /// How often the idle sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub session_sweep_interval_secs: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mcp_path: default_mcp_path(),
            name: default_name(),
            version: default_version(),
            session_idle_timeout_secs: default_idle_timeout(),
            session_sweep_interval_secs: default_sweep_interval(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_mcp_path() -> String {
    "/mcp".to_string()
}

fn default_name() -> String {
    "my-app".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

const fn default_idle_timeout() -> u64 {
    30 * 60
}

const fn default_sweep_interval() -> u64 {
    60
}

const fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Widget asset configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetConfig {
    /// Pre-built widget HTML. The built-in widget is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Item store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum number of items held in memory.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
        }
    }
}

const fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses `text` (alias `pretty`) or `json`, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.mcp_path, "/mcp");
        assert_eq!(config.server.name, "my-app");
        assert_eq!(config.server.version, "0.1.0");
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "host": "127.0.0.1",
                "port": 8080,
                "mcp_path": "/agent/mcp",
                "name": "shopping-list",
                "version": "2.0.0",
                "session_idle_timeout_secs": 600,
                "session_sweep_interval_secs": 30,
                "max_body_bytes": 1024
            },
            "widget": {
                "path": "/srv/widget/index.html"
            },
            "store": {
                "max_items": 50
            },
            "logging": {
                "level": "debug",
                "format": "json"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.mcp_path, "/agent/mcp");
        assert_eq!(config.server.name, "shopping-list");
        assert_eq!(config.server.session_idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.server.session_sweep_interval(), Duration::from_secs(30));
        assert_eq!(
            config.widget.path,
            Some(PathBuf::from("/srv/widget/index.html"))
        );
        assert_eq!(config.store.max_items, 50);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.session_idle_timeout_secs, 1800);
        assert_eq!(config.session_sweep_interval_secs, 60);
        assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn reject_bad_mcp_paths() {
        for path in ["mcp", "/", "/mcp/"] {
            let mut config = Config::default();
            config.server.mcp_path = path.to_string();
            assert!(config.validate().is_err(), "accepted {path}");
        }
    }

    #[test]
    fn reject_zero_limits() {
        let mut config = Config::default();
        config.store.max_items = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.session_idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_log_format() {
        let json = r#"{"logging": {"format": "xml"}}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_port_and_format() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("PORT", "8787"), ("LOG_FORMAT", "JSON")]))
            .unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn env_without_overrides_keeps_defaults() {
        let mut config = Config::default();
        config.apply_env(env(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "PORT", .. }));
    }

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse(" json "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("yaml"), None);
    }
}
