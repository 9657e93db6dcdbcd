//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tierpay_core::EngineConfig;

/// Full configuration for the Tierpay node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierpayConfig {
    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settlement engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Directory bootstrap.
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedConfig {
    /// TOML file describing channels, plans, nodes and payout costs.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    9100
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TierpayConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: TierpayConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TierpayConfig::default();
        assert_eq!(config.api.port, 9100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.pending_timeout_secs, 1800);
        assert!(config.seed.path.is_none());
        assert!(!config.json_logs());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = TierpayConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let decoded: TierpayConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(decoded.api.port, config.api.port);
        assert_eq!(decoded.engine.poll_interval_secs, config.engine.poll_interval_secs);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let config = TierpayConfig::load(Path::new("/nonexistent/tierpay.toml")).unwrap();
        assert_eq!(config.api_addr(), "127.0.0.1:9100");
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml_str = r#"
[api]
port = 8001

[logging]
format = "json"

[engine]
pending_timeout_secs = 600

[seed]
path = "seed.toml"
"#;
        let config: TierpayConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.api.port, 8001);
        assert!(config.json_logs());
        assert_eq!(config.engine.pending_timeout_secs, 600);
        // Defaults for unspecified
        assert_eq!(config.engine.poll_interval_secs, 30);
        assert!(config.engine.journal_enabled);
        assert_eq!(config.seed.path, Some(PathBuf::from("seed.toml")));
    }
}
