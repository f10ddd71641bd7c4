//! Configuration file parsing (YAML format).

use std::path::Path;

use crate::config::types::Config;
use crate::error::{ConfigError, ConfigResult};

/// Commented template written on first run.
pub const DEFAULT_TEMPLATE: &str = r#"# Relify configuration.
#
# mode: "hub" mirrors every platform into one central platform; "peer"
# mirrors every platform into every other.
log_level: info
mode: hub
hub: matrix
# Days to keep message ID mappings (replies/edits/redactions across
# platforms stop resolving once the mapping is purged).
retent_day: 7
platforms:
  matrix:
    driver: matrix
    enabled: true
    config:
      server_url: http://localhost:8448
      domain: localhost
  onebot:
    driver: onebot
    enabled: true
    config:
      url: ws://localhost:3001
      secret: ""
"#;

/// Load configuration from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;
    load_config_str(&data)
}

/// Load configuration from a YAML string.
pub fn load_config_str(content: &str) -> ConfigResult<Config> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write the commented default template to `path`.
pub fn write_default(path: impl AsRef<Path>) -> ConfigResult<()> {
    let path = path.as_ref();
    std::fs::write(path, DEFAULT_TEMPLATE).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Save a configuration as YAML.
pub fn save_config(path: impl AsRef<Path>, config: &Config) -> ConfigResult<()> {
    let path = path.as_ref();
    let data = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    std::fs::write(path, data).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}
