//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::config::types::{Config, Mode};
use crate::error::ConfigError;

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        errors.push(format!(
            "log_level '{}' is invalid (use: {})",
            config.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.mode == Mode::Hub {
        if config.hub.is_empty() {
            errors.push("hub is required when mode is 'hub'".to_string());
        } else {
            match config.platforms.get(&config.hub) {
                None => errors.push(format!("hub platform '{}' is not configured", config.hub)),
                Some(pc) if !pc.enabled => {
                    errors.push(format!("hub platform '{}' is not enabled", config.hub));
                }
                Some(_) => {}
            }
        }
    }

    for (name, pc) in &config.platforms {
        if pc.driver.is_empty() {
            errors.push(format!("platforms.{name}.driver is required"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::{load_config_str, DEFAULT_TEMPLATE};

    fn make_valid_config() -> Config {
        load_config_str(DEFAULT_TEMPLATE).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_hub_mode_requires_hub() {
        let mut config = make_valid_config();
        config.hub = String::new();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("hub is required"));
    }

    #[test]
    fn test_hub_must_be_configured() {
        let mut config = make_valid_config();
        config.hub = "telegram".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not configured"));
    }

    #[test]
    fn test_hub_must_be_enabled() {
        let mut config = make_valid_config();
        if let Some(pc) = config.platforms.get_mut("matrix") {
            pc.enabled = false;
        }

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not enabled"));
    }

    #[test]
    fn test_peer_mode_ignores_hub() {
        let mut config = make_valid_config();
        config.mode = Mode::Peer;
        config.hub = String::new();

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level_fails() {
        let mut config = make_valid_config();
        config.log_level = "verbose".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log_level"));
    }

    #[test]
    fn test_empty_driver_fails() {
        let mut config = make_valid_config();
        if let Some(pc) = config.platforms.get_mut("onebot") {
            pc.driver = String::new();
        }

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("driver"));
    }
}
