//! Configuration parsing and validation.

pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{load_config, load_config_str, save_config, write_default, DEFAULT_TEMPLATE};
pub use types::{Config, Mode, PlatformConfig};
pub use validate::validate_config;

use std::path::Path;

use crate::error::ConfigResult;

/// Load and validate configuration from a file.
///
/// This is the main entry point for loading configuration.
pub fn load_and_validate(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}
