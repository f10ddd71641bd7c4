//! Configuration type definitions.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log verbosity: `debug`, `info`, `warn` or `error`.
    pub log_level: String,
    /// Relay topology.
    pub mode: Mode,
    /// Central platform name; required (and must be enabled) in hub mode.
    pub hub: String,
    /// Message mapping retention in days.
    pub retent_day: u32,
    /// Platform adapter configurations, keyed by platform name.
    pub platforms: HashMap<String, PlatformConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mode: Mode::Hub,
            hub: String::new(),
            retent_day: 7,
            platforms: HashMap::new(),
        }
    }
}

impl Config {
    /// Effective mapping retention window. `retent_day` below the 2-day
    /// engine floor (including 0/unset) degrades to 48 hours.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retent_day.max(2)) * 24 * 3600)
    }
}

/// Relay topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One central platform mirrors all others; only non-hub events may
    /// initiate bridges.
    #[default]
    Hub,
    /// Every registered platform mirrors to every other.
    Peer,
}

/// Configuration for a single platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Which adapter implementation drives this platform.
    pub driver: String,
    #[serde(default)]
    pub enabled: bool,
    /// Adapter-defined opaque settings, passed through untouched.
    #[serde(default)]
    pub config: serde_json::Value,
}
