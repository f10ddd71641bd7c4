//! Logging initialization.
//!
//! Human-readable records go to stdout; the same stream is written as JSON
//! to a fresh per-start file under the log directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. Returns the path of the log file.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init(log_level: &str, log_dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let path = log_dir.join(format!("relify_{stamp}.log"));
    let file = File::create(&path)
        .with_context(|| format!("creating log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(fmt::layer().json().with_writer(Arc::new(file)))
        .init();

    Ok(path)
}
