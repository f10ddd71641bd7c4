//! Relify - multi-platform chat message relay.
//!
//! Single-binary host: loads (or generates) the configuration, wires the
//! relay engine, registers the platform adapters compiled into this build,
//! and runs until SIGINT/SIGTERM.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{debug, info};

use relify::adapter::Adapter;
use relify::config::{self, PlatformConfig};
use relify::Core;

const DATA_DIR: &str = "data";
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = Path::new(DATA_DIR);
    std::fs::create_dir_all(data_dir)?;

    // First run: generate a default config and let the operator edit it.
    let config_path = data_dir.join("config.yaml");
    if !config_path.exists() {
        config::write_default(&config_path)?;
        println!("wrote default configuration to {}", config_path.display());
        println!("edit it and start relify again");
        return Ok(());
    }

    let cfg = match config::load_and_validate(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            eprintln!(
                "fix {} or delete it to regenerate the default",
                config_path.display()
            );
            std::process::exit(1);
        }
    };

    let log_path = relify::logging::init(&cfg.log_level, data_dir.join("logs"))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?cfg.mode,
        hub = %cfg.hub,
        log = %log_path.display(),
        "relify starting"
    );

    let core = Core::new(cfg.clone())?;

    for (name, pc) in &cfg.platforms {
        if !pc.enabled {
            continue;
        }
        match build_adapter(name, pc) {
            Some(adapter) => core.add(adapter),
            None => anyhow::bail!("unknown driver '{}' for platform '{}'", pc.driver, name),
        }
    }

    core.start().await?;
    info!("relify started, waiting for events");

    shutdown_signal().await;
    info!("shutdown signal received, stopping");

    core.stop(SHUTDOWN_DEADLINE).await;
    info!("relify stopped");
    Ok(())
}

/// Construction seam for platform adapters: maps a configured driver name
/// to an adapter instance. This build compiles no platform drivers in;
/// deployments extend the match with their own, e.g.
/// `"matrix" => Some(Arc::new(MatrixAdapter::new(name, &platform.config)))`.
fn build_adapter(name: &str, platform: &PlatformConfig) -> Option<Arc<dyn Adapter>> {
    debug!(platform = %name, driver = %platform.driver, "resolving driver");
    match platform.driver.as_str() {
        _ => None,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
