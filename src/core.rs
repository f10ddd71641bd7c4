//! Engine lifecycle: wiring, startup and graceful shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapter::{Adapter, EngineApi, Registry};
use crate::config::{Config, Mode};
use crate::error::StoreResult;
use crate::relay::Dispatcher;
use crate::store::Store;

const DB_FILE: &str = "relify.db";

/// Wires the store, registry and dispatcher together and drives the
/// adapter lifecycle.
pub struct Core {
    config: Config,
    store: Arc<Store>,
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
}

impl Core {
    /// Build the engine with state under `./data`.
    pub fn new(config: Config) -> StoreResult<Self> {
        Self::with_data_dir(config, "data")
    }

    /// Build the engine with state under an explicit directory (created if
    /// needed).
    pub fn with_data_dir(config: Config, dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let db_path = dir.join(DB_FILE);
        info!(path = %db_path.display(), "opening store");
        let store = Arc::new(Store::open(&db_path, config.retention())?);

        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            Arc::clone(&registry),
            Arc::clone(&store),
        ));

        Ok(Self {
            config,
            store,
            registry,
            dispatcher,
        })
    }

    /// The engine surface adapters talk to.
    pub fn engine(&self) -> Arc<dyn EngineApi> {
        self.dispatcher.clone()
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Register an adapter, iff its platform is enabled in the config.
    pub fn add(&self, adapter: Arc<dyn Adapter>) {
        let name = adapter.name().to_string();
        match self.config.platforms.get(&name) {
            Some(pc) if pc.enabled => {
                self.registry.register(adapter);
                debug!(platform = %name, "adapter registered");
            }
            _ => debug!(platform = %name, "platform disabled, adapter ignored"),
        }
    }

    /// Start all registered adapters concurrently.
    ///
    /// In hub mode a hub-adapter failure aborts startup; other failures are
    /// logged and tolerated. At least one adapter must come up.
    pub async fn start(&self) -> anyhow::Result<()> {
        let adapters = self.registry.all();
        if adapters.is_empty() {
            bail!("no adapters registered");
        }
        info!(count = adapters.len(), "starting adapters");

        let mut tasks = JoinSet::new();
        for adapter in adapters {
            let engine: Arc<dyn EngineApi> = self.dispatcher.clone();
            tasks.spawn(async move {
                let name = adapter.name().to_string();
                debug!(platform = %name, "starting adapter");
                (name, adapter.start(engine).await)
            });
        }

        let mut started = 0usize;
        while let Some(result) = tasks.join_next().await {
            let (name, outcome) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "adapter start task failed");
                    continue;
                }
            };
            match outcome {
                Ok(()) => {
                    started += 1;
                    info!(platform = %name, "adapter started");
                }
                Err(e) => {
                    if self.config.mode == Mode::Hub && name == self.config.hub {
                        error!(platform = %name, error = %e, "hub adapter failed to start");
                        return Err(e).with_context(|| format!("starting hub '{name}'"));
                    }
                    warn!(platform = %name, error = %e, "adapter failed to start");
                }
            }
        }

        if started == 0 {
            bail!("no adapter started successfully");
        }
        info!(started, "relay ready");
        Ok(())
    }

    /// Stop all adapters concurrently under `timeout`, then drain and close
    /// the store.
    pub async fn stop(&self, timeout: Duration) {
        info!("stopping adapters");
        let mut tasks = JoinSet::new();
        for adapter in self.registry.all() {
            tasks.spawn(async move {
                let name = adapter.name().to_string();
                (name, adapter.stop().await)
            });
        }

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Ok((name, outcome)) = result {
                    match outcome {
                        Ok(()) => info!(platform = %name, "adapter stopped"),
                        Err(e) => warn!(platform = %name, error = %e, "adapter stop failed"),
                    }
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("adapter shutdown timed out");
        }

        self.store.close().await;
        info!("store closed");
    }
}
