//! Adapter contract and registry.
//!
//! A platform adapter translates between the engine's normalized events and
//! one concrete chat protocol. Adapters are constructed and registered
//! explicitly by the host before `Core::start`; the engine never discovers
//! them implicitly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::event::{Event, Node, RoomInfo, RoutePolicy};

/// Engine surface handed to adapters at startup.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Deliver an inbound event to the relay. Never fails from the
    /// adapter's point of view; internal errors are logged and absorbed.
    async fn handle(&self, event: Event);

    /// Translate a message ID across platforms, e.g. to render a native
    /// reply. Returns `None` when no mapping is known.
    fn find_mapping(&self, src_platform: &str, src_msg: &str, dst_platform: &str)
        -> Option<String>;
}

/// Contract every platform adapter implements.
///
/// All methods are best-effort I/O against a remote service; errors are
/// opaque to the engine and reported as [`anyhow::Error`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable platform name, used as `Event::platform` and as the registry
    /// key.
    fn name(&self) -> &str;

    /// How this adapter lays out bridged conversations.
    fn policy(&self) -> RoutePolicy;

    /// Connect to the platform and begin delivering inbound events through
    /// `engine`. Returns once the adapter is operational; its I/O loops run
    /// in background tasks it owns.
    async fn start(&self, engine: Arc<dyn EngineApi>) -> anyhow::Result<()>;

    /// Disconnect and stop all background tasks.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver an event to a room on this platform. Returns the produced
    /// destination message ID, or an empty string for actions that do not
    /// create one (e.g. a redact).
    async fn send(&self, node: &Node, event: &Event) -> anyhow::Result<String>;

    /// Fetch metadata for a room on this platform.
    async fn info(&self, room: &str) -> anyhow::Result<RoomInfo>;

    /// Create a room described by `info`, or return the adapter's shared
    /// Mix room when `info` is `None`.
    async fn create_room(&self, info: Option<&RoomInfo>) -> anyhow::Result<String>;
}

/// Holds running adapter instances keyed by platform name.
///
/// Populated during wiring, read-mostly afterwards.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<HashMap<String, Arc<dyn Adapter>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(&self, adapter: Arc<dyn Adapter>) {
        self.inner
            .write()
            .insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.inner.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Adapter>> {
        self.inner.read().values().cloned().collect()
    }

    /// Registered platform names.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn policy(&self, name: &str) -> Option<RoutePolicy> {
        self.inner.read().get(name).map(|a| a.policy())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
