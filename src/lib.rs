//! Relify - multi-platform chat message relay engine.
//!
//! Ingests normalized events from platform adapters, automatically builds
//! bridge groups pairing rooms across platforms, and mirrors every event to
//! all paired rooms. Platform adapters live outside this crate and talk to
//! the engine through the [`adapter::Adapter`] and [`adapter::EngineApi`]
//! contracts.

pub mod adapter;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod logging;
pub mod relay;
pub mod store;

pub use crate::core::Core;
pub use adapter::{Adapter, EngineApi, Registry};
pub use config::{Config, Mode, PlatformConfig};
pub use error::{ConfigError, MatchError, StoreError};
pub use event::{
    BridgeGroup, Event, EventKind, MediaPayload, Node, RoomInfo, RoutePolicy, Segment,
};
pub use relay::Dispatcher;
pub use store::Store;
