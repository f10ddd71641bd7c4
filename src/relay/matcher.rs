//! Automatic bridge matching.
//!
//! On first sight of an unbridged source room the matcher picks the target
//! platforms for the current topology, asks each target adapter for a room,
//! and persists the resulting bridge group. Matching is strictly serialized
//! per source room so concurrent first ingestions observe a single bridge.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, Registry};
use crate::config::{Config, Mode};
use crate::error::MatchError;
use crate::event::{BridgeGroup, Event, Node, RoomInfo, RoutePolicy};
use crate::store::Store;

pub struct Matcher {
    mode: Mode,
    hub: String,
    registry: Arc<Registry>,
    store: Arc<Store>,
    /// Per-room match locks, keyed `platform:room`. Entries are inserted
    /// lazily and never removed; bridged-room cardinality bounds the map.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Matcher {
    pub fn new(config: &Config, registry: Arc<Registry>, store: Arc<Store>) -> Self {
        Self {
            mode: config.mode,
            hub: config.hub.clone(),
            registry,
            store,
            locks: DashMap::new(),
        }
    }

    /// Build the bridge for the event's source room, or return the one a
    /// concurrent caller built first. `Ok(None)` means matching is
    /// suppressed because the event originates at the hub.
    pub async fn ensure_bridge(
        &self,
        event: &Event,
    ) -> Result<Option<Arc<BridgeGroup>>, MatchError> {
        // The hub never initiates bridges; it only receives them.
        if self.mode == Mode::Hub && event.platform == self.hub {
            return Ok(None);
        }

        let key = format!("{}:{}", event.platform, event.room);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Double-checked: another event may have built it while we waited.
        if let Some(existing) = self.store.find_bridge(&event.platform, &event.room) {
            return Ok(Some(existing));
        }

        let src = self
            .registry
            .get(&event.platform)
            .ok_or_else(|| MatchError::SourceOffline(event.platform.clone()))?;

        let (targets, name) = self.target_platforms(&event.platform);
        if targets.is_empty() {
            return Err(MatchError::NoTargets);
        }

        info!(
            platform = %event.platform,
            room = %event.room,
            targets = ?targets,
            "matching unbridged room"
        );

        let mut nodes = vec![Node::new(event.platform.clone(), event.room.clone())];
        let mut src_info: Option<RoomInfo> = None;

        for target in &targets {
            let Some(adapter) = self.registry.get(target) else {
                warn!(platform = %target, "target adapter not registered");
                if self.mode == Mode::Hub {
                    return Err(MatchError::HubOffline(target.clone()));
                }
                continue;
            };

            let room = match self
                .target_room(adapter.as_ref(), src.as_ref(), event, &mut src_info)
                .await
            {
                Ok(room) => room,
                Err(e) => {
                    warn!(platform = %target, error = %e, "creating target room failed");
                    // Hub mode never leaves a partial bridge behind.
                    if self.mode == Mode::Hub {
                        return Err(MatchError::CreateRoom {
                            platform: target.clone(),
                            message: e.to_string(),
                        });
                    }
                    continue;
                }
            };
            if room.is_empty() {
                warn!(platform = %target, "adapter returned empty room id, skipping target");
                continue;
            }
            debug!(platform = %target, room = %room, "target room ready");
            nodes.push(Node::new(target.clone(), room));
        }

        if nodes.len() < 2 {
            return Err(MatchError::InsufficientNodes { got: nodes.len() });
        }

        let group = self.store.create_bridge(&name, nodes)?;
        Ok(Some(group))
    }

    /// Target platform list and a descriptive bridge name for the topology.
    fn target_platforms(&self, src: &str) -> (Vec<String>, String) {
        match self.mode {
            Mode::Hub => (
                vec![self.hub.clone()],
                format!("hub: {} <-> {}", src, self.hub),
            ),
            Mode::Peer => {
                let targets: Vec<String> = self
                    .registry
                    .names()
                    .into_iter()
                    .filter(|name| name != src)
                    .collect();
                (targets, format!("peer: {} <-> all", src))
            }
        }
    }

    /// Create or obtain the room on one target platform. Source room
    /// metadata is fetched at most once, and only when a Mirror target
    /// actually needs it.
    async fn target_room(
        &self,
        adapter: &dyn Adapter,
        src: &dyn Adapter,
        event: &Event,
        src_info: &mut Option<RoomInfo>,
    ) -> anyhow::Result<String> {
        if adapter.policy() == RoutePolicy::Mix {
            return adapter.create_room(None).await;
        }

        if src_info.is_none() {
            *src_info = Some(source_info(src, &event.room).await);
        }
        let request = src_info.as_ref().map(|info| RoomInfo {
            id: String::new(),
            name: format!("[{}]{}", event.platform, info.name),
            avatar: info.avatar.clone(),
            topic: if info.topic.is_empty() {
                String::new()
            } else {
                "Relayed by Relify".to_string()
            },
        });
        adapter.create_room(request.as_ref()).await
    }
}

/// Fetch source room metadata, falling back to the bare room id.
async fn source_info(src: &dyn Adapter, room: &str) -> RoomInfo {
    match src.info(room).await {
        Ok(mut info) => {
            if info.name.is_empty() {
                info.name = room.to_string();
            }
            info
        }
        Err(e) => {
            debug!(room, error = %e, "room info unavailable, using room id");
            RoomInfo {
                id: room.to_string(),
                name: room.to_string(),
                ..RoomInfo::default()
            }
        }
    }
}
