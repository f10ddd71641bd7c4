//! Shared test fixtures: an in-memory adapter and config/event builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use relify::{
    Adapter, Config, Core, EngineApi, Event, EventKind, Mode, Node, PlatformConfig, RoomInfo,
    RoutePolicy, Segment, Store,
};

/// Programmable in-memory adapter that records everything the engine asks
/// of it.
pub struct MockAdapter {
    pub name: String,
    pub policy: RoutePolicy,
    pub mix_room: String,
    pub fail_start: bool,
    pub fail_send: bool,
    pub fail_create_room: bool,
    pub empty_room_id: bool,
    sent: Mutex<Vec<(Node, Event)>>,
    room_requests: Mutex<Vec<Option<RoomInfo>>>,
    stopped: AtomicUsize,
    msg_counter: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str, policy: RoutePolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            mix_room: format!("{name}-mix"),
            fail_start: false,
            fail_send: false,
            fail_create_room: false,
            empty_room_id: false,
            sent: Mutex::new(Vec::new()),
            room_requests: Mutex::new(Vec::new()),
            stopped: AtomicUsize::new(0),
            msg_counter: AtomicUsize::new(0),
        }
    }

    /// Everything delivered to this platform, in arrival order.
    pub fn sent(&self) -> Vec<(Node, Event)> {
        self.sent.lock().clone()
    }

    pub fn sent_events(&self) -> Vec<Event> {
        self.sent.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Room creation requests seen so far (`None` = Mix room asked for).
    pub fn room_requests(&self) -> Vec<Option<RoomInfo>> {
        self.room_requests.lock().clone()
    }

    pub fn rooms_created(&self) -> usize {
        self.room_requests.lock().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> RoutePolicy {
        self.policy
    }

    async fn start(&self, _engine: Arc<dyn EngineApi>) -> anyhow::Result<()> {
        if self.fail_start {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, node: &Node, event: &Event) -> anyhow::Result<String> {
        if self.fail_send {
            anyhow::bail!("{} send failed", self.name);
        }
        self.sent.lock().push((node.clone(), event.clone()));
        if event.kind == EventKind::Message {
            let n = self.msg_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-{}", self.name, n))
        } else {
            Ok(String::new())
        }
    }

    async fn info(&self, room: &str) -> anyhow::Result<RoomInfo> {
        Ok(RoomInfo {
            id: room.to_string(),
            name: room.to_string(),
            ..RoomInfo::default()
        })
    }

    async fn create_room(&self, info: Option<&RoomInfo>) -> anyhow::Result<String> {
        if self.fail_create_room {
            anyhow::bail!("{} cannot create rooms", self.name);
        }
        let mut requests = self.room_requests.lock();
        requests.push(info.cloned());
        if self.empty_room_id {
            return Ok(String::new());
        }
        match info {
            None => Ok(self.mix_room.clone()),
            Some(_) => Ok(format!("{}-room-{}", self.name, requests.len())),
        }
    }
}

fn platform_entry(driver: &str) -> PlatformConfig {
    PlatformConfig {
        driver: driver.to_string(),
        enabled: true,
        config: Value::Null,
    }
}

/// Peer-mode config with the given platforms enabled.
pub fn peer_config(platforms: &[&str]) -> Config {
    let mut config = Config::default();
    config.mode = Mode::Peer;
    config.hub = String::new();
    for name in platforms {
        config.platforms.insert(name.to_string(), platform_entry(name));
    }
    config
}

/// Hub-mode config with the given platforms enabled.
pub fn hub_config(hub: &str, platforms: &[&str]) -> Config {
    let mut config = peer_config(platforms);
    config.mode = Mode::Hub;
    config.hub = hub.to_string();
    config
}

/// An engine over a throwaway data directory.
pub struct Rig {
    pub core: Core,
    _dir: tempfile::TempDir,
}

impl Rig {
    pub fn new(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = Core::with_data_dir(config, dir.path()).expect("open core");
        Self { core, _dir: dir }
    }

    pub fn add(&self, adapter: Arc<MockAdapter>) {
        self.core.add(adapter);
    }

    pub fn engine(&self) -> Arc<dyn EngineApi> {
        self.core.engine()
    }

    pub fn store(&self) -> Arc<Store> {
        self.core.store()
    }

    pub async fn handle(&self, event: Event) {
        self.core.engine().handle(event).await;
    }
}

pub fn msg(platform: &str, room: &str, id: &str, text: &str) -> Event {
    let mut e = Event::new(EventKind::Message, platform, room, id);
    e.user = "u1".to_string();
    e.segments.push(Segment::text(text));
    e
}

pub fn reply(platform: &str, room: &str, id: &str, text: &str, ref_id: &str) -> Event {
    let mut e = msg(platform, room, id, text);
    e.ref_id = Some(ref_id.to_string());
    e
}

pub fn edit(platform: &str, room: &str, id: &str, text: &str, ref_id: Option<&str>) -> Event {
    let mut e = Event::new(EventKind::Edit, platform, room, id);
    e.segments.push(Segment::text(text));
    e.ref_id = ref_id.map(str::to_string);
    e
}

pub fn revoke(platform: &str, room: &str, id: &str, ref_id: Option<&str>) -> Event {
    let mut e = Event::new(EventKind::Notice, platform, room, id);
    e.extra
        .insert("subtype".to_string(), Value::from("revoke"));
    e.ref_id = ref_id.map(str::to_string);
    e
}
