//! Event dispatch and concurrent fan-out.
//!
//! For each inbound event the dispatcher resolves the bridge group (asking
//! the matcher to build one on first sight), rewrites cross-platform
//! references, and delivers a fresh copy of the event to every target in
//! parallel. One target's failure never affects the others, and nothing
//! propagates back to the adapter that ingested the event.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::adapter::{Adapter, EngineApi, Registry};
use crate::config::Config;
use crate::event::{BridgeGroup, Event, EventKind, Node, RefMappings};
use crate::relay::matcher::Matcher;
use crate::store::Store;

/// Global cap on concurrent adapter sends across all events.
const MAX_INFLIGHT_SENDS: usize = 1000;

pub struct Dispatcher {
    registry: Arc<Registry>,
    store: Arc<Store>,
    matcher: Matcher,
    limiter: Arc<Semaphore>,
}

/// One delivery destination for an event.
struct Target {
    node: Node,
    adapter: Arc<dyn Adapter>,
    bridge_id: i64,
}

impl Dispatcher {
    pub fn new(config: &Config, registry: Arc<Registry>, store: Arc<Store>) -> Self {
        let matcher = Matcher::new(config, Arc::clone(&registry), Arc::clone(&store));
        Self {
            registry,
            store,
            matcher,
            limiter: Arc::new(Semaphore::new(MAX_INFLIGHT_SENDS)),
        }
    }

    /// Relay one inbound event to all bridged targets and wait for the
    /// fan-out to finish.
    pub async fn dispatch(&self, event: Event) {
        if event.kind == EventKind::Message && event.segments.is_empty() {
            debug!(platform = %event.platform, id = %event.id, "dropping empty message");
            return;
        }
        if self.store.is_echo(&event.platform, &event.id) {
            debug!(platform = %event.platform, id = %event.id, "dropping echo");
            return;
        }

        let bridge = match self.store.find_bridge(&event.platform, &event.room) {
            Some(bridge) => bridge,
            None => match self.matcher.ensure_bridge(&event).await {
                Ok(Some(bridge)) => bridge,
                Ok(None) => {
                    debug!(platform = %event.platform, room = %event.room, "matching suppressed");
                    return;
                }
                Err(e) => {
                    warn!(
                        platform = %event.platform,
                        room = %event.room,
                        error = %e,
                        "room matching failed"
                    );
                    return;
                }
            },
        };

        let targets = self.collect_targets(&event, &bridge);
        if targets.is_empty() {
            debug!(platform = %event.platform, room = %event.room, "no reachable targets");
            return;
        }

        let refs = Arc::new(self.prepare_ref_mappings(&event, &targets));

        let mut tasks = JoinSet::new();
        for target in targets {
            let event = event.clone();
            let store = Arc::clone(&self.store);
            let refs = Arc::clone(&refs);
            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                return;
            };
            tasks.spawn(async move {
                let _permit = permit;
                push(store, target, event, refs).await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Nodes of the bridge with a registered adapter, excluding the source.
    fn collect_targets(&self, event: &Event, bridge: &BridgeGroup) -> Vec<Target> {
        bridge
            .targets(&event.platform)
            .filter_map(|node| {
                self.registry.get(&node.platform).map(|adapter| Target {
                    node: node.clone(),
                    adapter,
                    bridge_id: bridge.id,
                })
            })
            .collect()
    }

    /// Query the reference mapping once per target platform before the
    /// parallel fan-out starts.
    fn prepare_ref_mappings(&self, event: &Event, targets: &[Target]) -> RefMappings {
        let mut refs = RefMappings::new();
        if !event.needs_ref_rewrite() {
            return refs;
        }
        let Some(ref_id) = event.ref_id.as_deref() else {
            return refs;
        };
        for target in targets {
            if let Some(dst) =
                self.store
                    .find_mapping(&event.platform, ref_id, &target.node.platform)
            {
                refs.insert(target.node.platform.clone(), dst);
            }
        }
        refs
    }
}

#[async_trait]
impl EngineApi for Dispatcher {
    async fn handle(&self, event: Event) {
        self.dispatch(event).await;
    }

    fn find_mapping(
        &self,
        src_platform: &str,
        src_msg: &str,
        dst_platform: &str,
    ) -> Option<String> {
        self.store.find_mapping(src_platform, src_msg, dst_platform)
    }
}

/// Rewrite and deliver one copy of the event to one target.
async fn push(store: Arc<Store>, target: Target, event: Event, refs: Arc<RefMappings>) {
    let Some(out) = rewrite_for_target(event, &target.node.platform, &refs) else {
        debug!(
            platform = %target.node.platform,
            "reference unresolved, dropping for target"
        );
        return;
    };

    match target.adapter.send(&target.node, &out).await {
        Ok(dst_id) => {
            debug!(
                source = %out.platform,
                target = %target.node.platform,
                src_id = %out.id,
                dst_id = %dst_id,
                "event delivered"
            );
            if out.kind == EventKind::Message && !dst_id.is_empty() {
                store.save_mapping(
                    &out.platform,
                    &out.id,
                    &target.node.platform,
                    &dst_id,
                    target.bridge_id,
                );
            }
        }
        Err(e) => {
            warn!(
                platform = %target.node.platform,
                room = %target.node.room,
                error = %e,
                "send failed"
            );
        }
    }
}

/// Translate the event's reference into the target platform's ID space.
///
/// Returns `None` when the event must not be delivered to this target: a
/// critical operation (edit or revoke) whose target message cannot be
/// resolved. A plain reply with an unresolved reference degrades to a
/// plain message instead.
fn rewrite_for_target(event: Event, target_platform: &str, refs: &RefMappings) -> Option<Event> {
    if !event.needs_ref_rewrite() {
        return Some(event);
    }

    let critical = event.is_critical();
    if event.ref_id.is_none() {
        return if critical { None } else { Some(event) };
    }

    let mut out = event;
    match refs.get(target_platform) {
        Some(dst) => {
            out.ref_id = Some(dst.clone());
            Some(out)
        }
        None if critical => None,
        None => {
            out.ref_id = None;
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SUBTYPE_REVOKE;
    use serde_json::Value;

    fn refs(platform: &str, dst: &str) -> RefMappings {
        let mut map = RefMappings::new();
        map.insert(platform.to_string(), dst.to_string());
        map
    }

    fn message(ref_id: Option<&str>) -> Event {
        let mut e = Event::new(EventKind::Message, "p1", "r1", "m2");
        e.segments.push(crate::event::Segment::text("ok"));
        e.ref_id = ref_id.map(str::to_string);
        e
    }

    fn edit(ref_id: Option<&str>) -> Event {
        let mut e = Event::new(EventKind::Edit, "p1", "r1", "e1");
        e.ref_id = ref_id.map(str::to_string);
        e
    }

    fn revoke(ref_id: Option<&str>) -> Event {
        let mut e = Event::new(EventKind::Notice, "p1", "r1", "n1");
        e.extra
            .insert("subtype".to_string(), Value::from(SUBTYPE_REVOKE));
        e.ref_id = ref_id.map(str::to_string);
        e
    }

    #[test]
    fn test_plain_message_passes_through() {
        let out = rewrite_for_target(message(None), "p2", &RefMappings::new()).unwrap();
        assert!(out.ref_id.is_none());
    }

    #[test]
    fn test_reply_reference_translated() {
        let out = rewrite_for_target(message(Some("m1")), "p2", &refs("p2", "m1'")).unwrap();
        assert_eq!(out.ref_id.as_deref(), Some("m1'"));
    }

    #[test]
    fn test_reply_degrades_without_mapping() {
        let out = rewrite_for_target(message(Some("m1")), "p2", &RefMappings::new()).unwrap();
        assert!(out.ref_id.is_none());
    }

    #[test]
    fn test_edit_requires_resolved_reference() {
        let out = rewrite_for_target(edit(Some("m1")), "p2", &refs("p2", "m1'")).unwrap();
        assert_eq!(out.ref_id.as_deref(), Some("m1'"));

        assert!(rewrite_for_target(edit(Some("m1")), "p2", &RefMappings::new()).is_none());
        assert!(rewrite_for_target(edit(None), "p2", &RefMappings::new()).is_none());
    }

    #[test]
    fn test_revoke_requires_resolved_reference() {
        let out = rewrite_for_target(revoke(Some("m1")), "p2", &refs("p2", "m1'")).unwrap();
        assert_eq!(out.ref_id.as_deref(), Some("m1'"));

        assert!(rewrite_for_target(revoke(Some("m1")), "p2", &RefMappings::new()).is_none());
        assert!(rewrite_for_target(revoke(None), "p2", &RefMappings::new()).is_none());
    }

    #[test]
    fn test_mapping_for_other_platform_does_not_apply() {
        // The pre-resolved map only knows p3; delivery to p2 degrades.
        let out = rewrite_for_target(message(Some("m1")), "p2", &refs("p3", "m1'")).unwrap();
        assert!(out.ref_id.is_none());
        assert!(rewrite_for_target(edit(Some("m1")), "p2", &refs("p3", "m1'")).is_none());
    }

    #[test]
    fn test_plain_notice_passes_through() {
        let mut notice = Event::new(EventKind::Notice, "p1", "r1", "n2");
        notice.ref_id = Some("m1".to_string());
        // A non-revoke notice carries its ref untouched; it is not a
        // critical op and not a reply.
        let out = rewrite_for_target(notice, "p2", &RefMappings::new()).unwrap();
        assert_eq!(out.ref_id.as_deref(), Some("m1"));
    }
}
