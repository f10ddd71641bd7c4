//! Normalized event model shared by the engine and all adapters.
//!
//! Adapters translate their platform's wire format into [`Event`]s on the
//! way in and back out of it on the way to delivery. The engine itself only
//! inspects the routing-relevant fields (`kind`, `platform`, `room`,
//! `ref_id`) and treats everything else as payload.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// High-level classification of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A regular chat message (text, media, mentions, replies).
    Message,
    /// An edit of a previously relayed message; `ref_id` names the target.
    Edit,
    /// A system notice. Carries a `subtype` in `extra` (e.g. `"revoke"`).
    Notice,
}

/// `extra["subtype"]` value marking a notice as a message revocation.
pub const SUBTYPE_REVOKE: &str = "revoke";

/// File metadata for media segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Download or access URL on the source platform.
    pub url: String,
    /// Original file name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One piece of message content.
///
/// Adapters ignore variants they cannot represent on their platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Text { txt: String },
    Image(MediaPayload),
    Video(MediaPayload),
    Audio(MediaPayload),
    File(MediaPayload),
    Mention { user: String },
}

impl Segment {
    /// Shorthand for a plain text segment.
    pub fn text(txt: impl Into<String>) -> Self {
        Segment::Text { txt: txt.into() }
    }

    /// Shorthand for a mention segment.
    pub fn mention(user: impl Into<String>) -> Self {
        Segment::Mention { user: user.into() }
    }
}

/// A normalized unit on the relay bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Source-platform unique ID of the event.
    pub id: String,
    /// Event classification.
    pub kind: EventKind,
    /// Event timestamp.
    pub time: DateTime<Utc>,
    /// Source platform name.
    pub platform: String,
    /// Source room identifier.
    pub room: String,
    /// Sender user ID (may be empty for system notices).
    #[serde(default)]
    pub user: String,
    /// Sender display name.
    #[serde(default)]
    pub name: String,
    /// Sender avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// Ordered message content.
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// ID of another event this one refers to (reply, edit or redact target).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// Platform-specific metadata that must survive the round trip.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, Value>,
}

impl Event {
    /// Create a bare event with the routing fields set and everything else
    /// empty. Callers fill in content afterwards.
    pub fn new(
        kind: EventKind,
        platform: impl Into<String>,
        room: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            time: Utc::now(),
            platform: platform.into(),
            room: room.into(),
            user: String::new(),
            name: String::new(),
            avatar: String::new(),
            segments: Vec::new(),
            ref_id: None,
            extra: serde_json::Map::new(),
        }
    }

    /// True if this is a revocation notice.
    pub fn is_revoke(&self) -> bool {
        self.kind == EventKind::Notice
            && self
                .extra
                .get("subtype")
                .and_then(Value::as_str)
                .map(|s| s == SUBTYPE_REVOKE)
                .unwrap_or(false)
    }

    /// Critical operations act on an existing message and cannot be
    /// delivered without a resolvable reference.
    pub fn is_critical(&self) -> bool {
        self.kind == EventKind::Edit || self.is_revoke()
    }

    /// True if delivery must translate `ref_id` into the target platform's
    /// message ID space.
    pub fn needs_ref_rewrite(&self) -> bool {
        self.is_critical() || (self.kind == EventKind::Message && self.ref_id.is_some())
    }
}

/// An endpoint on one platform participating in a bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub platform: String,
    pub room: String,
    /// Adapter-defined per-node settings, persisted alongside the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg: Option<Value>,
}

impl Node {
    pub fn new(platform: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            room: room.into(),
            cfg: None,
        }
    }
}

/// A set of nodes mirroring one logical conversation.
///
/// Immutable after creation; the store hands out shared snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeGroup {
    pub id: i64,
    pub name: String,
    pub nodes: Vec<Node>,
}

impl BridgeGroup {
    /// Nodes on platforms other than `platform`.
    pub fn targets<'a>(&'a self, platform: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| n.platform != platform)
    }
}

/// Room metadata fetched from an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub topic: String,
}

/// How an adapter wants bridged conversations laid out on its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePolicy {
    /// Each bridged source room gets its own freshly created target room.
    Mirror,
    /// All bridged conversations funnel into one shared target room.
    Mix,
}

/// Pre-resolved reference mappings for one event, keyed by target platform.
pub type RefMappings = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn revoke_notice() -> Event {
        let mut e = Event::new(EventKind::Notice, "p1", "r1", "n1");
        e.extra
            .insert("subtype".to_string(), Value::from(SUBTYPE_REVOKE));
        e.ref_id = Some("m1".to_string());
        e
    }

    #[test]
    fn test_revoke_detection() {
        assert!(revoke_notice().is_revoke());

        let plain = Event::new(EventKind::Notice, "p1", "r1", "n2");
        assert!(!plain.is_revoke());

        // A message with the subtype set is still not a revoke.
        let mut msg = Event::new(EventKind::Message, "p1", "r1", "m1");
        msg.extra
            .insert("subtype".to_string(), Value::from(SUBTYPE_REVOKE));
        assert!(!msg.is_revoke());
    }

    #[test]
    fn test_critical_classification() {
        assert!(Event::new(EventKind::Edit, "p1", "r1", "e1").is_critical());
        assert!(revoke_notice().is_critical());
        assert!(!Event::new(EventKind::Message, "p1", "r1", "m1").is_critical());
    }

    #[test]
    fn test_needs_ref_rewrite() {
        // Edits and revokes always need rewriting, even without a ref.
        assert!(Event::new(EventKind::Edit, "p1", "r1", "e1").needs_ref_rewrite());
        assert!(revoke_notice().needs_ref_rewrite());

        // Plain messages only when they carry a reply reference.
        let mut msg = Event::new(EventKind::Message, "p1", "r1", "m1");
        assert!(!msg.needs_ref_rewrite());
        msg.ref_id = Some("m0".to_string());
        assert!(msg.needs_ref_rewrite());

        // Non-revoke notices never do.
        assert!(!Event::new(EventKind::Notice, "p1", "r1", "n1").needs_ref_rewrite());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = Event::new(EventKind::Message, "p1", "r1", "m1");
        original.segments.push(Segment::text("hi"));

        let mut copy = original.clone();
        copy.segments.push(Segment::mention("u2"));
        copy.ref_id = Some("m0".to_string());

        assert_eq!(original.segments.len(), 1);
        assert!(original.ref_id.is_none());
    }

    #[test]
    fn test_segment_wire_format() {
        let seg = Segment::Image(MediaPayload {
            url: "https://example.com/a.png".to_string(),
            name: Some("a.png".to_string()),
            size: None,
        });
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["url"], "https://example.com/a.png");
        assert!(json.get("size").is_none());

        let text = serde_json::to_value(Segment::text("hello")).unwrap();
        assert_eq!(text["kind"], "text");
        assert_eq!(text["txt"], "hello");
    }

    #[test]
    fn test_bridge_group_targets() {
        let group = BridgeGroup {
            id: 1,
            name: "test".to_string(),
            nodes: vec![Node::new("p1", "r1"), Node::new("p2", "r2")],
        };
        let targets: Vec<_> = group.targets("p1").collect();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].platform, "p2");
    }
}
