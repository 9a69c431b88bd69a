//! Live-event model.
//!
//! Unlike an open, multi-platform event hierarchy, Ovation consumes a single
//! live-event source with a stable payload contract, so the event set is a
//! **closed enum**: [`LiveEvent`] enumerates every kind the bus can carry and
//! [`EventKind`] is the matching tag used for subscriptions and trigger
//! matching.
//!
//! Payloads are plain serde structs. The automation engine evaluates
//! conditions and templates against the JSON projection returned by
//! [`LiveEvent::payload`], so payload field names are part of the public
//! contract (`coins`, `username`, `viewers`, …).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event Kind
// ============================================================================

/// Classification of live events.
///
/// Connection lifecycle events travel through the same bus as audience
/// events, so they are kinds like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A chat message.
    Chat,
    /// A gift, with a coin value and repeat count.
    Gift,
    /// A new follower.
    Follow,
    /// The stream was shared.
    Share,
    /// A burst of likes.
    Like,
    /// A (re-)subscription.
    Subscribe,
    /// The viewer count changed.
    ViewerCount,
    /// The source connected to a live room.
    Connected,
    /// The source disconnected.
    Disconnected,
    /// The source reported an error.
    SourceError,
}

impl EventKind {
    /// Every kind, in a stable order. Used to seed the trigger registry.
    pub const ALL: &'static [EventKind] = &[
        EventKind::Chat,
        EventKind::Gift,
        EventKind::Follow,
        EventKind::Share,
        EventKind::Like,
        EventKind::Subscribe,
        EventKind::ViewerCount,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::SourceError,
    ];

    /// Returns the canonical string tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Chat => "chat",
            EventKind::Gift => "gift",
            EventKind::Follow => "follow",
            EventKind::Share => "share",
            EventKind::Like => "like",
            EventKind::Subscribe => "subscribe",
            EventKind::ViewerCount => "viewer_count",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::SourceError => "source_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event-kind tag.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event kind: '{0}'")]
pub struct ParseEventKindError(pub String);

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "chat" => EventKind::Chat,
            "gift" => EventKind::Gift,
            "follow" => EventKind::Follow,
            "share" => EventKind::Share,
            "like" => EventKind::Like,
            "subscribe" => EventKind::Subscribe,
            "viewer_count" => EventKind::ViewerCount,
            "connected" => EventKind::Connected,
            "disconnected" => EventKind::Disconnected,
            "source_error" => EventKind::SourceError,
            other => return Err(ParseEventKindError(other.to_string())),
        })
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// The audience member an event originates from.
///
/// Flattened into every payload so conditions and templates can reference
/// `user_id` and `username` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Platform-stable identifier.
    pub user_id: String,
    /// Display name at the time of the event.
    pub username: String,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(flatten)]
    pub actor: Actor,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A gift. `coins` is the per-gift value, `repeat_count` the streak length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftEvent {
    #[serde(flatten)]
    pub actor: Actor,
    pub gift_name: String,
    pub coins: u64,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    pub timestamp: DateTime<Utc>,
}

fn default_repeat_count() -> u32 {
    1
}

/// A new follower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEvent {
    #[serde(flatten)]
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

/// The stream was shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEvent {
    #[serde(flatten)]
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

/// A burst of likes. `count` is the burst size, `total` the session total
/// when the platform reports one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeEvent {
    #[serde(flatten)]
    pub actor: Actor,
    pub count: u32,
    #[serde(default)]
    pub total: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// A (re-)subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeEvent {
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(default = "default_months")]
    pub months: u32,
    pub timestamp: DateTime<Utc>,
}

fn default_months() -> u32 {
    1
}

/// The viewer count changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerCountEvent {
    pub viewers: u64,
    pub timestamp: DateTime<Utc>,
}

/// Connection lifecycle (connected/disconnected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// The live room, when known.
    #[serde(default)]
    pub room_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The source reported an error without necessarily disconnecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceErrorEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// LiveEvent
// ============================================================================

/// A single event delivered by the event source.
///
/// The enum is exhaustive on purpose: the bus, the trigger registry, and the
/// engine all match on [`EventKind`], and adding a kind is a deliberate
/// contract change rather than a runtime registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Chat(ChatEvent),
    Gift(GiftEvent),
    Follow(FollowEvent),
    Share(ShareEvent),
    Like(LikeEvent),
    Subscribe(SubscribeEvent),
    ViewerCount(ViewerCountEvent),
    Connected(ConnectionEvent),
    Disconnected(ConnectionEvent),
    SourceError(SourceErrorEvent),
}

impl LiveEvent {
    /// Returns the kind tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            LiveEvent::Chat(_) => EventKind::Chat,
            LiveEvent::Gift(_) => EventKind::Gift,
            LiveEvent::Follow(_) => EventKind::Follow,
            LiveEvent::Share(_) => EventKind::Share,
            LiveEvent::Like(_) => EventKind::Like,
            LiveEvent::Subscribe(_) => EventKind::Subscribe,
            LiveEvent::ViewerCount(_) => EventKind::ViewerCount,
            LiveEvent::Connected(_) => EventKind::Connected,
            LiveEvent::Disconnected(_) => EventKind::Disconnected,
            LiveEvent::SourceError(_) => EventKind::SourceError,
        }
    }

    /// Returns the event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LiveEvent::Chat(e) => e.timestamp,
            LiveEvent::Gift(e) => e.timestamp,
            LiveEvent::Follow(e) => e.timestamp,
            LiveEvent::Share(e) => e.timestamp,
            LiveEvent::Like(e) => e.timestamp,
            LiveEvent::Subscribe(e) => e.timestamp,
            LiveEvent::ViewerCount(e) => e.timestamp,
            LiveEvent::Connected(e) => e.timestamp,
            LiveEvent::Disconnected(e) => e.timestamp,
            LiveEvent::SourceError(e) => e.timestamp,
        }
    }

    /// Returns the actor, for kinds that have one.
    pub fn actor(&self) -> Option<&Actor> {
        match self {
            LiveEvent::Chat(e) => Some(&e.actor),
            LiveEvent::Gift(e) => Some(&e.actor),
            LiveEvent::Follow(e) => Some(&e.actor),
            LiveEvent::Share(e) => Some(&e.actor),
            LiveEvent::Like(e) => Some(&e.actor),
            LiveEvent::Subscribe(e) => Some(&e.actor),
            _ => None,
        }
    }

    /// Projects the payload to a JSON object for condition evaluation and
    /// template interpolation.
    ///
    /// The projection is the payload struct's own serialization, so every
    /// payload field (`coins`, `username`, `viewers`, …) is addressable by
    /// name. The kind tag is added under `"type"`.
    pub fn payload(&self) -> Value {
        // Serialization of a plain serde struct cannot fail.
        let mut value = match self {
            LiveEvent::Chat(e) => serde_json::to_value(e),
            LiveEvent::Gift(e) => serde_json::to_value(e),
            LiveEvent::Follow(e) => serde_json::to_value(e),
            LiveEvent::Share(e) => serde_json::to_value(e),
            LiveEvent::Like(e) => serde_json::to_value(e),
            LiveEvent::Subscribe(e) => serde_json::to_value(e),
            LiveEvent::ViewerCount(e) => serde_json::to_value(e),
            LiveEvent::Connected(e) => serde_json::to_value(e),
            LiveEvent::Disconnected(e) => serde_json::to_value(e),
            LiveEvent::SourceError(e) => serde_json::to_value(e),
        }
        .unwrap_or(Value::Null);

        if let Value::Object(map) = &mut value {
            map.insert("type".into(), Value::String(self.kind().as_str().into()));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gift(coins: u64) -> LiveEvent {
        LiveEvent::Gift(GiftEvent {
            actor: Actor {
                user_id: "u1".into(),
                username: "bob".into(),
            },
            gift_name: "rose".into(),
            coins,
            repeat_count: 1,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
        assert!("bogus".parse::<EventKind>().is_err());
    }

    #[test]
    fn payload_flattens_actor_and_adds_type() {
        let payload = gift(42).payload();
        assert_eq!(payload["username"], "bob");
        assert_eq!(payload["coins"], 42);
        assert_eq!(payload["type"], "gift");
    }

    #[test]
    fn event_serde_is_tagged() {
        let json = serde_json::to_value(gift(7)).unwrap();
        assert_eq!(json["type"], "gift");
        let back: LiveEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), EventKind::Gift);
    }
}
