//! Typed server events delivered to listeners.
//!
//! Raw [`EventMessage`] envelopes are converted into [`MassEvent`], a tagged
//! union whose variants carry decoded payloads for the event kinds this client
//! understands. Everything else (including payloads that fail to decode) is
//! delivered untouched as [`MassEvent::Other`].

use tracing::warn;

use crate::models::{MediaItem, Player, PlayerQueue, ProviderInstance};
use crate::protocol::{EventMessage, EventType};

/// A server-pushed event with a typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MassEvent {
    PlayerAdded(Player),
    PlayerUpdated(Player),
    PlayerRemoved {
        player_id: String,
    },
    QueueAdded(PlayerQueue),
    QueueUpdated(PlayerQueue),
    /// Elapsed playback time of a queue changed.
    QueueTimeUpdated {
        queue_id: String,
        elapsed_time: f64,
    },
    ProvidersUpdated(Vec<ProviderInstance>),
    MediaItemAdded(MediaItem),
    MediaItemUpdated(MediaItem),
    MediaItemDeleted(MediaItem),
    /// The server is shutting down.
    Shutdown,
    /// Any other event, or a known event whose payload did not decode.
    Other(EventMessage),
}

impl MassEvent {
    /// Returns the wire event type of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PlayerAdded(_) => EventType::PlayerAdded,
            Self::PlayerUpdated(_) => EventType::PlayerUpdated,
            Self::PlayerRemoved { .. } => EventType::PlayerRemoved,
            Self::QueueAdded(_) => EventType::QueueAdded,
            Self::QueueUpdated(_) => EventType::QueueUpdated,
            Self::QueueTimeUpdated { .. } => EventType::QueueTimeUpdated,
            Self::ProvidersUpdated(_) => EventType::ProvidersUpdated,
            Self::MediaItemAdded(_) => EventType::MediaItemAdded,
            Self::MediaItemUpdated(_) => EventType::MediaItemUpdated,
            Self::MediaItemDeleted(_) => EventType::MediaItemDeleted,
            Self::Shutdown => EventType::Shutdown,
            Self::Other(msg) => msg.event.clone(),
        }
    }
}

impl From<EventMessage> for MassEvent {
    fn from(msg: EventMessage) -> Self {
        match decode(&msg) {
            Ok(Some(event)) => event,
            Ok(None) => Self::Other(msg),
            Err(e) => {
                warn!(event = %msg.event, "failed to decode event payload: {e}");
                Self::Other(msg)
            }
        }
    }
}

fn decode(msg: &EventMessage) -> serde_json::Result<Option<MassEvent>> {
    let data = || msg.data.clone();
    let event = match &msg.event {
        EventType::PlayerAdded => MassEvent::PlayerAdded(serde_json::from_value(data())?),
        EventType::PlayerUpdated => MassEvent::PlayerUpdated(serde_json::from_value(data())?),
        EventType::PlayerRemoved => {
            let player_id = msg
                .object_id
                .clone()
                .or_else(|| msg.data.get("player_id")?.as_str().map(str::to_string));
            match player_id {
                Some(player_id) => MassEvent::PlayerRemoved { player_id },
                None => return Ok(None),
            }
        }
        EventType::QueueAdded => MassEvent::QueueAdded(serde_json::from_value(data())?),
        EventType::QueueUpdated => MassEvent::QueueUpdated(serde_json::from_value(data())?),
        EventType::QueueTimeUpdated => match (&msg.object_id, msg.data.as_f64()) {
            (Some(queue_id), Some(elapsed_time)) => MassEvent::QueueTimeUpdated {
                queue_id: queue_id.clone(),
                elapsed_time,
            },
            _ => return Ok(None),
        },
        EventType::ProvidersUpdated => {
            MassEvent::ProvidersUpdated(serde_json::from_value(data())?)
        }
        EventType::MediaItemAdded => MassEvent::MediaItemAdded(serde_json::from_value(data())?),
        EventType::MediaItemUpdated => {
            MassEvent::MediaItemUpdated(serde_json::from_value(data())?)
        }
        EventType::MediaItemDeleted => {
            MassEvent::MediaItemDeleted(serde_json::from_value(data())?)
        }
        EventType::Shutdown => MassEvent::Shutdown,
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Selects which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every event (the `*` wildcard).
    All,
    /// Only events of this type.
    Only(EventType),
}

impl EventFilter {
    /// Returns `true` if an event of type `event_type` passes this filter.
    pub fn matches(&self, event_type: &EventType) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == event_type,
        }
    }
}

impl From<EventType> for EventFilter {
    fn from(event_type: EventType) -> Self {
        Self::Only(event_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(event: EventType, object_id: Option<&str>, data: serde_json::Value) -> EventMessage {
        EventMessage {
            event,
            object_id: object_id.map(str::to_string),
            data,
        }
    }

    #[test]
    fn decodes_player_updated() {
        let event = MassEvent::from(message(
            EventType::PlayerUpdated,
            Some("p1"),
            json!({"player_id": "p1", "volume_level": 20}),
        ));
        let MassEvent::PlayerUpdated(player) = event else {
            panic!("expected PlayerUpdated, got {event:?}");
        };
        assert_eq!(player.volume_level, 20);
    }

    #[test]
    fn decodes_queue_time_from_object_id() {
        let event = MassEvent::from(message(EventType::QueueTimeUpdated, Some("q1"), json!(31)));
        assert_eq!(
            event,
            MassEvent::QueueTimeUpdated {
                queue_id: "q1".into(),
                elapsed_time: 31.0
            }
        );
    }

    #[test]
    fn undecodable_payload_becomes_other() {
        let msg = message(EventType::QueueAdded, None, json!("not a queue"));
        let event = MassEvent::from(msg.clone());
        assert_eq!(event, MassEvent::Other(msg));
        assert_eq!(event.event_type(), EventType::QueueAdded);
    }

    #[test]
    fn unknown_events_keep_their_type() {
        let msg = message(EventType::Other("custom".into()), None, json!(null));
        let event = MassEvent::from(msg);
        assert_eq!(event.event_type(), EventType::Other("custom".into()));
    }

    #[test]
    fn filter_matching() {
        assert!(EventFilter::All.matches(&EventType::PlayerAdded));
        assert!(EventFilter::from(EventType::PlayerAdded).matches(&EventType::PlayerAdded));
        assert!(!EventFilter::from(EventType::PlayerAdded).matches(&EventType::QueueAdded));
    }
}
