//! Wire-compatible envelope types for the Music Assistant websocket API.
//!
//! The server speaks plain JSON objects with no type tag; the envelope kind is
//! inferred from which fields are present. [`IncomingFrame::parse`] applies the
//! classification rules in the same order the server documents them:
//!
//! 1. a frame with an `event` field is an [`EventMessage`]
//! 2. a frame with a `server_version` field is the one-time [`ServerInfo`]
//! 3. a frame with a `message_id` field is a [`ResultMessage`]
//!
//! Anything else is a protocol error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MusicAssistantError, Result};

/// Correlation id carried by commands and their results.
pub type MessageId = u64;

// ── Event types ─────────────────────────────────────────────────────

/// Kind of a server-pushed event.
///
/// Unknown event names are preserved in [`EventType::Other`] so that newer
/// servers keep working with older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Shutdown,
    QueueAdded,
    QueueUpdated,
    QueueItemsUpdated,
    QueueTimeUpdated,
    QueueSettingsUpdated,
    PlayerAdded,
    PlayerUpdated,
    PlayerRemoved,
    PlayerSettingsUpdated,
    MediaItemAdded,
    MediaItemUpdated,
    MediaItemDeleted,
    ProvidersUpdated,
    PlayerConfigUpdated,
    SyncTasksUpdated,
    /// Any event name this client does not know about.
    Other(String),
}

impl EventType {
    /// Returns the wire name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Shutdown => "application_shutdown",
            Self::QueueAdded => "queue_added",
            Self::QueueUpdated => "queue_updated",
            Self::QueueItemsUpdated => "queue_items_updated",
            Self::QueueTimeUpdated => "queue_time_updated",
            Self::QueueSettingsUpdated => "queue_settings_updated",
            Self::PlayerAdded => "player_added",
            Self::PlayerUpdated => "player_updated",
            Self::PlayerRemoved => "player_removed",
            Self::PlayerSettingsUpdated => "player_settings_updated",
            Self::MediaItemAdded => "media_item_added",
            Self::MediaItemUpdated => "media_item_updated",
            Self::MediaItemDeleted => "media_item_deleted",
            Self::ProvidersUpdated => "providers_updated",
            Self::PlayerConfigUpdated => "player_config_updated",
            Self::SyncTasksUpdated => "sync_tasks_updated",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "application_shutdown" => Self::Shutdown,
            "queue_added" => Self::QueueAdded,
            "queue_updated" => Self::QueueUpdated,
            "queue_items_updated" => Self::QueueItemsUpdated,
            "queue_time_updated" => Self::QueueTimeUpdated,
            "queue_settings_updated" => Self::QueueSettingsUpdated,
            "player_added" => Self::PlayerAdded,
            "player_updated" => Self::PlayerUpdated,
            "player_removed" => Self::PlayerRemoved,
            "player_settings_updated" => Self::PlayerSettingsUpdated,
            "media_item_added" => Self::MediaItemAdded,
            "media_item_updated" => Self::MediaItemUpdated,
            "media_item_deleted" => Self::MediaItemDeleted,
            "providers_updated" => Self::ProvidersUpdated,
            "player_config_updated" => Self::PlayerConfigUpdated,
            "sync_tasks_updated" => Self::SyncTasksUpdated,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        match event {
            EventType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelopes ───────────────────────────────────────────────────────

/// Command sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Command name, e.g. `"players/all"`.
    pub command: String,
    /// Correlation id echoed back in the result.
    pub message_id: MessageId,
    /// Command arguments. Omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Unsolicited event pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: EventType,
    /// Id of the object the event is about, if scoped to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Server information sent once, immediately after the socket opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How a command completed on the server.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// `{message_id, result}`
    Success(Value),
    /// `{message_id, error_code, details?}`
    Error {
        error_code: String,
        details: Option<String>,
    },
}

impl CommandOutcome {
    /// Converts the outcome into the value a caller awaits.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::Remote`] for an error outcome.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Error {
                error_code,
                details,
            } => Err(MusicAssistantError::Remote {
                error_code,
                details,
            }),
        }
    }
}

/// Result of a previously sent command.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub message_id: MessageId,
    pub outcome: CommandOutcome,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    Event(EventMessage),
    ServerInfo(ServerInfo),
    Result(ResultMessage),
}

impl IncomingFrame {
    /// Parses and classifies one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::Serialization`] if the text is not valid
    /// JSON or a recognized envelope has malformed fields, and
    /// [`MusicAssistantError::Protocol`] if the frame matches no known shape.
    pub fn parse(text: &str) -> Result<Self> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(text)? else {
            return Err(MusicAssistantError::Protocol(
                "frame is not a JSON object".into(),
            ));
        };

        if map.contains_key("event") {
            return Ok(Self::Event(serde_json::from_value(Value::Object(map))?));
        }
        if map.contains_key("server_version") {
            return Ok(Self::ServerInfo(serde_json::from_value(Value::Object(
                map,
            ))?));
        }
        let Some(raw_id) = map.get("message_id") else {
            return Err(MusicAssistantError::Protocol(
                "frame has no event, server_version or message_id field".into(),
            ));
        };
        let message_id = parse_message_id(raw_id)?;

        let outcome = match map.remove("error_code") {
            Some(code) => CommandOutcome::Error {
                error_code: value_to_text(code),
                details: map
                    .remove("details")
                    .filter(|d| !d.is_null())
                    .map(value_to_text),
            },
            None => CommandOutcome::Success(map.remove("result").unwrap_or(Value::Null)),
        };

        Ok(Self::Result(ResultMessage {
            message_id,
            outcome,
        }))
    }
}

/// Accepts integer ids as well as numeric strings.
fn parse_message_id(raw: &Value) -> Result<MessageId> {
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| MusicAssistantError::Protocol(format!("invalid message_id: {raw}")))
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_omits_absent_args() {
        let msg = CommandMessage {
            command: "players/all".into(),
            message_id: 3,
            args: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"command": "players/all", "message_id": 3}));
    }

    #[test]
    fn command_serializes_args() {
        let msg = CommandMessage {
            command: "x".into(),
            message_id: 1,
            args: Some(json!({"a": 1})),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["args"]["a"], 1);
    }

    #[test]
    fn classifies_event_frame() {
        let frame =
            IncomingFrame::parse(r#"{"event":"queue_time_updated","object_id":"q1","data":12.5}"#)
                .unwrap();
        let IncomingFrame::Event(msg) = frame else {
            panic!("expected event, got {frame:?}");
        };
        assert_eq!(msg.event, EventType::QueueTimeUpdated);
        assert_eq!(msg.object_id.as_deref(), Some("q1"));
        assert_eq!(msg.data, json!(12.5));
    }

    #[test]
    fn event_field_wins_over_message_id() {
        let frame =
            IncomingFrame::parse(r#"{"event":"player_added","message_id":5,"data":{}}"#).unwrap();
        assert!(matches!(frame, IncomingFrame::Event(_)));
    }

    #[test]
    fn classifies_server_info_and_keeps_extra_fields() {
        let frame = IncomingFrame::parse(
            r#"{"server_version":"2.0.0","schema_version":22,"server_id":"abc","base_url":"http://ma"}"#,
        )
        .unwrap();
        let IncomingFrame::ServerInfo(info) = frame else {
            panic!("expected server info, got {frame:?}");
        };
        assert_eq!(info.server_version, "2.0.0");
        assert_eq!(info.schema_version, Some(22));
        assert_eq!(info.extra["base_url"], "http://ma");
    }

    #[test]
    fn classifies_success_result() {
        let frame = IncomingFrame::parse(r#"{"message_id":1,"result":42}"#).unwrap();
        assert_eq!(
            frame,
            IncomingFrame::Result(ResultMessage {
                message_id: 1,
                outcome: CommandOutcome::Success(json!(42)),
            })
        );
    }

    #[test]
    fn success_result_without_payload_is_null() {
        let frame = IncomingFrame::parse(r#"{"message_id":"7"}"#).unwrap();
        let IncomingFrame::Result(result) = frame else {
            panic!("expected result");
        };
        assert_eq!(result.message_id, 7);
        assert_eq!(result.outcome, CommandOutcome::Success(Value::Null));
    }

    #[test]
    fn classifies_error_result() {
        let frame =
            IncomingFrame::parse(r#"{"message_id":2,"error_code":"not_found","details":null}"#)
                .unwrap();
        let IncomingFrame::Result(result) = frame else {
            panic!("expected result");
        };
        let err = result.outcome.into_result().unwrap_err();
        assert_eq!(err.to_string(), "not_found");
    }

    #[test]
    fn numeric_error_codes_become_text() {
        let frame =
            IncomingFrame::parse(r#"{"message_id":2,"error_code":999,"details":"boom"}"#).unwrap();
        let IncomingFrame::Result(result) = frame else {
            panic!("expected result");
        };
        assert_eq!(
            result.outcome,
            CommandOutcome::Error {
                error_code: "999".into(),
                details: Some("boom".into()),
            }
        );
    }

    #[test]
    fn unrecognized_shapes_are_protocol_errors() {
        for text in [r#"{"hello":"world"}"#, "[1,2,3]", r#""text""#] {
            let err = IncomingFrame::parse(text).unwrap_err();
            assert!(
                matches!(err, MusicAssistantError::Protocol(_)),
                "{text} -> {err:?}"
            );
        }
    }

    #[test]
    fn invalid_json_is_serialization_error() {
        let err = IncomingFrame::parse("{not json").unwrap_err();
        assert!(matches!(err, MusicAssistantError::Serialization(_)));
    }

    #[test]
    fn invalid_message_id_is_protocol_error() {
        let err = IncomingFrame::parse(r#"{"message_id":"abc","result":1}"#).unwrap_err();
        assert!(matches!(err, MusicAssistantError::Protocol(_)));
    }

    #[test]
    fn unknown_event_names_are_preserved() {
        let event: EventType = serde_json::from_value(json!("brand_new_event")).unwrap();
        assert_eq!(event, EventType::Other("brand_new_event".into()));
        assert_eq!(serde_json::to_value(&event).unwrap(), json!("brand_new_event"));
        assert_eq!(
            serde_json::to_value(EventType::Shutdown).unwrap(),
            json!("application_shutdown")
        );
    }
}
