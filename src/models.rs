//! Data models for entities exchanged with the Music Assistant server.
//!
//! Each model types only the fields this client reads or writes. Every other
//! field the server sends is kept in a flattened `extra` map, so a model
//! survives a deserialize/serialize cycle without losing data. The state
//! mirror relies on that when it merges partial updates into a record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Enums ───────────────────────────────────────────────────────────

/// Kind of media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Artist,
    Album,
    Track,
    Playlist,
    Radio,
    Folder,
    #[default]
    #[serde(other)]
    Unknown,
}

/// How `play_media` places new items into a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueOption {
    /// Play now, keeping the rest of the queue.
    #[default]
    Play,
    /// Replace the queue and play.
    Replace,
    /// Insert after the current item.
    Next,
    /// Replace everything after the current item.
    ReplaceNext,
    /// Append to the end of the queue.
    Add,
}

// ── Mirrored entities ───────────────────────────────────────────────

/// A player registered on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub powered: bool,
    /// Volume in the range `0..=100`.
    #[serde(default)]
    pub volume_level: u8,
    #[serde(default)]
    pub volume_muted: bool,
    /// Combined volume of a player group, `0..=100`.
    #[serde(default)]
    pub group_volume: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_queue: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Player {
    /// Creates a player with only an id; handy for tests and optimistic inserts.
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            provider: String::new(),
            name: String::new(),
            available: false,
            powered: false,
            volume_level: 0,
            volume_muted: false,
            group_volume: 0,
            active_queue: None,
            extra: Map::new(),
        }
    }
}

/// A playback queue attached to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerQueue {
    pub queue_id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub name: String,
    /// Number of items in the queue.
    #[serde(default)]
    pub items: u32,
    #[serde(default)]
    pub shuffle_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
    /// Seconds elapsed in the current item.
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerQueue {
    /// Creates a queue with only an id.
    pub fn new(queue_id: impl Into<String>) -> Self {
        Self {
            queue_id: queue_id.into(),
            active: false,
            name: String::new(),
            items: 0,
            shuffle_enabled: false,
            current_index: None,
            elapsed_time: 0.0,
            extra: Map::new(),
        }
    }
}

/// A configured provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInstance {
    pub instance_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub available: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Library ─────────────────────────────────────────────────────────

/// A track, album, artist, playlist, radio station or browse folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub item_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub in_library: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either a media item uri or a full media item, as accepted by the library
/// commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LibraryItem {
    Uri(String),
    Item(MediaItem),
}

impl LibraryItem {
    /// Returns the contained media item, if this is not a bare uri.
    pub fn as_item_mut(&mut self) -> Option<&mut MediaItem> {
        match self {
            Self::Item(item) => Some(item),
            Self::Uri(_) => None,
        }
    }
}

impl From<MediaItem> for LibraryItem {
    fn from(item: MediaItem) -> Self {
        Self::Item(item)
    }
}

impl From<&str> for LibraryItem {
    fn from(uri: &str) -> Self {
        Self::Uri(uri.to_string())
    }
}

/// One page of a library listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PagedItems {
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

/// A folder returned by `music/browse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseFolder {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An entry in a player queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_item_id: String,
    #[serde(default)]
    pub queue_id: String,
    #[serde(default)]
    pub name: String,
    /// Duration in seconds, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_item: Option<MediaItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
