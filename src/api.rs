//! Typed accessors for the server's command namespace.
//!
//! Every method here forwards to [`MusicAssistantClient::get_data`] or
//! [`MusicAssistantClient::send_command`] with a fixed command name. Methods
//! returning a future issue their command immediately, before the future is
//! polled. Queue and player commands go through the command throttler and
//! return as soon as they are scheduled.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::MusicAssistantClient;
use crate::error::{MusicAssistantError, Result};
use crate::models::{
    BrowseFolder, LibraryItem, MediaItem, MediaType, PagedItems, Player, PlayerQueue, QueueItem,
    QueueOption,
};
use crate::optimistic::{self, VOLUME_STEP};
use crate::throttle::CommandFamily;

/// Seconds skipped by [`skip_ahead`](MusicAssistantClient::queue_command_skip_ahead)
/// and [`skip_back`](MusicAssistantClient::queue_command_skip_back).
pub const SKIP_SECONDS: i32 = 10;

// ── Query parameters ────────────────────────────────────────────────

/// Filters for the library listing commands. Unset fields are omitted.
///
/// ```
/// use music_assistant_client::api::LibraryQuery;
///
/// let query = LibraryQuery::new().in_library(true).with_limit(50);
/// assert_eq!(query.limit, Some(50));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_library: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl LibraryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_library(mut self, in_library: bool) -> Self {
        self.in_library = Some(in_library);
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }
}

/// Identifies one media item, optionally on a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRef {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_instance: Option<String>,
}

impl ItemRef {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            provider_domain: None,
            provider_instance: None,
        }
    }

    #[must_use]
    pub fn with_provider_domain(mut self, domain: impl Into<String>) -> Self {
        self.provider_domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_provider_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.provider_instance = Some(instance_id.into());
        self
    }
}

impl From<&MediaItem> for ItemRef {
    /// Refers to `item` on the provider it was listed from.
    fn from(item: &MediaItem) -> Self {
        Self::new(item.item_id.clone()).with_provider_domain(item.provider.clone())
    }
}

/// Parameters for fetching a single media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemQuery {
    #[serde(flatten)]
    pub item: ItemRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_refresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lazy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_provider_item: Option<bool>,
}

impl ItemQuery {
    pub fn new(item: impl Into<ItemRef>) -> Self {
        Self {
            item: item.into(),
            force_refresh: None,
            lazy: None,
            force_provider_item: None,
        }
    }

    #[must_use]
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = Some(force_refresh);
        self
    }

    #[must_use]
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    #[must_use]
    pub fn force_provider_item(mut self, force: bool) -> Self {
        self.force_provider_item = Some(force);
        self
    }
}

impl From<&str> for ItemRef {
    fn from(item_id: &str) -> Self {
        Self::new(item_id)
    }
}

/// What `play_media` should enqueue: one or more uris or media items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlayMedia {
    One(LibraryItem),
    Many(Vec<LibraryItem>),
}

impl From<&str> for PlayMedia {
    fn from(uri: &str) -> Self {
        Self::One(uri.into())
    }
}

impl From<MediaItem> for PlayMedia {
    fn from(item: MediaItem) -> Self {
        Self::One(item.into())
    }
}

impl From<Vec<MediaItem>> for PlayMedia {
    fn from(items: Vec<MediaItem>) -> Self {
        Self::Many(items.into_iter().map(LibraryItem::from).collect())
    }
}

impl From<Vec<LibraryItem>> for PlayMedia {
    fn from(items: Vec<LibraryItem>) -> Self {
        Self::Many(items)
    }
}

// ── Argument helpers ────────────────────────────────────────────────

/// Serializes `args` into a command argument object, dropping null fields.
fn to_args<A: Serialize + ?Sized>(args: &A) -> Result<Option<Value>> {
    match serde_json::to_value(args)? {
        Value::Object(map) => Ok(Some(Value::Object(strip_nulls(map)))),
        Value::Null => Ok(None),
        other => Err(MusicAssistantError::Protocol(format!(
            "command arguments must be an object, got {other}"
        ))),
    }
}

fn to_arg_map<A: Serialize + ?Sized>(args: &A) -> Result<Map<String, Value>> {
    match to_args(args)? {
        Some(Value::Object(map)) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn strip_nulls(mut map: Map<String, Value>) -> Map<String, Value> {
    map.retain(|_, value| !value.is_null());
    map
}

impl MusicAssistantClient {
    /// Issues `command` unless its arguments failed to serialize.
    fn request<T>(
        &self,
        command: &str,
        args: Result<Option<Value>>,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let issued = args.map(|args| self.get_data::<T>(command, args));
        async move { issued?.await }
    }

    fn command<A: Serialize + ?Sized>(&self, command: &str, args: &A) -> Result<()> {
        self.send_command(command, to_args(args)?)
    }

    fn queue_command<A: Serialize + ?Sized>(
        &self,
        queue_id: &str,
        command: &str,
        args: Option<&A>,
    ) -> Result<()> {
        let args = args.map(to_arg_map).transpose()?;
        self.throttler
            .schedule(CommandFamily::Queue, queue_id, command, args)
    }

    fn player_command<A: Serialize + ?Sized>(
        &self,
        player_id: &str,
        command: &str,
        args: Option<&A>,
    ) -> Result<()> {
        let args = args.map(to_arg_map).transpose()?;
        self.throttler
            .schedule(CommandFamily::Player, player_id, command, args)
    }

    // ── Library listings ────────────────────────────────────────────

    pub fn get_library_tracks(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/tracks", to_args(query))
    }

    pub fn get_library_artists(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/artists", to_args(query))
    }

    pub fn get_library_album_artists(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/albumartists", to_args(query))
    }

    pub fn get_library_albums(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/albums", to_args(query))
    }

    pub fn get_library_playlists(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/playlists", to_args(query))
    }

    pub fn get_library_radios(
        &self,
        query: &LibraryQuery,
    ) -> impl Future<Output = Result<PagedItems>> + Send + 'static {
        self.request("music/radios", to_args(query))
    }

    // ── Single items ────────────────────────────────────────────────

    pub fn get_track(
        &self,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        self.request("music/track", to_args(query))
    }

    pub fn get_artist(
        &self,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        self.request("music/artist", to_args(query))
    }

    pub fn get_album(
        &self,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        self.request("music/album", to_args(query))
    }

    pub fn get_playlist(
        &self,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        self.request("music/playlist", to_args(query))
    }

    pub fn get_radio(
        &self,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        self.request("music/radio", to_args(query))
    }

    /// Fetch any media item by its uri.
    pub fn get_item_by_uri(
        &self,
        uri: &str,
        force_refresh: Option<bool>,
        lazy: Option<bool>,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            uri: &'a str,
            force_refresh: Option<bool>,
            lazy: Option<bool>,
        }
        self.request(
            "music/item_by_uri",
            to_args(&Args {
                uri,
                force_refresh,
                lazy,
            }),
        )
    }

    /// Fetch any media item by media type and id.
    pub fn get_item(
        &self,
        media_type: MediaType,
        query: &ItemQuery,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            media_type: MediaType,
            #[serde(flatten)]
            query: &'a ItemQuery,
        }
        self.request("music/item", to_args(&Args { media_type, query }))
    }

    // ── Related lists ───────────────────────────────────────────────

    pub fn get_track_versions(
        &self,
        track: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/track/versions", to_args(track))
    }

    /// Url of a short audio preview of a track.
    pub fn get_track_preview_url(
        &self,
        provider_domain: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<String>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            provider_domain: &'a str,
            item_id: &'a str,
        }
        self.request(
            "music/track/preview",
            to_args(&Args {
                provider_domain,
                item_id,
            }),
        )
    }

    pub fn get_artist_tracks(
        &self,
        artist: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/artist/tracks", to_args(artist))
    }

    pub fn get_artist_albums(
        &self,
        artist: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/artist/albums", to_args(artist))
    }

    pub fn get_album_tracks(
        &self,
        album: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/album/tracks", to_args(album))
    }

    pub fn get_album_versions(
        &self,
        album: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/album/versions", to_args(album))
    }

    pub fn get_playlist_tracks(
        &self,
        playlist: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/playlist/tracks", to_args(playlist))
    }

    pub fn get_radio_versions(
        &self,
        radio: &ItemRef,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        self.request("music/radio/versions", to_args(radio))
    }

    // ── Playlists ───────────────────────────────────────────────────

    /// Create a playlist, on `provider` if given, else in the local library.
    pub fn create_playlist(
        &self,
        name: &str,
        provider: Option<&str>,
    ) -> impl Future<Output = Result<MediaItem>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            name: &'a str,
            provider: Option<&'a str>,
        }
        self.request("music/playlist/create", to_args(&Args { name, provider }))
    }

    pub fn add_playlist_tracks(&self, db_playlist_id: &str, uris: &[&str]) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            db_playlist_id: &'a str,
            uris: &'a [&'a str],
        }
        self.command(
            "music/playlist/tracks/add",
            &Args {
                db_playlist_id,
                uris,
            },
        )
    }

    pub fn remove_playlist_tracks(&self, db_playlist_id: &str, positions: &[u32]) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            db_playlist_id: &'a str,
            positions_to_remove: &'a [u32],
        }
        self.command(
            "music/playlist/tracks/remove",
            &Args {
                db_playlist_id,
                positions_to_remove: positions,
            },
        )
    }

    // ── Library management ──────────────────────────────────────────

    pub fn add_to_library(&self, media_type: MediaType, item: &ItemRef) -> Result<()> {
        self.command("music/library/add", &TypedItem { media_type, item })
    }

    pub fn remove_from_library(&self, media_type: MediaType, item: &ItemRef) -> Result<()> {
        self.command("music/library/remove", &TypedItem { media_type, item })
    }

    /// Add several items to the library and mark the full items in `items`
    /// as `in_library` right away.
    pub fn add_items_to_library(&self, items: &mut [LibraryItem]) -> Result<()> {
        self.command("music/library/add_items", &Items { items: &*items })?;
        optimistic::set_in_library(items, true);
        Ok(())
    }

    /// Remove several items from the library and clear `in_library` on the
    /// full items in `items` right away.
    pub fn remove_items_from_library(&self, items: &mut [LibraryItem]) -> Result<()> {
        self.command("music/library/remove_items", &Items { items: &*items })?;
        optimistic::set_in_library(items, false);
        Ok(())
    }

    /// Add `item` to the library if it is not in it, else remove it.
    pub fn toggle_library(&self, item: &mut MediaItem) -> Result<()> {
        let mut items = [LibraryItem::Item(item.clone())];
        if item.in_library {
            self.remove_items_from_library(&mut items)?;
        } else {
            self.add_items_to_library(&mut items)?;
        }
        item.in_library = !item.in_library;
        Ok(())
    }

    /// Delete an item from the server database.
    pub fn delete_db_item(
        &self,
        media_type: MediaType,
        db_item_id: &str,
        recursive: bool,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            media_type: MediaType,
            db_item_id: &'a str,
            recursive: bool,
        }
        self.command(
            "music/delete_db_item",
            &Args {
                media_type,
                db_item_id,
                recursive,
            },
        )
    }

    /// Start a sync of all (or the selected) music providers.
    pub fn start_sync(
        &self,
        media_types: Option<&[MediaType]>,
        providers: Option<&[&str]>,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            media_types: Option<&'a [MediaType]>,
            providers: Option<&'a [&'a str]>,
        }
        self.command(
            "music/sync",
            &Args {
                media_types,
                providers,
            },
        )
    }

    // ── Browse and search ───────────────────────────────────────────

    pub fn browse(
        &self,
        path: Option<&str>,
    ) -> impl Future<Output = Result<BrowseFolder>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            path: Option<&'a str>,
        }
        self.request("music/browse", to_args(&Args { path }))
    }

    pub fn search(
        &self,
        search_query: &str,
        media_types: Option<&[MediaType]>,
        limit: Option<u32>,
    ) -> impl Future<Output = Result<Vec<MediaItem>>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            search_query: &'a str,
            media_types: Option<&'a [MediaType]>,
            limit: Option<u32>,
        }
        self.request(
            "music/search",
            to_args(&Args {
                search_query,
                media_types,
                limit,
            }),
        )
    }

    /// Thumbnail for a local file path, as a data url.
    pub fn get_local_thumb(
        &self,
        path: &str,
        size: Option<u32>,
    ) -> impl Future<Output = Result<String>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            path: &'a str,
            size: Option<u32>,
        }
        self.request("thumb", to_args(&Args { path, size }))
    }

    // ── Players and queues ──────────────────────────────────────────

    pub fn get_players(&self) -> impl Future<Output = Result<Vec<Player>>> + Send + 'static {
        self.get_data("players/all", None)
    }

    pub fn get_player_queues(
        &self,
    ) -> impl Future<Output = Result<Vec<PlayerQueue>>> + Send + 'static {
        self.get_data("players/queue/all", None)
    }

    pub fn get_player_queue_items(
        &self,
        queue_id: &str,
    ) -> impl Future<Output = Result<Vec<QueueItem>>> + Send + 'static {
        #[derive(Serialize)]
        struct Args<'a> {
            queue_id: &'a str,
        }
        self.request("players/queue/items", to_args(&Args { queue_id }))
    }

    // ── Queue commands (throttled) ──────────────────────────────────

    pub fn queue_command_play(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "play", None)
    }

    pub fn queue_command_pause(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "pause", None)
    }

    pub fn queue_command_play_pause(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "play_pause", None)
    }

    pub fn queue_command_stop(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "stop", None)
    }

    pub fn queue_command_next(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "next", None)
    }

    pub fn queue_command_previous(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "previous", None)
    }

    pub fn queue_command_clear(&self, queue_id: &str) -> Result<()> {
        self.queue_command::<()>(queue_id, "clear", None)
    }

    /// Play the item at `index` in the queue.
    pub fn queue_command_play_index(&self, queue_id: &str, index: u32) -> Result<()> {
        #[derive(Serialize)]
        struct Args {
            index: u32,
        }
        self.queue_command(queue_id, "play_index", Some(&Args { index }))
    }

    /// Move a queue item by `pos_shift` places: positive moves it down,
    /// negative moves it up, zero makes it the next item.
    pub fn queue_command_move_item(
        &self,
        queue_id: &str,
        queue_item_id: &str,
        pos_shift: i32,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            queue_item_id: &'a str,
            pos_shift: i32,
        }
        self.queue_command(
            queue_id,
            "move_item",
            Some(&Args {
                queue_item_id,
                pos_shift,
            }),
        )
    }

    pub fn queue_command_move_up(&self, queue_id: &str, queue_item_id: &str) -> Result<()> {
        self.queue_command_move_item(queue_id, queue_item_id, -1)
    }

    pub fn queue_command_move_down(&self, queue_id: &str, queue_item_id: &str) -> Result<()> {
        self.queue_command_move_item(queue_id, queue_item_id, 1)
    }

    pub fn queue_command_move_next(&self, queue_id: &str, queue_item_id: &str) -> Result<()> {
        self.queue_command_move_item(queue_id, queue_item_id, 0)
    }

    pub fn queue_command_delete(&self, queue_id: &str, queue_item_id: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            queue_item_id: &'a str,
        }
        self.queue_command(queue_id, "delete_item", Some(&Args { queue_item_id }))
    }

    /// Seek to `position` seconds in the current item.
    pub fn queue_command_seek(&self, queue_id: &str, position: u32) -> Result<()> {
        #[derive(Serialize)]
        struct Args {
            position: u32,
        }
        self.queue_command(queue_id, "seek", Some(&Args { position }))
    }

    /// Skip `seconds` forward in the current item; negative skips back.
    pub fn queue_command_skip(&self, queue_id: &str, seconds: i32) -> Result<()> {
        #[derive(Serialize)]
        struct Args {
            seconds: i32,
        }
        self.queue_command(queue_id, "skip", Some(&Args { seconds }))
    }

    pub fn queue_command_skip_ahead(&self, queue_id: &str) -> Result<()> {
        self.queue_command_skip(queue_id, SKIP_SECONDS)
    }

    pub fn queue_command_skip_back(&self, queue_id: &str) -> Result<()> {
        self.queue_command_skip(queue_id, -SKIP_SECONDS)
    }

    /// Set the combined volume of a player group and update the mirrored
    /// group volume right away.
    pub fn queue_command_group_volume(&self, player_id: &str, volume_level: u8) -> Result<()> {
        self.player_command(player_id, "group_volume", Some(&Volume { volume_level }))?;
        optimistic::set_group_volume(&self.mirror().players, player_id, volume_level);
        Ok(())
    }

    // ── Player commands (throttled) ─────────────────────────────────

    pub fn player_command_power(&self, player_id: &str, powered: bool) -> Result<()> {
        #[derive(Serialize)]
        struct Args {
            powered: bool,
        }
        self.player_command(player_id, "power", Some(&Args { powered }))
    }

    /// Invert the mirrored power state of a player.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::PlayerNotFound`] if the player is not
    /// mirrored.
    pub fn player_command_power_toggle(&self, player_id: &str) -> Result<()> {
        let powered = optimistic::toggled_power(&self.mirror().players, player_id)?;
        self.player_command_power(player_id, powered)
    }

    /// Set the volume of a player and update the mirrored volume right away.
    pub fn player_command_volume_set(&self, player_id: &str, volume_level: u8) -> Result<()> {
        self.player_command(player_id, "volume_set", Some(&Volume { volume_level }))?;
        optimistic::set_volume(&self.mirror().players, player_id, volume_level);
        Ok(())
    }

    /// Raise the volume by five steps from the mirrored level, up to 100.
    pub fn player_command_volume_up(&self, player_id: &str) -> Result<()> {
        let level = optimistic::stepped_volume(&self.mirror().players, player_id, VOLUME_STEP)?;
        self.player_command_volume_set(player_id, level)
    }

    /// Lower the volume by five steps from the mirrored level, down to 0.
    pub fn player_command_volume_down(&self, player_id: &str) -> Result<()> {
        let level = optimistic::stepped_volume(&self.mirror().players, player_id, -VOLUME_STEP)?;
        self.player_command_volume_set(player_id, level)
    }

    // ── Playback ────────────────────────────────────────────────────

    /// Enqueue media on a queue. Without a `queue_id` the server picks the
    /// queue.
    pub fn play_media(
        &self,
        media: impl Into<PlayMedia>,
        option: QueueOption,
        radio_mode: Option<bool>,
        queue_id: Option<&str>,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Args<'a> {
            queue_id: Option<&'a str>,
            media: PlayMedia,
            option: QueueOption,
            radio_mode: Option<bool>,
        }
        self.command(
            "players/queue/play_media",
            &Args {
                queue_id,
                media: media.into(),
                option,
                radio_mode,
            },
        )
    }

    /// Play a playlist starting at track `start_index`.
    ///
    /// The start track replaces the queue and the remaining tracks are
    /// appended, so shuffle still starts with the chosen track. An index past
    /// the end plays nothing.
    pub async fn play_playlist_from_index(
        &self,
        playlist: &MediaItem,
        start_index: usize,
        queue_id: Option<&str>,
    ) -> Result<()> {
        let tracks = self.get_playlist_tracks(&ItemRef::from(playlist)).await?;
        self.play_tracks_from(tracks, start_index, queue_id)
    }

    /// Play an album starting at `start_track`, or at its first track if
    /// `start_track` is not on the album.
    pub async fn play_album_from_item(
        &self,
        album: &MediaItem,
        start_track: &MediaItem,
        queue_id: Option<&str>,
    ) -> Result<()> {
        let tracks = self.get_album_tracks(&ItemRef::from(album)).await?;
        let start_index = tracks
            .iter()
            .rposition(|track| track.item_id == start_track.item_id)
            .unwrap_or(0);
        self.play_tracks_from(tracks, start_index, queue_id)
    }

    fn play_tracks_from(
        &self,
        mut tracks: Vec<MediaItem>,
        start_index: usize,
        queue_id: Option<&str>,
    ) -> Result<()> {
        if start_index >= tracks.len() {
            tracing::debug!(start_index, len = tracks.len(), "start index past the end");
            return Ok(());
        }
        let rest = tracks.split_off(start_index + 1);
        let Some(first) = tracks.pop() else {
            return Ok(());
        };
        self.play_media(first, QueueOption::Replace, None, queue_id)?;
        if !rest.is_empty() {
            self.play_media(rest, QueueOption::Add, None, queue_id)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Volume {
    volume_level: u8,
}

#[derive(Serialize)]
struct TypedItem<'a> {
    media_type: MediaType,
    #[serde(flatten)]
    item: &'a ItemRef,
}

#[derive(Serialize)]
struct Items<'a> {
    items: &'a [LibraryItem],
}
