//! Local updates applied before the server confirms a command.
//!
//! The server eventually broadcasts the authoritative state as an event, which
//! overwrites whatever was applied here. Nothing is rolled back if the command
//! fails.

use crate::error::{MusicAssistantError, Result};
use crate::mirror::EntityStore;
use crate::models::{LibraryItem, Player};

/// Volume change applied by a single step up or down.
pub const VOLUME_STEP: i16 = 5;

/// Marks every full media item in `items` as in (or out of) the library.
/// Bare uris are left alone.
pub fn set_in_library(items: &mut [LibraryItem], in_library: bool) {
    for item in items.iter_mut().filter_map(LibraryItem::as_item_mut) {
        item.in_library = in_library;
    }
}

/// Sets the mirrored volume of `player_id`. Unknown players are left alone.
pub(crate) fn set_volume(players: &EntityStore<Player>, player_id: &str, level: u8) {
    players.update_existing(player_id, |player| player.volume_level = level);
}

/// Sets the mirrored group volume of `player_id`. Unknown players are left
/// alone.
pub(crate) fn set_group_volume(players: &EntityStore<Player>, player_id: &str, level: u8) {
    players.update_existing(player_id, |player| player.group_volume = level);
}

/// Computes the volume one step away from the mirrored level, clamped to
/// `0..=100`.
pub(crate) fn stepped_volume(
    players: &EntityStore<Player>,
    player_id: &str,
    delta: i16,
) -> Result<u8> {
    let current = players
        .get(player_id)
        .ok_or_else(|| MusicAssistantError::PlayerNotFound(player_id.to_string()))?
        .volume_level;
    let next = (i16::from(current) + delta).clamp(0, 100);
    Ok(u8::try_from(next).unwrap_or(100))
}

/// Returns the inverted power state of `player_id`.
pub(crate) fn toggled_power(players: &EntityStore<Player>, player_id: &str) -> Result<bool> {
    players
        .get(player_id)
        .map(|player| !player.powered)
        .ok_or_else(|| MusicAssistantError::PlayerNotFound(player_id.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::mirror::StateMirror;
    use crate::models::MediaItem;
    use serde_json::json;

    fn item(id: &str, in_library: bool) -> LibraryItem {
        let item: MediaItem =
            serde_json::from_value(json!({"item_id": id, "in_library": in_library})).unwrap();
        item.into()
    }

    #[test]
    fn library_flag_flips_on_items_only() {
        let mut items = vec![item("1", false), "spotify://track/2".into(), item("3", false)];
        set_in_library(&mut items, true);
        assert!(matches!(&items[0], LibraryItem::Item(i) if i.in_library));
        assert!(matches!(&items[1], LibraryItem::Uri(_)));
        assert!(matches!(&items[2], LibraryItem::Item(i) if i.in_library));

        set_in_library(&mut items, false);
        assert!(matches!(&items[0], LibraryItem::Item(i) if !i.in_library));
    }

    #[test]
    fn volume_steps_clamp_to_range() {
        let mirror = StateMirror::new();
        let mut player = Player::new("p1");
        player.volume_level = 98;
        mirror.players.upsert(player);

        assert_eq!(stepped_volume(&mirror.players, "p1", VOLUME_STEP).unwrap(), 100);
        set_volume(&mirror.players, "p1", 3);
        assert_eq!(stepped_volume(&mirror.players, "p1", -VOLUME_STEP).unwrap(), 0);
    }

    #[test]
    fn unknown_player_is_reported() {
        let mirror = StateMirror::new();
        assert!(matches!(
            stepped_volume(&mirror.players, "ghost", VOLUME_STEP),
            Err(MusicAssistantError::PlayerNotFound(id)) if id == "ghost"
        ));
        assert!(toggled_power(&mirror.players, "ghost").is_err());
        set_group_volume(&mirror.players, "ghost", 40);
        assert!(mirror.players.is_empty());
    }

    #[test]
    fn group_volume_and_power() {
        let mirror = StateMirror::new();
        mirror.players.upsert(Player::new("g1"));
        set_group_volume(&mirror.players, "g1", 40);
        assert_eq!(mirror.players.get("g1").unwrap().group_volume, 40);
        assert!(toggled_power(&mirror.players, "g1").unwrap());
    }
}
