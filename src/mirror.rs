//! Local mirror of server-side players, queues and providers.
//!
//! Each map lives in an [`EntityStore`] built on a `tokio::sync::watch`
//! channel. The store itself is never replaced: bulk refreshes and events
//! mutate it in place, so a [`watch::Receiver`] obtained from
//! [`EntityStore::watch`] keeps observing the same container across
//! reconnects. Entries are never pruned on refresh; only an explicit removal
//! event deletes one.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::correlator::CommandCorrelator;
use crate::error::Result;
use crate::models::{Player, PlayerQueue, ProviderInstance};
use crate::protocol::{EventMessage, EventType};

/// An entity that is mirrored locally, keyed by its server-assigned id.
pub trait MirrorEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The server-assigned id used as the map key.
    fn entity_id(&self) -> &str;
}

impl MirrorEntity for Player {
    fn entity_id(&self) -> &str {
        &self.player_id
    }
}

impl MirrorEntity for PlayerQueue {
    fn entity_id(&self) -> &str {
        &self.queue_id
    }
}

impl MirrorEntity for ProviderInstance {
    fn entity_id(&self) -> &str {
        &self.instance_id
    }
}

/// An observable map of mirrored entities.
#[derive(Debug)]
pub struct EntityStore<T> {
    map: watch::Sender<HashMap<String, T>>,
}

impl<T: MirrorEntity> EntityStore<T> {
    fn new() -> Self {
        Self {
            map: watch::channel(HashMap::new()).0,
        }
    }

    /// Returns a copy of the entity with `id`.
    pub fn get(&self, id: &str) -> Option<T> {
        self.map.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    /// Returns a copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, T> {
        self.map.borrow().clone()
    }

    /// Returns the first entity matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.map.borrow().values().find(|e| predicate(e)).cloned()
    }

    /// Subscribes to changes of the map. The receiver stays valid for the
    /// lifetime of the client.
    pub fn watch(&self) -> watch::Receiver<HashMap<String, T>> {
        self.map.subscribe()
    }

    /// Inserts or overwrites `entity` under its own id.
    pub(crate) fn upsert(&self, entity: T) {
        self.map.send_modify(|map| {
            map.insert(entity.entity_id().to_string(), entity);
        });
    }

    /// Upserts every entity; existing entries not named are kept.
    pub(crate) fn extend(&self, entities: Vec<T>) {
        self.map.send_modify(|map| {
            for entity in entities {
                map.insert(entity.entity_id().to_string(), entity);
            }
        });
    }

    /// Merges the fields of `patch` into the existing record, or inserts the
    /// patch as a new record if the id is unknown.
    ///
    /// Read, merge and write happen under one lock of the map, so a
    /// concurrent optimistic update is never overwritten with a stale copy.
    pub(crate) fn merge(&self, patch: &Map<String, Value>) -> Result<()> {
        let incoming: T = serde_json::from_value(Value::Object(patch.clone()))?;
        let id = incoming.entity_id().to_string();
        let mut outcome = Ok(());
        self.map.send_if_modified(|map| match map.get_mut(&id) {
            Some(existing) => match merge_fields(existing, patch) {
                Ok(merged) => {
                    *existing = merged;
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            },
            None => {
                map.insert(id.clone(), incoming);
                true
            }
        });
        outcome
    }

    /// Applies `update` only if `id` is present. Returns whether it was.
    pub(crate) fn update_existing(&self, id: &str, update: impl FnOnce(&mut T)) -> bool {
        self.map.send_if_modified(|map| match map.get_mut(id) {
            Some(entity) => {
                update(entity);
                true
            }
            None => false,
        })
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.map.send_if_modified(|map| map.remove(id).is_some())
    }
}

/// Shallow field merge: every top-level key of `patch` overwrites the same key
/// of `existing`; keys missing from the patch keep their current value.
fn merge_fields<T: MirrorEntity>(existing: &T, patch: &Map<String, Value>) -> Result<T> {
    let mut value = serde_json::to_value(existing)?;
    if let Value::Object(fields) = &mut value {
        for (key, field) in patch {
            fields.insert(key.clone(), field.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// The three mirrored maps.
#[derive(Debug)]
pub struct StateMirror {
    pub players: EntityStore<Player>,
    pub queues: EntityStore<PlayerQueue>,
    pub providers: EntityStore<ProviderInstance>,
}

impl StateMirror {
    pub(crate) fn new() -> Self {
        Self {
            players: EntityStore::new(),
            queues: EntityStore::new(),
            providers: EntityStore::new(),
        }
    }

    /// Issues the three bulk fetches.
    ///
    /// Each result is applied from inside the correlator's `resolve`, on the
    /// connection task, before the next frame is handled. An event that
    /// arrives after a fetch result therefore always lands on top of it.
    pub(crate) fn refresh(self: &Arc<Self>, correlator: &CommandCorrelator) {
        self.fetch_into(correlator, "players/all", "players", |m| &m.players);
        self.fetch_into(correlator, "players/queue/all", "queues", |m| &m.queues);
        self.fetch_into(correlator, "providers", "providers", |m| &m.providers);
    }

    fn fetch_into<T: MirrorEntity>(
        self: &Arc<Self>,
        correlator: &CommandCorrelator,
        command: &str,
        kind: &'static str,
        store: fn(&StateMirror) -> &EntityStore<T>,
    ) {
        let mirror = Arc::clone(self);
        let hook = Box::new(move |outcome: Result<Value>| {
            let fetched = outcome
                .and_then(|value| serde_json::from_value::<Vec<T>>(value).map_err(Into::into));
            mirror.apply_bulk(kind, store(&mirror), fetched);
        });
        if let Err(e) = correlator.request_with(command, None, hook) {
            warn!(kind, "bulk state refresh not sent: {e}");
        }
    }

    fn apply_bulk<T: MirrorEntity>(&self, kind: &str, store: &EntityStore<T>, fetched: Result<Vec<T>>) {
        match fetched {
            Ok(entities) => {
                debug!(kind, count = entities.len(), "bulk state refresh");
                store.extend(entities);
            }
            Err(e) => warn!(kind, "bulk state refresh failed: {e}"),
        }
    }

    /// Applies an incoming event to the mirrored maps.
    pub(crate) fn apply_event(&self, msg: &EventMessage) {
        let outcome = match &msg.event {
            EventType::PlayerAdded => self.insert_from(&self.players, &msg.data),
            EventType::PlayerUpdated => self.merge_from(&self.players, &msg.data),
            EventType::PlayerRemoved => {
                if let Some(player_id) = &msg.object_id {
                    self.players.remove(player_id);
                }
                Ok(())
            }
            EventType::QueueAdded => self.insert_from(&self.queues, &msg.data),
            EventType::QueueUpdated => self.merge_from(&self.queues, &msg.data),
            EventType::QueueTimeUpdated => {
                if let (Some(queue_id), Some(elapsed)) = (&msg.object_id, msg.data.as_f64()) {
                    self.queues
                        .update_existing(queue_id, |queue| queue.elapsed_time = elapsed);
                }
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            warn!(event = %msg.event, "could not apply event to state mirror: {e}");
        }
    }

    fn insert_from<T: MirrorEntity>(&self, store: &EntityStore<T>, data: &Value) -> Result<()> {
        store.upsert(serde_json::from_value(data.clone())?);
        Ok(())
    }

    fn merge_from<T: MirrorEntity>(&self, store: &EntityStore<T>, data: &Value) -> Result<()> {
        match data {
            Value::Object(patch) => store.merge(patch),
            other => self.insert_from(store, other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event: EventType, object_id: Option<&str>, data: Value) -> EventMessage {
        EventMessage {
            event,
            object_id: object_id.map(str::to_string),
            data,
        }
    }

    #[test]
    fn queue_updated_inserts_then_merges() {
        let mirror = StateMirror::new();
        mirror.apply_event(&event(
            EventType::QueueUpdated,
            Some("q1"),
            json!({"queue_id": "q1", "name": "Kitchen", "shuffle_enabled": true, "repeat_mode": "all"}),
        ));
        assert!(mirror.queues.contains("q1"));

        mirror.apply_event(&event(
            EventType::QueueUpdated,
            Some("q1"),
            json!({"queue_id": "q1", "elapsed_time": 12.0}),
        ));

        let queue = mirror.queues.get("q1").unwrap();
        assert_eq!(queue.name, "Kitchen");
        assert!(queue.shuffle_enabled);
        assert_eq!(queue.extra["repeat_mode"], "all");
        assert!((queue.elapsed_time - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn player_added_overwrites_whole_record() {
        let mirror = StateMirror::new();
        mirror.apply_event(&event(
            EventType::PlayerAdded,
            None,
            json!({"player_id": "p1", "name": "Old", "powered": true}),
        ));
        mirror.apply_event(&event(
            EventType::PlayerAdded,
            None,
            json!({"player_id": "p1", "name": "New"}),
        ));
        let player = mirror.players.get("p1").unwrap();
        assert_eq!(player.name, "New");
        assert!(!player.powered);
    }

    #[test]
    fn time_update_for_unknown_queue_is_ignored() {
        let mirror = StateMirror::new();
        let rx = mirror.queues.watch();
        mirror.apply_event(&event(EventType::QueueTimeUpdated, Some("ghost"), json!(5)));
        assert!(mirror.queues.is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn time_update_for_known_queue_sets_elapsed() {
        let mirror = StateMirror::new();
        mirror.queues.upsert(PlayerQueue::new("q1"));
        mirror.apply_event(&event(EventType::QueueTimeUpdated, Some("q1"), json!(77.5)));
        assert!((mirror.queues.get("q1").unwrap().elapsed_time - 77.5).abs() < f64::EPSILON);
    }

    #[test]
    fn player_removed_deletes_entry() {
        let mirror = StateMirror::new();
        mirror.players.upsert(Player::new("p1"));
        mirror.players.upsert(Player::new("p2"));
        mirror.apply_event(&event(EventType::PlayerRemoved, Some("p1"), Value::Null));
        assert!(!mirror.players.contains("p1"));
        assert!(mirror.players.contains("p2"));
    }

    #[test]
    fn malformed_payload_leaves_mirror_unchanged() {
        let mirror = StateMirror::new();
        mirror.apply_event(&event(EventType::PlayerAdded, None, json!({"name": "no id"})));
        assert!(mirror.players.is_empty());
    }

    #[test]
    fn extend_keeps_stale_entries() {
        let mirror = StateMirror::new();
        mirror.players.upsert(Player::new("stale"));
        mirror
            .players
            .extend(vec![Player::new("fresh"), Player::new("other")]);
        assert_eq!(mirror.players.len(), 3);
        assert!(mirror.players.contains("stale"));
    }

    #[test]
    fn watchers_see_changes_on_the_same_container() {
        let mirror = StateMirror::new();
        let mut rx = mirror.players.watch();
        mirror.players.extend(vec![Player::new("a")]);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().contains_key("a"));

        mirror.players.upsert(Player::new("b"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);
    }

    #[test]
    fn merge_keeps_concurrent_volume_updates() {
        let mirror = StateMirror::new();
        mirror.players.upsert(Player::new("p1"));
        let patch = json!({"player_id": "p1", "name": "Kitchen"})
            .as_object()
            .cloned()
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for level in 1..=100u8 {
                    mirror
                        .players
                        .update_existing("p1", |p| p.volume_level = level);
                }
            });
            let mut last = 0;
            for _ in 0..500 {
                mirror.players.merge(&patch).unwrap();
                let level = mirror.players.get("p1").unwrap().volume_level;
                assert!(level >= last, "volume went back from {last} to {level}");
                last = level;
            }
        });

        let player = mirror.players.get("p1").unwrap();
        assert_eq!(player.volume_level, 100);
        assert_eq!(player.name, "Kitchen");
    }

    #[test]
    fn bulk_results_apply_in_frame_order_with_events() {
        use crate::client::ConnectionState;
        use crate::protocol::{CommandOutcome, ResultMessage};
        use tokio::sync::mpsc;

        let (_state, state_rx) = watch::channel(ConnectionState::Connected);
        let (tx, mut sent) = mpsc::unbounded_channel();
        let correlator = CommandCorrelator::new(state_rx, tx);
        let mirror = Arc::new(StateMirror::new());

        mirror.refresh(&correlator);
        let mut commands = Vec::new();
        while let Ok(raw) = sent.try_recv() {
            let cmd: crate::protocol::CommandMessage = serde_json::from_str(&raw).unwrap();
            commands.push((cmd.command, cmd.message_id));
        }
        assert_eq!(
            commands,
            vec![
                ("players/all".to_string(), 1),
                ("players/queue/all".to_string(), 2),
                ("providers".to_string(), 3)
            ]
        );

        let reply = |message_id, value| ResultMessage {
            message_id,
            outcome: CommandOutcome::Success(value),
        };
        correlator.resolve(reply(1, json!([{"player_id": "p1", "volume_level": 10}])));
        assert_eq!(mirror.players.get("p1").unwrap().volume_level, 10);

        mirror.apply_event(&event(
            EventType::PlayerUpdated,
            Some("p1"),
            json!({"player_id": "p1", "volume_level": 80}),
        ));
        correlator.resolve(reply(2, json!([])));
        correlator.resolve(ResultMessage {
            message_id: 3,
            outcome: CommandOutcome::Error {
                error_code: "unavailable".into(),
                details: None,
            },
        });

        assert_eq!(mirror.players.get("p1").unwrap().volume_level, 80);
        assert!(mirror.providers.is_empty());
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn find_by_predicate() {
        let mirror = StateMirror::new();
        let mut provider: ProviderInstance = serde_json::from_value(json!({
            "instance_id": "spotify--1", "domain": "spotify"
        }))
        .unwrap();
        mirror.providers.upsert(provider.clone());
        provider.instance_id = "filesystem--2".into();
        provider.domain = "filesystem_local".into();
        mirror.providers.upsert(provider);

        let found = mirror
            .providers
            .find(|p| p.domain == "filesystem_local")
            .unwrap();
        assert_eq!(found.instance_id, "filesystem--2");
    }
}
