//! Debounced delivery of player and queue commands.
//!
//! Sliders in a UI fire many volume or seek changes in quick succession. The
//! throttler delays each command by a short window and drops it if another
//! command claims the same slot before the window elapses, so only the last
//! call of a burst reaches the server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::correlator::CommandCorrelator;
use crate::error::{MusicAssistantError, Result};

/// How throttled commands share debounce slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleStrategy {
    /// One slot for the whole client. A queue command cancels a pending
    /// player command and vice versa, whatever their targets.
    #[default]
    Shared,
    /// One slot per command family and target id. Commands to different
    /// players or queues never cancel each other.
    PerTarget,
}

/// The two families of throttled commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CommandFamily {
    /// `players/cmd/{command}` with a `player_id` argument.
    Player,
    /// `players/queue/{command}` with a `queue_id` argument.
    Queue,
}

impl CommandFamily {
    fn path(self, command: &str) -> String {
        match self {
            Self::Player => format!("players/cmd/{command}"),
            Self::Queue => format!("players/queue/{command}"),
        }
    }

    fn target_key(self) -> &'static str {
        match self {
            Self::Player => "player_id",
            Self::Queue => "queue_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Shared,
    Target(CommandFamily, String),
}

pub(crate) struct CommandThrottler {
    window: Duration,
    strategy: ThrottleStrategy,
    slots: Mutex<HashMap<SlotKey, JoinHandle<()>>>,
    runtime: OnceLock<Handle>,
    correlator: Arc<CommandCorrelator>,
}

impl CommandThrottler {
    pub(crate) fn new(
        window: Duration,
        strategy: ThrottleStrategy,
        correlator: Arc<CommandCorrelator>,
    ) -> Self {
        Self {
            window,
            strategy,
            slots: Mutex::new(HashMap::new()),
            runtime: OnceLock::new(),
            correlator,
        }
    }

    /// Binds the throttler to the runtime its timers run on. Only the first
    /// call has an effect.
    pub(crate) fn bind_runtime(&self, runtime: Handle) {
        let _ = self.runtime.set(runtime);
    }

    /// Schedules `command` for `target` after the throttle window, replacing
    /// whatever is pending in the same slot.
    ///
    /// `args` must be a JSON object or `None`; the target id is added under
    /// `player_id` or `queue_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::NotConnected`] if the client is not
    /// connected when the command is scheduled. A connection lost before the
    /// window elapses is only logged.
    pub(crate) fn schedule(
        &self,
        family: CommandFamily,
        target: &str,
        command: &str,
        args: Option<Map<String, Value>>,
    ) -> Result<()> {
        if !self.correlator.is_connected() {
            return Err(MusicAssistantError::NotConnected);
        }
        let runtime = self
            .runtime
            .get()
            .cloned()
            .or_else(|| Handle::try_current().ok())
            .ok_or(MusicAssistantError::NotConnected)?;

        let mut payload = Map::new();
        payload.insert(family.target_key().to_string(), Value::from(target));
        payload.extend(args.unwrap_or_default());
        let command = family.path(command);

        let key = match self.strategy {
            ThrottleStrategy::Shared => SlotKey::Shared,
            ThrottleStrategy::PerTarget => SlotKey::Target(family, target.to_string()),
        };

        let correlator = Arc::clone(&self.correlator);
        let window = self.window;
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, task| !task.is_finished());
        let task = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            if let Err(e) = correlator.send_command(&command, Some(Value::Object(payload))) {
                warn!(%command, "throttled command dropped: {e}");
            }
        });
        if let Some(superseded) = slots.insert(key, task) {
            if !superseded.is_finished() {
                debug!("superseding pending throttled command");
            }
            superseded.abort();
        }
        Ok(())
    }

    #[cfg(test)]
    fn pending_slots(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl Drop for CommandThrottler {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in slots.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use crate::protocol::CommandMessage;
    use serde_json::json;
    use tokio::sync::{mpsc, watch};

    const WINDOW: Duration = Duration::from_millis(200);

    struct Harness {
        throttler: CommandThrottler,
        state: watch::Sender<ConnectionState>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    fn harness(strategy: ThrottleStrategy) -> Harness {
        let (state, state_rx) = watch::channel(ConnectionState::Connected);
        let (tx, sent) = mpsc::unbounded_channel();
        let correlator = Arc::new(CommandCorrelator::new(state_rx, tx));
        Harness {
            throttler: CommandThrottler::new(WINDOW, strategy, correlator),
            state,
            sent,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<CommandMessage> {
        let mut out = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            out.push(serde_json::from_str(&raw).unwrap());
        }
        out
    }

    fn volume(level: u8) -> Option<Map<String, Value>> {
        let mut args = Map::new();
        args.insert("volume_level".into(), json!(level));
        Some(args)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_sends_only_the_last_call() {
        let mut h = harness(ThrottleStrategy::Shared);
        h.throttler
            .schedule(CommandFamily::Player, "p1", "volume_set", volume(50))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.throttler
            .schedule(CommandFamily::Player, "p1", "volume_set", volume(70))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(drain(&mut h.sent).is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let sent = drain(&mut h.sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, "players/cmd/volume_set");
        assert_eq!(
            sent[0].args,
            Some(json!({"player_id": "p1", "volume_level": 70}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn calls_outside_window_are_all_sent() {
        let mut h = harness(ThrottleStrategy::Shared);
        h.throttler
            .schedule(CommandFamily::Queue, "q1", "next", None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.throttler
            .schedule(CommandFamily::Queue, "q1", "next", None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let sent = drain(&mut h.sent);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].command, "players/queue/next");
        assert_eq!(sent[0].args, Some(json!({"queue_id": "q1"})));
        assert!(sent[1].message_id > sent[0].message_id);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_slot_cancels_across_targets_and_families() {
        let mut h = harness(ThrottleStrategy::Shared);
        h.throttler
            .schedule(CommandFamily::Player, "p1", "power", None)
            .unwrap();
        h.throttler
            .schedule(CommandFamily::Queue, "q2", "pause", None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let sent = drain(&mut h.sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, "players/queue/pause");
    }

    #[tokio::test(start_paused = true)]
    async fn per_target_slots_are_independent() {
        let mut h = harness(ThrottleStrategy::PerTarget);
        h.throttler
            .schedule(CommandFamily::Player, "p1", "volume_set", volume(10))
            .unwrap();
        h.throttler
            .schedule(CommandFamily::Player, "p2", "volume_set", volume(20))
            .unwrap();
        h.throttler
            .schedule(CommandFamily::Player, "p1", "volume_set", volume(30))
            .unwrap();
        assert_eq!(h.throttler.pending_slots(), 2);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut sent: Vec<Value> = drain(&mut h.sent)
            .into_iter()
            .map(|c| c.args.unwrap())
            .collect();
        sent.sort_by_key(|args| args["player_id"].as_str().unwrap().to_string());
        assert_eq!(
            sent,
            vec![
                json!({"player_id": "p1", "volume_level": 30}),
                json!({"player_id": "p2", "volume_level": 20}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scheduling_while_disconnected_fails_immediately() {
        let h = harness(ThrottleStrategy::Shared);
        h.state.send_replace(ConnectionState::Connecting);
        let err = h
            .throttler
            .schedule(CommandFamily::Queue, "q1", "play", None)
            .unwrap_err();
        assert!(matches!(err, MusicAssistantError::NotConnected));
        assert_eq!(h.throttler.pending_slots(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_timer_fires_drops_the_command() {
        let mut h = harness(ThrottleStrategy::Shared);
        h.throttler
            .schedule(CommandFamily::Queue, "q1", "play", None)
            .unwrap();
        h.state.send_replace(ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(drain(&mut h.sent).is_empty());
        assert_eq!(h.throttler.pending_slots(), 0);
    }
}
