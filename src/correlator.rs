//! Command correlation: id allocation, the pending-command table, and the
//! send primitives built on top of them.
//!
//! A pending command lives in the table from the moment it is sent until a
//! result frame with its id arrives. Nothing else removes it: a reconnect does
//! not reject or re-send outstanding commands, so a command whose result was
//! lost with the old socket stays pending for the lifetime of the client.
//! There is no per-command timeout and no cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::client::ConnectionState;
use crate::error::{MusicAssistantError, Result};
use crate::protocol::{CommandMessage, MessageId, ResultMessage};

/// Callback run by [`CommandCorrelator::resolve`] with a command's outcome.
pub(crate) type ResultHook = Box<dyn FnOnce(Result<Value>) + Send>;

/// How a pending command is settled.
enum Completion {
    /// Wakes the future returned by `get_data`.
    Channel(oneshot::Sender<Result<Value>>),
    /// Runs inline on the task that received the result frame, before the
    /// next frame is handled.
    Hook(ResultHook),
}

/// Allocates correlation ids, tracks outstanding commands and resolves them
/// from result frames.
pub(crate) struct CommandCorrelator {
    last_id: AtomicU64,
    pending: Mutex<HashMap<MessageId, Completion>>,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<String>,
}

impl CommandCorrelator {
    pub(crate) fn new(
        state: watch::Receiver<ConnectionState>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            last_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            state,
            outbound,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    fn next_id(&self) -> MessageId {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sends a fire-and-forget command.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::NotConnected`] without allocating an id
    /// if the connection state is not `Connected`.
    pub(crate) fn send_command(&self, command: &str, args: Option<Value>) -> Result<()> {
        self.ensure_connected()?;
        self.send_with_id(command, args, self.next_id())
    }

    /// Sends a command and returns a future for its result.
    ///
    /// Everything up to and including the send happens before this returns;
    /// the future only waits for the result frame.
    pub(crate) fn get_data<T>(
        &self,
        command: &str,
        args: Option<Value>,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let issued = self.request(command, args);
        async move {
            let completion = issued?;
            let value = completion
                .await
                .map_err(|_| MusicAssistantError::ClientClosed)??;
            Ok(serde_json::from_value(value)?)
        }
    }

    fn request(
        &self,
        command: &str,
        args: Option<Value>,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.register(command, args, Completion::Channel(tx))?;
        Ok(rx)
    }

    /// Sends a command whose outcome is handed to `hook` from inside
    /// [`resolve`](Self::resolve), in frame order with events.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::NotConnected`] if the connection state
    /// is not `Connected`; `hook` is dropped without running.
    pub(crate) fn request_with(
        &self,
        command: &str,
        args: Option<Value>,
        hook: ResultHook,
    ) -> Result<()> {
        self.register(command, args, Completion::Hook(hook))
    }

    fn register(&self, command: &str, args: Option<Value>, completion: Completion) -> Result<()> {
        self.ensure_connected()?;
        let id = self.next_id();
        self.lock_pending().insert(id, completion);
        if let Err(e) = self.send_with_id(command, args, id) {
            self.lock_pending().remove(&id);
            return Err(e);
        }
        Ok(())
    }

    fn send_with_id(&self, command: &str, args: Option<Value>, message_id: MessageId) -> Result<()> {
        let msg = CommandMessage {
            command: command.to_string(),
            message_id,
            args,
        };
        debug!(command = %msg.command, message_id, "[send_command]");
        let json = serde_json::to_string(&msg)?;
        self.outbound
            .send(json)
            .map_err(|_| MusicAssistantError::NotConnected)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MusicAssistantError::NotConnected)
        }
    }

    /// Settles the pending command named by `result`.
    ///
    /// Returns `false` for unknown or already settled ids; those results are
    /// dropped.
    pub(crate) fn resolve(&self, result: ResultMessage) -> bool {
        let Some(completion) = self.lock_pending().remove(&result.message_id) else {
            return false;
        };
        let outcome = result.outcome.into_result();
        match completion {
            // The caller may have dropped its future; the command still counts as settled.
            Completion::Channel(tx) => {
                let _ = tx.send(outcome);
            }
            Completion::Hook(hook) => hook(outcome),
        }
        true
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub(crate) fn last_id(&self) -> MessageId {
        self.last_id.load(Ordering::Relaxed)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, Completion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::CommandOutcome;
    use serde_json::json;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Harness {
        correlator: CommandCorrelator,
        state: watch::Sender<ConnectionState>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    fn harness(initial: ConnectionState) -> Harness {
        let (state, state_rx) = watch::channel(initial);
        let (tx, sent) = mpsc::unbounded_channel();
        Harness {
            correlator: CommandCorrelator::new(state_rx, tx),
            state,
            sent,
        }
    }

    fn sent_command(rx: &mut mpsc::UnboundedReceiver<String>) -> CommandMessage {
        serde_json::from_str(&rx.try_recv().expect("a sent frame")).unwrap()
    }

    fn success(message_id: MessageId, value: Value) -> ResultMessage {
        ResultMessage {
            message_id,
            outcome: CommandOutcome::Success(value),
        }
    }

    #[tokio::test]
    async fn get_data_resolves_with_result_payload() {
        let mut h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<i64>("x", Some(json!({"a": 1})));

        let cmd = sent_command(&mut h.sent);
        assert_eq!(cmd.command, "x");
        assert_eq!(cmd.message_id, 1);
        assert_eq!(cmd.args, Some(json!({"a": 1})));

        assert!(h.correlator.resolve(success(1, json!(42))));
        assert_eq!(fut.await.unwrap(), 42);
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn get_data_rejects_with_remote_error() {
        let mut h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<Value>("x", Some(json!({"a": 1})));
        let _ = sent_command(&mut h.sent);

        h.correlator.resolve(ResultMessage {
            message_id: 1,
            outcome: CommandOutcome::Error {
                error_code: "not_found".into(),
                details: None,
            },
        });
        let err = fut.await.unwrap_err();
        assert_eq!(err.error_code(), Some("not_found"));
        assert_eq!(err.to_string(), "not_found");
    }

    #[tokio::test]
    async fn results_match_by_id_not_arrival_order() {
        let h = harness(ConnectionState::Connected);
        let first = h.correlator.get_data::<String>("a", None);
        let second = h.correlator.get_data::<String>("b", None);

        h.correlator.resolve(success(2, json!("second")));
        h.correlator.resolve(success(1, json!("first")));

        assert_eq!(first.await.unwrap(), "first");
        assert_eq!(second.await.unwrap(), "second");
    }

    #[tokio::test]
    async fn duplicate_and_unknown_results_are_ignored() {
        let h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<i64>("a", None);

        assert!(!h.correlator.resolve(success(99, json!(0))));
        assert!(h.correlator.resolve(success(1, json!(7))));
        assert!(!h.correlator.resolve(success(1, json!(8))));
        assert_eq!(fut.await.unwrap(), 7);
    }

    #[test]
    fn not_connected_leaves_sequence_and_table_untouched() {
        let mut h = harness(ConnectionState::Connecting);

        let err = h.correlator.send_command("a", None).unwrap_err();
        assert!(matches!(err, MusicAssistantError::NotConnected));
        drop(h.correlator.get_data::<Value>("b", None));

        assert_eq!(h.correlator.last_id(), 0);
        assert_eq!(h.correlator.pending_count(), 0);
        assert!(h.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn get_data_fails_not_connected_when_disconnected() {
        let h = harness(ConnectionState::Disconnected);
        let err = h.correlator.get_data::<Value>("b", None).await.unwrap_err();
        assert!(matches!(err, MusicAssistantError::NotConnected));
    }

    #[test]
    fn ids_keep_increasing_across_state_changes() {
        let mut h = harness(ConnectionState::Connected);
        h.correlator.send_command("a", None).unwrap();
        h.state.send_replace(ConnectionState::Disconnected);
        assert!(h.correlator.send_command("b", None).is_err());
        h.state.send_replace(ConnectionState::Connected);
        h.correlator.send_command("c", None).unwrap();

        assert_eq!(sent_command(&mut h.sent).message_id, 1);
        assert_eq!(sent_command(&mut h.sent).message_id, 2);
    }

    #[tokio::test]
    async fn pending_commands_survive_disconnect() {
        let h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<i64>("a", None);
        h.state.send_replace(ConnectionState::Disconnected);
        h.state.send_replace(ConnectionState::Connected);

        assert_eq!(h.correlator.pending_count(), 1);
        h.correlator.resolve(success(1, json!(5)));
        assert_eq!(fut.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dropped_client_yields_client_closed() {
        let h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<i64>("a", None);
        drop(h);
        let err = fut.await.unwrap_err();
        assert!(matches!(err, MusicAssistantError::ClientClosed));
    }

    #[test]
    fn hook_runs_inside_resolve() {
        let mut h = harness(ConnectionState::Connected);
        let seen: Arc<StdMutex<Vec<Value>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        h.correlator
            .request_with(
                "players/all",
                None,
                Box::new(move |outcome| seen_clone.lock().unwrap().push(outcome.unwrap())),
            )
            .unwrap();
        assert_eq!(sent_command(&mut h.sent).command, "players/all");
        assert_eq!(h.correlator.pending_count(), 1);

        assert!(h.correlator.resolve(success(1, json!([1, 2]))));
        // No await: the hook has already run when resolve returns.
        assert_eq!(*seen.lock().unwrap(), vec![json!([1, 2])]);
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[test]
    fn hook_is_dropped_when_not_connected() {
        let h = harness(ConnectionState::Connecting);
        let ran = Arc::new(StdMutex::new(false));
        let ran_clone = Arc::clone(&ran);
        let err = h
            .correlator
            .request_with("x", None, Box::new(move |_| *ran_clone.lock().unwrap() = true))
            .unwrap_err();
        assert!(matches!(err, MusicAssistantError::NotConnected));
        assert_eq!(h.correlator.pending_count(), 0);
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn result_payload_type_mismatch_is_serialization_error() {
        let h = harness(ConnectionState::Connected);
        let fut = h.correlator.get_data::<i64>("a", None);
        h.correlator.resolve(success(1, json!("not a number")));
        let err = fut.await.unwrap_err();
        assert!(matches!(err, MusicAssistantError::Serialization(_)));
    }
}
