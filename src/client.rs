//! Connection manager and client handle for the Music Assistant API.
//!
//! [`MusicAssistantClient`] owns one background connection task for its whole
//! lifetime. The task opens a transport through a [`Connector`], processes
//! every inbound frame in arrival order, and reconnects with a linear backoff
//! whenever the connection drops. Commands issued from the handle travel to the
//! task over an unbounded channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = MusicAssistantClient::new(ClientConfig::new());
//! client.initialize("http://192.168.1.10:8095")?;
//!
//! let mut state = client.watch_state();
//! state.wait_for(|s| *s == ConnectionState::Connected).await?;
//!
//! client.subscribe(EventType::PlayerUpdated, |event| {
//!     if let MassEvent::PlayerUpdated(player) = event {
//!         println!("{} is at volume {}", player.name, player.volume_level);
//!     }
//! });
//!
//! let tracks: PagedItems = client.get_library_tracks(LibraryQuery::default()).await?;
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::LinearBackoff;
use crate::correlator::CommandCorrelator;
use crate::error::{MusicAssistantError, Result};
use crate::event::{EventFilter, MassEvent};
use crate::mirror::{EntityStore, StateMirror};
use crate::models::{Player, PlayerQueue, ProviderInstance};
use crate::protocol::{EventType, IncomingFrame, ServerInfo};
use crate::router::{EventRouter, Subscription};
use crate::throttle::{CommandThrottler, ThrottleStrategy};
use crate::transport::{Connector, Transport};

/// Default debounce window for player and queue commands.
const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(200);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle state of the connection.
///
/// `Connected` is only reached once the server has sent its server-info frame;
/// an open socket that has not identified itself yet is still `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`MusicAssistantClient`].
///
/// # Example
///
/// ```
/// use music_assistant_client::client::ClientConfig;
/// use music_assistant_client::throttle::ThrottleStrategy;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_throttle_window(Duration::from_millis(300))
///     .with_throttle_strategy(ThrottleStrategy::PerTarget);
/// assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay schedule between reconnect attempts.
    ///
    /// Defaults to **0 ms**, growing by **1 s** per failed attempt up to
    /// **12 s**.
    pub backoff: LinearBackoff,
    /// Debounce window applied to player and queue commands.
    ///
    /// Defaults to **200 ms**.
    pub throttle_window: Duration,
    /// How throttled commands share debounce slots.
    ///
    /// Defaults to [`ThrottleStrategy::Shared`].
    pub throttle_strategy: ThrottleStrategy,
    /// Time [`MusicAssistantClient::shutdown`] waits for the connection task
    /// to close the transport before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            backoff: LinearBackoff::default(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            throttle_strategy: ThrottleStrategy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the reconnect backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: LinearBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the debounce window for player and queue commands.
    #[must_use]
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    /// Set how throttled commands share debounce slots.
    #[must_use]
    pub fn with_throttle_strategy(mut self, strategy: ThrottleStrategy) -> Self {
        self.throttle_strategy = strategy;
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// A zero timeout aborts the connection task immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the connection task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    server_info: Mutex<Option<ServerInfo>>,
    correlator: Arc<CommandCorrelator>,
    mirror: Arc<StateMirror>,
    router: EventRouter,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "connection state changed");
        }
    }

    /// Classifies and handles one inbound frame.
    fn handle_frame(&self, text: &str) {
        match IncomingFrame::parse(text) {
            Ok(IncomingFrame::Event(msg)) => {
                if msg.event != EventType::QueueTimeUpdated {
                    debug!(event = %msg.event, object_id = ?msg.object_id, "[event]");
                }
                self.mirror.apply_event(&msg);
                self.router.dispatch(&MassEvent::from(msg));
            }
            Ok(IncomingFrame::ServerInfo(info)) => {
                info!(
                    server_version = %info.server_version,
                    schema_version = ?info.schema_version,
                    "connected to Music Assistant server"
                );
                *self
                    .server_info
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(info);
                self.set_state(ConnectionState::Connected);
                self.mirror.refresh(&self.correlator);
            }
            Ok(IncomingFrame::Result(result)) => {
                let message_id = result.message_id;
                if !self.correlator.resolve(result) {
                    debug!(message_id, "result for unknown or settled command ignored");
                }
            }
            Err(e) => warn!("discarding unrecognized frame: {e}"),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Client for a Music Assistant server.
///
/// Construct with [`new`](Self::new) (websocket transport) or
/// [`with_connector`](Self::with_connector), then call
/// [`initialize`](Self::initialize) once from within a tokio runtime.
pub struct MusicAssistantClient {
    shared: Arc<Shared>,
    pub(crate) throttler: CommandThrottler,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    /// Receiving half of the outbound channel, handed to the connection task
    /// by `initialize`.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl MusicAssistantClient {
    /// Create a client that connects over websocket.
    #[cfg(feature = "transport-websocket")]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(crate::transports::WebSocketConnector::new()))
    }

    /// Create a client that opens its transports through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(CommandCorrelator::new(state_rx, outbound_tx));
        let throttler = CommandThrottler::new(
            config.throttle_window,
            config.throttle_strategy,
            Arc::clone(&correlator),
        );
        let shared = Arc::new(Shared {
            state: state_tx,
            server_info: Mutex::new(None),
            correlator,
            mirror: Arc::new(StateMirror::new()),
            router: EventRouter::new(),
        });
        Self {
            shared,
            throttler,
            connector,
            config,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Start the connection task for the server at `base_url`.
    ///
    /// `base_url` is the server's http(s) address, e.g.
    /// `http://192.168.1.10:8095/`; it is turned into the websocket endpoint
    /// with [`websocket_url`]. Returns immediately; watch
    /// [`watch_state`](Self::watch_state) to learn when the server is ready.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::AlreadyInitialized`] if called more than
    /// once, and [`MusicAssistantError::Io`] if called outside a tokio runtime.
    pub fn initialize(&self, base_url: &str) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| MusicAssistantError::Io(std::io::Error::other(e)))?;
        let Some(outbound_rx) = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(MusicAssistantError::AlreadyInitialized);
        };

        let url = websocket_url(base_url);
        info!(%url, "initializing Music Assistant client");
        self.shared.set_state(ConnectionState::Connecting);
        self.throttler.bind_runtime(runtime.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(connection_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            url,
            self.config.backoff,
            outbound_rx,
            shutdown_rx,
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        *self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);
        Ok(())
    }

    /// Close the connection and stop the connection task.
    ///
    /// Commands still awaiting a result resolve with
    /// [`MusicAssistantError::ClientClosed`] only once the client is dropped.
    pub async fn shutdown(&self) {
        debug!("MusicAssistantClient: shutdown requested");

        let shutdown_tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection task aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Server info from the most recent handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.shared
            .server_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mirrored players, keyed by `player_id`.
    pub fn players(&self) -> &EntityStore<Player> {
        &self.shared.mirror.players
    }

    /// Mirrored queues, keyed by `queue_id`.
    pub fn queues(&self) -> &EntityStore<PlayerQueue> {
        &self.shared.mirror.queues
    }

    /// Mirrored provider instances, keyed by `instance_id`.
    pub fn providers(&self) -> &EntityStore<ProviderInstance> {
        &self.shared.mirror.providers
    }

    /// Looks up a provider by instance id, falling back to the first
    /// instance of the given domain.
    pub fn get_provider(&self, domain_or_instance_id: &str) -> Option<ProviderInstance> {
        let providers = self.providers();
        providers
            .get(domain_or_instance_id)
            .or_else(|| providers.find(|p| p.domain == domain_or_instance_id))
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Register `callback` for events passing `filter`.
    ///
    /// Callbacks run synchronously on the connection task; keep them short.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, callback: F) -> Subscription
    where
        F: Fn(&MassEvent) + Send + Sync + 'static,
    {
        self.shared.router.subscribe(filter, callback)
    }

    /// Register one callback for several event types.
    pub fn subscribe_many<I, F>(&self, filters: I, callback: F) -> Subscription
    where
        I: IntoIterator,
        I::Item: Into<EventFilter>,
        F: Fn(&MassEvent) + Send + Sync + 'static,
    {
        self.shared.router.subscribe_many(filters, callback)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send a command without waiting for its result.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::NotConnected`] unless the connection
    /// state is `Connected`.
    pub fn send_command(&self, command: &str, args: Option<Value>) -> Result<()> {
        self.shared.correlator.send_command(command, args)
    }

    /// Send a command and wait for its result, decoded as `T`.
    ///
    /// The command is sent when this method is called, not when the returned
    /// future is first polled. The future never times out.
    ///
    /// # Errors
    ///
    /// The future yields [`MusicAssistantError::NotConnected`] if the client
    /// was not connected, [`MusicAssistantError::Remote`] if the server
    /// answered with an error, and [`MusicAssistantError::Serialization`] if
    /// the result does not decode as `T`.
    pub fn get_data<T>(
        &self,
        command: &str,
        args: Option<Value>,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.shared.correlator.get_data(command, args)
    }

    pub(crate) fn mirror(&self) -> &StateMirror {
        &self.shared.mirror
    }
}

impl std::fmt::Debug for MusicAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicAssistantClient")
            .field("state", &self.state())
            .field("pending_commands", &self.shared.correlator.pending_count())
            .field("listeners", &self.shared.router.listener_count())
            .finish()
    }
}

impl Drop for MusicAssistantClient {
    fn drop(&mut self) {
        // Drop cannot await a graceful close; aborting drops the transport.
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Turns a server base url into its websocket endpoint.
///
/// ```
/// use music_assistant_client::client::websocket_url;
///
/// assert_eq!(websocket_url("http://mass.local:8095/"), "ws://mass.local:8095/ws");
/// assert_eq!(websocket_url("https://mass.example.com"), "wss://mass.example.com/ws");
/// ```
pub fn websocket_url(base_url: &str) -> String {
    let trimmed = base_url.strip_suffix('/').unwrap_or(base_url);
    let ws = match trimmed.strip_prefix("http") {
        Some(rest) => format!("ws{rest}"),
        None => trimmed.to_string(),
    };
    format!("{ws}/ws")
}

// ── Connection loop ─────────────────────────────────────────────────

/// How a session on one transport ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The connection dropped; reconnect.
    Lost,
    /// Shutdown was requested or the client handle is gone.
    Shutdown,
}

/// Background task: connect, run a session, back off, repeat.
///
/// Exits only when the shutdown signal fires (or its sender is dropped).
async fn connection_loop(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: String,
    backoff: LinearBackoff,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("connection task started");
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            result = connector.connect(&url) => result,
            _ = &mut shutdown_rx => break,
        };

        match connected {
            Ok(mut transport) => {
                debug!(%url, "transport open, waiting for server info");
                attempt = 0;
                // Frames queued for a previous connection are not replayed.
                let mut stale = 0usize;
                while outbound_rx.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    debug!(stale, "discarded outbound frames from a closed connection");
                }

                let end =
                    run_session(&shared, transport.as_mut(), &mut outbound_rx, &mut shutdown_rx)
                        .await;
                shared.set_state(ConnectionState::Disconnected);
                if end == SessionEnd::Shutdown {
                    if let Err(e) = transport.close().await {
                        debug!("error closing transport: {e}");
                    }
                    break;
                }
                info!("connection lost, reconnecting");
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!(%url, attempt, "connection failed: {e}");
            }
        }

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(?delay, "retry scheduled");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => break,
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("connection task exited");
}

/// Multiplexes outbound frames, inbound frames and the shutdown signal on one
/// open transport.
async fn run_session(
    shared: &Shared,
    transport: &mut dyn Transport,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(json) = outgoing else {
                    debug!("outbound channel closed");
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = transport.send(json).await {
                    error!("transport send error: {e}");
                    return SessionEnd::Lost;
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return SessionEnd::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => shared.handle_frame(&text),
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Lost;
                    }
                    None => {
                        debug!("transport closed by server");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
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
    use crate::protocol::CommandMessage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays scripted frames and records sent ones.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, MusicAssistantError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), MusicAssistantError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, MusicAssistantError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), MusicAssistantError> {
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; fails once the scripts
    /// run out.
    struct ScriptedConnector {
        scripts: StdMutex<VecDeque<Vec<Option<std::result::Result<String, MusicAssistantError>>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        connects: AtomicUsize,
        urls: StdMutex<Vec<String>>,
    }

    impl ScriptedConnector {
        fn new(
            scripts: Vec<Vec<Option<std::result::Result<String, MusicAssistantError>>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                scripts: StdMutex::new(scripts.into()),
                sent: Arc::new(StdMutex::new(Vec::new())),
                connects: AtomicUsize::new(0),
                urls: StdMutex::new(Vec::new()),
            })
        }

        fn sent_commands(&self) -> Vec<CommandMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|raw| serde_json::from_str(raw).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            url: &str,
        ) -> std::result::Result<Box<dyn Transport>, MusicAssistantError> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            self.urls.lock().unwrap().push(url.to_string());
            match self.scripts.lock().unwrap().pop_front() {
                Some(incoming) => Ok(Box::new(MockTransport {
                    incoming: incoming.into(),
                    sent: Arc::clone(&self.sent),
                })),
                None => Err(MusicAssistantError::TransportClosed),
            }
        }
    }

    fn server_info() -> Option<std::result::Result<String, MusicAssistantError>> {
        Some(Ok(json!({"server_version": "2.0.0", "schema_version": 24}).to_string()))
    }

    async fn wait_connected(client: &MusicAssistantClient) {
        client
            .watch_state()
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn websocket_url_normalization() {
        assert_eq!(websocket_url("http://host:8095/"), "ws://host:8095/ws");
        assert_eq!(websocket_url("http://host:8095"), "ws://host:8095/ws");
        assert_eq!(websocket_url("https://host"), "wss://host/ws");
        assert_eq!(websocket_url("ws://host"), "ws://host/ws");
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.throttle_window, Duration::from_millis(200));
        assert_eq!(config.throttle_strategy, ThrottleStrategy::Shared);
        assert_eq!(config.backoff, LinearBackoff::default());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn handshake_connects_and_issues_bulk_fetches() {
        let connector = ScriptedConnector::new(vec![vec![server_info()]]);
        let client = MusicAssistantClient::with_connector(ClientConfig::new(), connector.clone());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.initialize("http://mass.local:8095/").unwrap();
        wait_connected(&client).await;
        tokio::task::yield_now().await;

        assert_eq!(
            connector.urls.lock().unwrap().as_slice(),
            ["ws://mass.local:8095/ws"]
        );
        assert_eq!(client.server_info().unwrap().server_version, "2.0.0");

        while connector.sent.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }
        let mut commands: Vec<String> = connector
            .sent_commands()
            .into_iter()
            .map(|c| c.command)
            .collect();
        commands.sort();
        assert_eq!(commands, ["players/all", "players/queue/all", "providers"]);

        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn second_initialize_fails() {
        let connector = ScriptedConnector::new(vec![vec![]]);
        let client = MusicAssistantClient::with_connector(ClientConfig::new(), connector.clone());
        client.initialize("http://host").unwrap();
        let err = client.initialize("http://host").unwrap_err();
        assert!(matches!(err, MusicAssistantError::AlreadyInitialized));
        client.shutdown().await;
        assert!(connector.connects.load(Ordering::Relaxed) <= 1);
    }

    #[tokio::test]
    async fn send_before_server_info_is_rejected() {
        let connector = ScriptedConnector::new(vec![vec![]]);
        let client = MusicAssistantClient::with_connector(ClientConfig::new(), connector);
        assert!(matches!(
            client.send_command("players/all", None),
            Err(MusicAssistantError::NotConnected)
        ));
        client.initialize("http://host").unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(matches!(
            client.send_command("players/all", None),
            Err(MusicAssistantError::NotConnected)
        ));
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_server_closes() {
        let connector = ScriptedConnector::new(vec![
            vec![server_info(), None],
            vec![server_info()],
        ]);
        let client = MusicAssistantClient::with_connector(ClientConfig::new(), connector.clone());
        client.initialize("http://host").unwrap();

        while connector.connects.load(Ordering::Relaxed) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        wait_connected(&client).await;
        assert_eq!(connector.connects.load(Ordering::Relaxed), 2);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_back_off_linearly() {
        let connector = ScriptedConnector::new(vec![]);
        let config = ClientConfig::new().with_backoff(LinearBackoff::new(
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(3),
        ));
        let client = MusicAssistantClient::with_connector(config, connector.clone());
        client.initialize("http://host").unwrap();

        // Attempts at t = 0, 0, 1, 3, 6, 9 seconds.
        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(connector.connects.load(Ordering::Relaxed), 6);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn unrecognized_frames_are_discarded() {
        let connector = ScriptedConnector::new(vec![vec![
            Some(Ok("not json".into())),
            Some(Ok("[1, 2]".into())),
            Some(Ok(json!({"foo": "bar"}).to_string())),
            server_info(),
        ]]);
        let client = MusicAssistantClient::with_connector(ClientConfig::new(), connector);
        client.initialize("http://host").unwrap();
        wait_connected(&client).await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn events_update_mirror_before_listeners_run() {
        let player = json!({"event": "player_added", "object_id": "p1",
            "data": {"player_id": "p1", "name": "Kitchen"}});
        let connector = ScriptedConnector::new(vec![vec![server_info(), Some(Ok(player.to_string()))]]);
        let client = Arc::new(MusicAssistantClient::with_connector(
            ClientConfig::new(),
            connector,
        ));

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&client);
        client.subscribe(EventType::PlayerAdded, move |event| {
            let in_mirror = weak
                .upgrade()
                .is_some_and(|c| c.players().contains("p1"));
            let _ = seen_tx.send((event.event_type(), in_mirror));
        });

        client.initialize("http://host").unwrap();
        let (event_type, in_mirror) = seen_rx.recv().await.unwrap();
        assert_eq!(event_type, EventType::PlayerAdded);
        assert!(in_mirror);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn get_provider_by_instance_or_domain() {
        let client =
            MusicAssistantClient::with_connector(ClientConfig::new(), ScriptedConnector::new(vec![]));
        client.providers().upsert(
            serde_json::from_value(json!({"instance_id": "spotify--x1", "domain": "spotify"}))
                .unwrap(),
        );
        assert_eq!(
            client.get_provider("spotify").unwrap().instance_id,
            "spotify--x1"
        );
        assert!(client.get_provider("spotify--x1").is_some());
        assert!(client.get_provider("tidal").is_none());
    }
}
