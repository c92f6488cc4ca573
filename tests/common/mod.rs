#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Music Assistant client integration tests.
//!
//! Provides a channel-backed [`LoopbackConnector`]: every connection the
//! client opens produces a [`ServerHandle`] that lets the test play the
//! server's side of that one connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use music_assistant_client::protocol::CommandMessage;
use music_assistant_client::{
    ClientConfig, ConnectionState, Connector, MusicAssistantClient, MusicAssistantError,
    Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// How long helpers wait for the client before failing the test.
const WAIT: Duration = Duration::from_secs(5);

// ── Loopback transport ──────────────────────────────────────────────

/// Client side of one loopback connection.
struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), MusicAssistantError> {
        self.to_server
            .send(message)
            .map_err(|_| MusicAssistantError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, MusicAssistantError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), MusicAssistantError> {
        self.from_server.close();
        Ok(())
    }
}

/// Server side of one loopback connection. Dropping it closes the
/// connection from the server's end.
pub struct ServerHandle {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl ServerHandle {
    /// Push a raw JSON value to the client.
    pub fn push(&self, frame: Value) {
        self.to_client.send(frame.to_string()).unwrap();
    }

    /// Send the server-info frame that completes the handshake.
    pub fn send_server_info(&self) {
        self.push(json!({
            "server_version": "2.0.0",
            "schema_version": 24,
            "server_id": "test-server"
        }));
    }

    pub fn send_event(&self, event: &str, object_id: Option<&str>, data: Value) {
        self.push(json!({"event": event, "object_id": object_id, "data": data}));
    }

    pub fn reply(&self, message_id: u64, result: Value) {
        self.push(json!({"message_id": message_id, "result": result}));
    }

    pub fn reply_error(&self, message_id: u64, error_code: &str, details: Option<&str>) {
        self.push(json!({
            "message_id": message_id,
            "error_code": error_code,
            "details": details
        }));
    }

    /// Wait for the next command the client sends on this connection.
    pub async fn next_command(&mut self) -> CommandMessage {
        let raw = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("client closed the connection");
        serde_json::from_str(&raw).unwrap()
    }

    /// Returns a command if one is already queued.
    pub fn try_next_command(&mut self) -> Option<CommandMessage> {
        self.from_client
            .try_recv()
            .ok()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    /// Answer the three bulk fetches issued after the handshake.
    pub async fn answer_bulk_fetches(&mut self, players: Value, queues: Value, providers: Value) {
        for _ in 0..3 {
            let cmd = self.next_command().await;
            let result = match cmd.command.as_str() {
                "players/all" => players.clone(),
                "players/queue/all" => queues.clone(),
                "providers" => providers.clone(),
                other => panic!("unexpected command during bulk fetch: {other}"),
            };
            self.reply(cmd.message_id, result);
        }
    }
}

// ── Loopback connector ──────────────────────────────────────────────

/// Hands a [`ServerHandle`] to the test for every connection the client
/// opens. The first `fail_first` attempts fail instead.
pub struct LoopbackConnector {
    handles: mpsc::UnboundedSender<ServerHandle>,
    fail_remaining: AtomicUsize,
    attempts: AtomicUsize,
    urls: std::sync::Mutex<Vec<String>>,
}

impl LoopbackConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        Self::failing_first(0)
    }

    pub fn failing_first(
        failures: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        let (handles, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            handles,
            fail_remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            urls: std::sync::Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MusicAssistantError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MusicAssistantError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.handles
            .send(ServerHandle {
                from_client,
                to_client,
            })
            .map_err(|_| MusicAssistantError::TransportClosed)?;
        Ok(Box::new(LoopbackTransport {
            to_server,
            from_server,
        }))
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// A client wired to a loopback connector.
pub struct Harness {
    pub client: MusicAssistantClient,
    pub connector: Arc<LoopbackConnector>,
    pub connections: mpsc::UnboundedReceiver<ServerHandle>,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        let (connector, connections) = LoopbackConnector::new();
        let client = MusicAssistantClient::with_connector(config, connector.clone());
        Self {
            client,
            connector,
            connections,
        }
    }

    /// Wait for the client to open its next connection.
    pub async fn next_connection(&mut self) -> ServerHandle {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Initialize, complete the handshake and answer the bulk fetches with
    /// empty lists.
    pub async fn connect(&mut self) -> ServerHandle {
        self.client.initialize("http://mass.local:8095/").unwrap();
        let mut server = self.next_connection().await;
        server.send_server_info();
        wait_for_state(&self.client, ConnectionState::Connected).await;
        server
            .answer_bulk_fetches(json!([]), json!([]), json!([]))
            .await;
        server
    }
}

pub async fn wait_for_state(client: &MusicAssistantClient, state: ConnectionState) {
    tokio::time::timeout(WAIT, client.watch_state().wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for connection state")
        .unwrap();
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
