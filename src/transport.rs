//! Transport abstraction for the Music Assistant websocket API.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and server. The protocol uses JSON text frames, so every transport
//! implementation must handle message framing internally.
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, [`MusicAssistantClient`](crate::MusicAssistantClient)
//! reconnects forever, so it needs to open *fresh* transports on demand. That
//! job belongs to a [`Connector`]: the connection task calls
//! [`Connector::connect`] once for the initial connection and once per retry.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use music_assistant_client::error::MusicAssistantError;
//! use music_assistant_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), MusicAssistantError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, MusicAssistantError>> {
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), MusicAssistantError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MusicAssistantError> {
//!         Ok(Box::new(MyTransport { }))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::MusicAssistantError;

/// A bidirectional text message transport for the Music Assistant API.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame.
/// Each call to [`recv`](Transport::recv) returns one complete JSON frame.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), MusicAssistantError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, MusicAssistantError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), MusicAssistantError>;
}

/// Opens a new [`Transport`] to the given websocket URL.
///
/// Called by the connection task on initialization and on every reconnect
/// attempt. A failed connect is treated exactly like a closed socket: the
/// state drops to `Disconnected` and the next attempt is scheduled.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns any error that prevents the connection from opening.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MusicAssistantError>;
}
