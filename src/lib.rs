//! # Music Assistant Client
//!
//! Async Rust client for the [Music Assistant](https://music-assistant.io)
//! server's websocket API.
//!
//! The client keeps one persistent connection to the server, reconnecting
//! forever with a linear backoff. On top of it sit:
//!
//! - **Command correlation**: [`MusicAssistantClient::get_data`] returns a
//!   future that resolves with the server's result for that command.
//! - **Event routing**: [`MusicAssistantClient::subscribe`] registers typed
//!   callbacks for server-pushed [`MassEvent`]s.
//! - **State mirroring**: players, queues and providers are kept in observable
//!   maps that follow server events.
//! - **Command throttling**: player and queue commands are debounced so only
//!   the last of a burst reaches the server.
//! - **Transport-agnostic**: implement [`Connector`] and [`Transport`] for any
//!   backend; the default `transport-websocket` feature provides
//!   [`WebSocketConnector`](transports::WebSocketConnector).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use music_assistant_client::{ClientConfig, ConnectionState, MusicAssistantClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MusicAssistantClient::new(ClientConfig::new());
//! client.initialize("http://homeassistant.local:8095")?;
//! client
//!     .watch_state()
//!     .wait_for(|s| *s == ConnectionState::Connected)
//!     .await?;
//!
//! for player in client.players().snapshot().values() {
//!     println!("{}: volume {}", player.name, player.volume_level);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backoff;
pub mod client;
mod correlator;
pub mod error;
pub mod event;
pub mod mirror;
pub mod models;
pub mod optimistic;
pub mod protocol;
pub mod router;
pub mod throttle;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{ItemQuery, ItemRef, LibraryQuery, PlayMedia};
pub use backoff::LinearBackoff;
pub use client::{ClientConfig, ConnectionState, MusicAssistantClient};
pub use error::{MusicAssistantError, Result};
pub use event::{EventFilter, MassEvent};
pub use mirror::EntityStore;
pub use models::{
    MediaItem, MediaType, PagedItems, Player, PlayerQueue, ProviderInstance, QueueItem,
    QueueOption,
};
pub use protocol::{EventType, ServerInfo};
pub use router::Subscription;
pub use throttle::ThrottleStrategy;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
