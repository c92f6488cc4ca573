//! # Now Playing Example
//!
//! Connects to a Music Assistant server, lists its players and follows queue
//! activity until Ctrl+C:
//!
//! 1. Open the websocket connection and wait for the server handshake
//! 2. Print the mirrored players and their volumes
//! 3. Log queue updates and elapsed-time ticks as they arrive
//!
//! ## Running
//!
//! ```sh
//! cargo run --example now_playing
//!
//! # Point at another server:
//! MASS_URL=http://192.168.1.10:8095 cargo run --example now_playing
//! ```

use std::time::Duration;

use music_assistant_client::{
    ClientConfig, ConnectionState, EventType, MassEvent, MusicAssistantClient,
};

/// Default server URL when `MASS_URL` is not set.
const DEFAULT_URL: &str = "http://localhost:8095";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Connect ─────────────────────────────────────────────────────
    let url = std::env::var("MASS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");

    let client = MusicAssistantClient::new(ClientConfig::new());
    client.initialize(&url)?;
    client
        .watch_state()
        .wait_for(|s| *s == ConnectionState::Connected)
        .await?;
    if let Some(info) = client.server_info() {
        tracing::info!("Connected to Music Assistant {}", info.server_version);
    }

    // The bulk fetch runs right after the handshake; give it a moment.
    let mut players = client.players().watch();
    let _ = tokio::time::timeout(Duration::from_secs(2), players.changed()).await;
    for player in client.players().snapshot().values() {
        tracing::info!(
            "Player {} ({}): powered={} volume={}",
            player.name,
            player.player_id,
            player.powered,
            player.volume_level
        );
    }

    // ── Events ──────────────────────────────────────────────────────
    let _subscription = client.subscribe_many(
        [EventType::QueueUpdated, EventType::QueueTimeUpdated],
        |event| match event {
            MassEvent::QueueUpdated(queue) => {
                let current = queue
                    .extra
                    .get("current_item")
                    .and_then(|item| item.get("name"))
                    .and_then(|name| name.as_str())
                    .unwrap_or("nothing");
                tracing::info!("[{}] now playing: {current}", queue.name);
            }
            MassEvent::QueueTimeUpdated {
                queue_id,
                elapsed_time,
            } => {
                tracing::debug!("[{queue_id}] {elapsed_time:.0}s elapsed");
            }
            _ => {}
        },
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down");
    client.shutdown().await;
    Ok(())
}
