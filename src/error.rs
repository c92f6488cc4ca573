//! Error types for the Music Assistant client.

use thiserror::Error;

/// Errors that can occur when using the Music Assistant client.
#[derive(Debug, Error)]
pub enum MusicAssistantError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A command was attempted while the connection state is not `Connected`.
    ///
    /// Raised synchronously; the command is never queued or retried.
    #[error("not connected to server")]
    NotConnected,

    /// [`initialize`](crate::MusicAssistantClient::initialize) was called on a
    /// client that already owns a connection.
    #[error("client already initialized")]
    AlreadyInitialized,

    /// The server answered a command with an error result.
    ///
    /// Displays the server-supplied details, falling back to the error code
    /// when they are missing or empty.
    #[error("{}", remote_message(.error_code, .details))]
    Remote {
        /// Machine-readable error code sent by the server.
        error_code: String,
        /// Optional human-readable details sent by the server.
        details: Option<String>,
    },

    /// An inbound frame matched none of the known envelope shapes.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A player command referenced a player that is not in the local mirror.
    #[error("unknown player: {0}")]
    PlayerNotFound(String),

    /// The client was torn down while a command was still awaiting its result.
    #[error("client closed before the command completed")]
    ClientClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MusicAssistantError {
    /// Returns the server error code if this is a [`Remote`](Self::Remote) error.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Remote { error_code, .. } => Some(error_code),
            _ => None,
        }
    }
}

fn remote_message<'a>(error_code: &'a str, details: &'a Option<String>) -> &'a str {
    details
        .as_deref()
        .filter(|details| !details.is_empty())
        .unwrap_or(error_code)
}

/// A specialized [`Result`] type for Music Assistant client operations.
pub type Result<T> = std::result::Result<T, MusicAssistantError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_displays_details_when_present() {
        let err = MusicAssistantError::Remote {
            error_code: "not_found".into(),
            details: Some("Track 42 does not exist".into()),
        };
        assert_eq!(err.to_string(), "Track 42 does not exist");
        assert_eq!(err.error_code(), Some("not_found"));
    }

    #[test]
    fn remote_error_falls_back_to_code() {
        let err = MusicAssistantError::Remote {
            error_code: "not_found".into(),
            details: None,
        };
        assert_eq!(err.to_string(), "not_found");
    }

    #[test]
    fn remote_error_with_empty_details_falls_back_to_code() {
        let err = MusicAssistantError::Remote {
            error_code: "invalid_args".into(),
            details: Some(String::new()),
        };
        assert_eq!(err.to_string(), "invalid_args");
    }

    #[test]
    fn non_remote_errors_have_no_code() {
        assert_eq!(MusicAssistantError::NotConnected.error_code(), None);
        assert_eq!(
            MusicAssistantError::NotConnected.to_string(),
            "not connected to server"
        );
    }
}
