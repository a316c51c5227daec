//! Error types for the chat client
//!
//! Every failure the client can observe ends up in one of these variants.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Client-level errors
///
/// None of these are fatal to the process: connect and read failures are
/// reported through `ConnectionState::Disconnected`, send failures as a
/// `false` return.
#[derive(Debug, Error)]
pub enum ClientError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL could not be turned into a join URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failure reported by a transport implementation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Envelope carried a field the strict codec does not know
    #[error("Unknown field in envelope: {0}")]
    UnknownField(String),

    /// Inbound frame stream ended without a close frame
    #[error("Connection stream ended unexpectedly")]
    StreamEnded,
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

/// Convenience result alias
pub type ClientResult<T> = Result<T, ClientError>;
