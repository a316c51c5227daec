//! Basic type definitions for the chat client
//!
//! Provides the value types shared by every layer:
//! - `User`: a chat participant (local or remote)
//! - `RoomId`: the room a client joins
//! - `SessionId`: UUID tagging one live transport connection
//! - `ConnectionState`: the lifecycle of the single logical connection

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClientError;

/// A chat participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier
    pub id: String,
    /// Display name
    pub name: String,
}

impl User {
    /// Create a user from an id and a display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Room identifier (newtype pattern)
///
/// Opaque to the client; it only becomes a path segment of the join URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique session identifier
///
/// Wraps a UUID v4. A new one is minted for every successful connect so a
/// reader task can tell its own session apart from a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of the client's single logical connection
///
/// `Connected` is only entered from `Connecting` after a successful handshake.
/// `Disconnected(None)` means the connection closed as expected; a cause is
/// present only when something failed.
#[derive(Debug, Clone, Default)]
pub enum ConnectionState {
    /// No join has been requested yet
    #[default]
    Idle,
    /// A join loop is attempting to connect
    Connecting,
    /// A session is live and its reader is running
    Connected,
    /// The connection is gone, optionally with the failure that ended it
    Disconnected(Option<Arc<ClientError>>),
}

impl ConnectionState {
    /// Disconnected with a failure cause
    pub fn failed(err: ClientError) -> Self {
        Self::Disconnected(Some(Arc::new(err)))
    }

    /// Disconnected without error
    pub fn closed() -> Self {
        Self::Disconnected(None)
    }

    /// Check if the state is `Connected`
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the state is any `Disconnected`
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// The failure cause, if this is a failed `Disconnected`
    pub fn cause(&self) -> Option<&ClientError> {
        match self {
            Self::Disconnected(Some(cause)) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Causes compare by their rendered message; `ClientError` itself is not `PartialEq`
impl PartialEq for ConnectionState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Idle, Self::Idle)
            | (Self::Connecting, Self::Connecting)
            | (Self::Connected, Self::Connected) => true,
            (Self::Disconnected(a), Self::Disconnected(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.to_string() == b.to_string(),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected(None) => write!(f, "disconnected"),
            Self::Disconnected(Some(cause)) => write!(f, "disconnected ({})", cause),
        }
    }
}
