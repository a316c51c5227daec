//! Reconnecting WebSocket Chat Client Library
//!
//! A client for a JSON chat room protocol built on tokio-tungstenite.
//!
//! # Features
//! - Room joining with optional user name / user id
//! - Automatic reconnection with exponential backoff (1s, 2s, 4s, ... capped at 10s)
//! - Background frame reader with malformed-frame tolerance
//! - Text, image and custom event sending
//! - Self-identity tracking from the server's join notice
//! - Observable connection state, current user and incoming messages
//!
//! # Architecture
//! - `ChatClient` owns at most one session: a transport connection plus the
//!   reader task draining it
//! - The join loop, the reader and `disconnect` hand the session over through
//!   one short-lived lock, so a stale reader never outlives its session
//! - Consumers watch `ChatState` channels instead of polling
//! - The socket sits behind the `Transport` trait; `WsTransport` is the
//!   tokio-tungstenite implementation
//!
//! # Example
//! ```ignore
//! use chat_client_v1::{ChatClient, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ChatClient::with_websocket(ClientConfig::new("ws://127.0.0.1:8080"));
//!     let mut messages = client.subscribe_messages();
//!
//!     client.join("lobby", Some("Alice"), None).await.unwrap();
//!     client.send_message("hello", None).await;
//!
//!     while let Some(msg) = messages.recv().await {
//!         println!("{}: {}", msg.user.name, msg.message);
//!     }
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
mod reader;
mod session;
pub mod state;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, JoinOutcome};
pub use codec::{Codec, CodecConfig};
pub use config::{BackoffPolicy, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use message::{message_type, MessageEnvelope, OutgoingMessage};
pub use state::{ChatState, IncomingMessages, Observable, Subscription};
pub use transport::{
    CloseReason, Connection, Frame, FrameSink, FrameStream, Transport, WsTransport, NORMAL_CLOSURE,
};
pub use types::{ConnectionState, RoomId, SessionId, User};
