//! Chat client
//!
//! `ChatClient` owns the single logical connection to a chat room: it joins
//! with exponential backoff, runs the frame reader for the live session,
//! sends envelopes over it and tears it down on request.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::message::{message_type, OutgoingMessage};
use crate::reader;
use crate::session::{Session, Shared};
use crate::state::{ChatState, IncomingMessages, Subscription};
use crate::transport::{CloseReason, Connection, Transport, WsTransport};
use crate::types::{ConnectionState, RoomId, SessionId, User};

/// How a `join` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A session is live and its reader is running
    Connected,
    /// A session or another join was already active; nothing was done
    AlreadyActive,
    /// `disconnect` was called while joining
    Cancelled,
}

/// Reconnecting chat room client
///
/// All background work belongs to the client: `disconnect` stops the join
/// loop and the reader, and dropping the client aborts the reader.
pub struct ChatClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    /// Held for the whole duration of a join loop
    joining: Mutex<()>,
    /// Bumped by `disconnect` to cancel running join loops
    cancel: watch::Sender<u64>,
}

impl ChatClient {
    /// Create a client over the given transport
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let state = ChatState::new(config.message_buffer, config.state_buffer);
        let shared = Arc::new(Shared::new(state, Codec::new(config.codec)));
        let (cancel, _) = watch::channel(0);

        Self {
            config,
            transport,
            shared,
            joining: Mutex::new(()),
            cancel,
        }
    }

    /// Create a client over tokio-tungstenite
    pub fn with_websocket(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(WsTransport::new()))
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Join a room, retrying until connected or cancelled
    ///
    /// Connect failures are never returned: each one is reported as
    /// `Disconnected(cause)` and followed by a backoff sleep. The only error
    /// is a base URL that cannot produce a join URL.
    pub async fn join(
        &self,
        room: impl Into<RoomId>,
        user_name: Option<&str>,
        user_id: Option<&str>,
    ) -> ClientResult<JoinOutcome> {
        let room = room.into();
        let url = self.config.join_url(&room, user_name, user_id)?;

        let Ok(_joining) = self.joining.try_lock() else {
            debug!("Join for {} ignored, another join is running", room);
            return Ok(JoinOutcome::AlreadyActive);
        };
        if self.shared.has_session() {
            debug!("Join for {} ignored, already connected", room);
            return Ok(JoinOutcome::AlreadyActive);
        }

        let mut cancel_rx = self.cancel.subscribe();
        info!("Joining room {} at {}", room, url);
        self.shared
            .state
            .set_connection_state(ConnectionState::Connecting);

        let mut attempt: u32 = 0;
        loop {
            if cancel_rx.has_changed().unwrap_or(true) {
                info!("Join for {} cancelled", room);
                return Ok(JoinOutcome::Cancelled);
            }
            if self.shared.has_session() {
                return Ok(JoinOutcome::AlreadyActive);
            }

            // A connect that already finished is settled by `start_session`
            let result = tokio::select! {
                biased;
                result = self.transport.connect(&url) => result,
                _ = cancel_rx.changed() => {
                    info!("Join for {} cancelled during connect", room);
                    return Ok(JoinOutcome::Cancelled);
                }
            };

            match result {
                Ok(connection) => {
                    return Ok(self.start_session(connection, &cancel_rx).await);
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        "Connect attempt {} to {} failed: {}; retrying in {:?}",
                        attempt, room, e, delay
                    );
                    self.shared
                        .state
                        .set_connection_state(ConnectionState::failed(e));

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel_rx.changed() => {
                            info!("Join for {} cancelled during backoff", room);
                            return Ok(JoinOutcome::Cancelled);
                        }
                    }
                }
            }
        }
    }

    /// Install a fresh connection as the session and start its reader
    async fn start_session(
        &self,
        connection: Connection,
        cancel_rx: &watch::Receiver<u64>,
    ) -> JoinOutcome {
        let Connection { sink, frames } = connection;
        let id = SessionId::new();
        let sink = Arc::new(Mutex::new(sink));

        let installed = self.shared.with_slot(|slot| {
            if cancel_rx.has_changed().unwrap_or(true) {
                return Err(JoinOutcome::Cancelled);
            }
            if slot.is_some() {
                return Err(JoinOutcome::AlreadyActive);
            }
            *slot = Some(Session::new(id, Arc::clone(&sink)));
            self.shared
                .state
                .set_connection_state(ConnectionState::Connected);
            Ok(())
        });

        if let Err(outcome) = installed {
            debug!("Discarding connection, join ended as {:?}", outcome);
            if let Err(e) = sink
                .lock()
                .await
                .close(CloseReason::normal("Client disconnected"))
                .await
            {
                debug!("Close of discarded connection failed: {}", e);
            }
            return outcome;
        }

        let handle = reader::spawn(Arc::clone(&self.shared), id, frames);
        self.shared.attach_reader(id, handle);
        info!("Session {} started", id);
        JoinOutcome::Connected
    }

    /// Close the session and stop any running join
    ///
    /// Always ends in `Disconnected(None)` with the current user cleared,
    /// even when there was nothing to close. Returns only after a running
    /// join has stopped, so a `join` right after it starts fresh.
    pub async fn disconnect(&self) {
        self.cancel
            .send_modify(|generation| *generation = generation.wrapping_add(1));
        // A cancelled join holds this until it observes the new generation
        drop(self.joining.lock().await);

        let session = self.shared.with_slot(|slot| {
            let session = slot.take();
            self.shared.state.set_connection_state(ConnectionState::closed());
            self.shared.state.set_current_user(None);
            session
        });

        let Some(mut session) = session else {
            debug!("Disconnect with no active session");
            return;
        };

        session.abort_reader();
        // Best effort, the session is gone either way
        if let Err(e) = session
            .sink
            .lock()
            .await
            .close(CloseReason::normal("Client disconnected"))
            .await
        {
            debug!("Close frame for session {} not sent: {}", session.id, e);
        }
        info!("Session {} closed", session.id);
    }

    /// Send a text chat message
    pub async fn send_message(
        &self,
        text: &str,
        additional_info: Option<HashMap<String, String>>,
    ) -> bool {
        self.send(OutgoingMessage::text(text, additional_info))
            .await
    }

    /// Send an image as base64 with its mime type in `additionalInfo`
    pub async fn send_image(
        &self,
        bytes: &[u8],
        mime_type: &str,
        additional_info: Option<HashMap<String, String>>,
    ) -> bool {
        self.send(OutgoingMessage::image(bytes, mime_type, additional_info))
            .await
    }

    /// Send an arbitrary event
    pub async fn send_event(
        &self,
        event_type: &str,
        message: &str,
        additional_info: Option<HashMap<String, String>>,
    ) -> bool {
        self.send(OutgoingMessage::event(event_type, message, additional_info))
            .await
    }

    /// Tell the room this user is typing
    pub async fn send_typing(&self) -> bool {
        self.send_event(message_type::USER_TYPING, "", None).await
    }

    /// Tell the room this user stopped typing
    pub async fn send_stopped_typing(&self) -> bool {
        self.send_event(message_type::USER_STOPPED_TYPING, "", None)
            .await
    }

    /// Encode and transmit one envelope
    ///
    /// A transport failure ends the session with `Disconnected(cause)`;
    /// the caller must join again.
    async fn send(&self, msg: OutgoingMessage) -> bool {
        let Some((id, sink)) = self.shared.active_sink() else {
            warn!("Cannot send {}: not connected", msg.kind);
            return false;
        };

        let text = match self.shared.codec.encode(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {}: {}", msg.kind, e);
                return false;
            }
        };

        let result = sink.lock().await.send_text(text).await;
        match result {
            Ok(()) => {
                debug!("Sent {} on session {}", msg.kind, id);
                true
            }
            Err(e) => {
                warn!("Send of {} on session {} failed: {}", msg.kind, id, e);
                if let Some(mut session) = self
                    .shared
                    .end_session(id, Some(ConnectionState::failed(e)))
                {
                    session.abort_reader();
                }
                false
            }
        }
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.connection_state()
    }

    /// Check if a session is live
    pub fn is_connected(&self) -> bool {
        self.shared.has_session()
    }

    /// Get the identity the server assigned to this client
    pub fn current_user(&self) -> Option<User> {
        self.shared.state.current_user()
    }

    /// Subscribe to connection state, starting with the current value
    pub fn subscribe_connection_state(&self) -> Subscription<ConnectionState> {
        self.shared.state.subscribe_connection_state()
    }

    /// Subscribe to the current user, starting with the current value
    pub fn subscribe_current_user(&self) -> Subscription<Option<User>> {
        self.shared.state.subscribe_current_user()
    }

    /// Subscribe to incoming messages published from now on
    pub fn subscribe_messages(&self) -> IncomingMessages {
        self.shared.state.subscribe_messages()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(mut session) = self.shared.with_slot(Option::take) {
            debug!("Client dropped, aborting session {}", session.id);
            session.abort_reader();
        }
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}
