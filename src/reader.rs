//! Frame reader loop
//!
//! One background task per session drains the inbound frame stream,
//! decodes envelopes and republishes them. Self-identity events update the
//! current user instead of reaching message subscribers. When the loop stops,
//! for whatever reason, the session is released exactly once.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::message::MessageEnvelope;
use crate::session::Shared;
use crate::transport::{CloseReason, Frame, FrameStream};
use crate::types::{ConnectionState, SessionId};

/// Why the reader stopped
#[derive(Debug)]
enum ReadOutcome {
    /// Peer sent a close frame
    Closed(Option<CloseReason>),
    /// Transport reported an error
    Failed(ClientError),
    /// Stream ended without a close frame
    Ended,
}

impl ReadOutcome {
    fn into_state(self) -> ConnectionState {
        match self {
            ReadOutcome::Closed(_) => ConnectionState::closed(),
            ReadOutcome::Failed(err) => ConnectionState::failed(err),
            ReadOutcome::Ended => ConnectionState::failed(ClientError::StreamEnded),
        }
    }
}

/// Releases the session when the reader task finishes or is aborted
struct SessionGuard {
    shared: Arc<Shared>,
    id: SessionId,
    released: bool,
}

impl SessionGuard {
    fn new(shared: Arc<Shared>, id: SessionId) -> Self {
        Self {
            shared,
            id,
            released: false,
        }
    }

    fn release(&mut self, final_state: Option<ConnectionState>) {
        if self.released {
            return;
        }
        self.released = true;
        // Dropping the session also drops this task's own handle
        if self.shared.end_session(self.id, final_state).is_some() {
            debug!("Session {} released by reader", self.id);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release(None);
    }
}

/// Spawn the reader task for session `id`
pub(crate) fn spawn(shared: Arc<Shared>, id: SessionId, frames: FrameStream) -> JoinHandle<()> {
    tokio::spawn(run(shared, id, frames))
}

async fn run(shared: Arc<Shared>, id: SessionId, mut frames: FrameStream) {
    let mut guard = SessionGuard::new(Arc::clone(&shared), id);

    let outcome = read_frames(&shared, id, &mut frames).await;
    match &outcome {
        ReadOutcome::Closed(reason) => info!("Session {} closed by server: {:?}", id, reason),
        ReadOutcome::Failed(err) => warn!("Session {} read error: {}", id, err),
        ReadOutcome::Ended => warn!("Session {} stream ended without close frame", id),
    }

    guard.release(Some(outcome.into_state()));
}

async fn read_frames(shared: &Shared, id: SessionId, frames: &mut FrameStream) -> ReadOutcome {
    while let Some(frame_result) = frames.next().await {
        match frame_result {
            Ok(Frame::Text(text)) => match shared.codec.decode(&text) {
                Ok(envelope) => dispatch(shared, envelope),
                Err(e) => {
                    // A bad frame must not take the connection down
                    warn!("Undecodable frame on session {}: {}", id, e);
                }
            },
            Ok(Frame::Close(reason)) => return ReadOutcome::Closed(reason),
            Ok(Frame::Other) => {
                debug!("Ignoring non-text frame on session {}", id);
            }
            Err(e) => return ReadOutcome::Failed(e),
        }
    }
    ReadOutcome::Ended
}

/// Route one decoded envelope
fn dispatch(shared: &Shared, envelope: MessageEnvelope) {
    match envelope.self_identity() {
        Some(user) => shared.state.set_current_user(Some(user)),
        None => {
            debug!("Incoming {} from {}", envelope.kind, envelope.user);
            shared.state.publish_message(envelope);
        }
    }
}
