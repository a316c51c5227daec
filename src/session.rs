//! Session ownership
//!
//! At most one [`Session`] exists at a time. It lives in a slot inside
//! [`Shared`], which the join loop, the reader task, the senders and
//! `disconnect` all reach through [`Shared::with_slot`]. The slot lock is a
//! plain mutex and is never held across an await, so every replace/clear
//! and the state change that goes with it happen as one step.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::state::ChatState;
use crate::transport::FrameSink;
use crate::types::{ConnectionState, SessionId};

/// Write half shared between concurrent senders; the lock serializes frames
pub(crate) type SharedSink = Arc<AsyncMutex<Box<dyn FrameSink>>>;

/// One live connection plus its reader task
pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) sink: SharedSink,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, sink: SharedSink) -> Self {
        Self {
            id,
            sink,
            reader: None,
        }
    }

    /// Cancel the reader task, if it is still running
    pub(crate) fn abort_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}

/// State shared by the client handle and its background tasks
pub(crate) struct Shared {
    pub(crate) state: ChatState,
    pub(crate) codec: Codec,
    slot: Mutex<Option<Session>>,
}

impl Shared {
    pub(crate) fn new(state: ChatState, codec: Codec) -> Self {
        Self {
            state,
            codec,
            slot: Mutex::new(None),
        }
    }

    /// Run `f` with exclusive access to the session slot
    pub(crate) fn with_slot<R>(&self, f: impl FnOnce(&mut Option<Session>) -> R) -> R {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    pub(crate) fn has_session(&self) -> bool {
        self.with_slot(|slot| slot.is_some())
    }

    /// Id and sink of the active session
    pub(crate) fn active_sink(&self) -> Option<(SessionId, SharedSink)> {
        self.with_slot(|slot| {
            slot.as_ref()
                .map(|session| (session.id, Arc::clone(&session.sink)))
        })
    }

    /// Hand the reader handle to session `id`
    ///
    /// If that session is already gone the handle is aborted instead.
    pub(crate) fn attach_reader(&self, id: SessionId, handle: JoinHandle<()>) {
        self.with_slot(|slot| match slot.as_mut() {
            Some(session) if session.id == id => session.reader = Some(handle),
            _ => handle.abort(),
        })
    }

    /// Remove session `id` if it is still the active one
    ///
    /// `final_state` is emitted only when the session was removed, so a
    /// stale task can neither clear a newer session nor report on its behalf.
    pub(crate) fn end_session(
        &self,
        id: SessionId,
        final_state: Option<ConnectionState>,
    ) -> Option<Session> {
        self.with_slot(|slot| {
            if slot.as_ref().map(|session| session.id) != Some(id) {
                return None;
            }
            let session = slot.take();
            if let Some(state) = final_state {
                self.state.set_connection_state(state);
            }
            session
        })
    }
}
