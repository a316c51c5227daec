//! Observable client state
//!
//! Three channels are exposed to the application:
//! - connection state and current user, with latest-value semantics
//!   ([`Observable`]): a new subscriber first sees the current value, then
//!   every later change in order
//! - incoming messages, a lossy broadcast ([`IncomingMessages`]): no replay,
//!   and a slow subscriber loses its oldest undelivered messages

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

use crate::message::MessageEnvelope;
use crate::types::{ConnectionState, User};

struct ObservableInner<T> {
    current: T,
    sender: broadcast::Sender<T>,
}

/// A value whose changes can be watched
///
/// Setting and subscribing happen under one lock, so a subscriber never
/// misses a change made after it read the current value.
pub struct Observable<T> {
    inner: Mutex<ObservableInner<T>>,
}

impl<T: Clone> Observable<T> {
    /// Create an observable holding `initial`
    ///
    /// `capacity` bounds how many changes a subscriber may fall behind
    /// before it skips ahead.
    pub fn new(initial: T, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(ObservableInner {
                current: initial,
                sender,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ObservableInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current value
    pub fn get(&self) -> T {
        self.lock().current.clone()
    }

    /// Replace the current value and notify subscribers
    pub fn set(&self, value: T) {
        let mut inner = self.lock();
        inner.current = value.clone();
        // No subscribers is fine
        let _ = inner.sender.send(value);
    }

    /// Subscribe, starting with the current value
    pub fn subscribe(&self) -> Subscription<T> {
        let inner = self.lock();
        Subscription {
            pending: Some(inner.current.clone()),
            receiver: inner.sender.subscribe(),
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("current", &self.lock().current)
            .finish()
    }
}

/// Subscription to an [`Observable`]
#[derive(Debug)]
pub struct Subscription<T> {
    pending: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next value
    ///
    /// Returns `None` once the observable is dropped.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(value) = self.pending.take() {
            return Some(value);
        }
        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("State subscriber skipped {} changes", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next value if one is already available
    pub fn try_next(&mut self) -> Option<T> {
        if let Some(value) = self.pending.take() {
            return Some(value);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!("State subscriber skipped {} changes", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription to incoming chat messages
///
/// Backed by a bounded broadcast buffer. When this subscriber falls more than
/// the buffer size behind, the oldest messages it has not read are dropped.
#[derive(Debug)]
pub struct IncomingMessages {
    receiver: broadcast::Receiver<MessageEnvelope>,
}

impl IncomingMessages {
    /// Wait for the next message
    ///
    /// Returns `None` once the client is dropped.
    pub async fn recv(&mut self) -> Option<MessageEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(dropped)) => {
                    warn!("Slow message subscriber, dropped {} oldest messages", dropped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next message if one is already buffered
    pub fn try_recv(&mut self) -> Option<MessageEnvelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Lagged(dropped)) => {
                    warn!("Slow message subscriber, dropped {} oldest messages", dropped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// The client's observable surface
#[derive(Debug)]
pub struct ChatState {
    connection: Observable<ConnectionState>,
    current_user: Observable<Option<User>>,
    messages: broadcast::Sender<MessageEnvelope>,
}

impl ChatState {
    /// Create the state surface
    ///
    /// `message_buffer` is rounded up to a power of two by the broadcast
    /// channel.
    pub fn new(message_buffer: usize, state_buffer: usize) -> Self {
        let (messages, _) = broadcast::channel(message_buffer.max(1));
        Self {
            connection: Observable::new(ConnectionState::Idle, state_buffer),
            current_user: Observable::new(None, state_buffer),
            messages,
        }
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get()
    }

    /// Update the connection state and notify subscribers
    pub fn set_connection_state(&self, new_state: ConnectionState) {
        info!("Connection state: {}", new_state);
        self.connection.set(new_state);
    }

    /// Subscribe to connection state changes
    pub fn subscribe_connection_state(&self) -> Subscription<ConnectionState> {
        self.connection.subscribe()
    }

    /// Get the identity the server assigned to this client
    pub fn current_user(&self) -> Option<User> {
        self.current_user.get()
    }

    /// Update the current user
    pub fn set_current_user(&self, user: Option<User>) {
        match &user {
            Some(user) => info!("Current user: {}", user),
            None => debug!("Current user cleared"),
        }
        self.current_user.set(user);
    }

    /// Subscribe to current user changes
    pub fn subscribe_current_user(&self) -> Subscription<Option<User>> {
        self.current_user.subscribe()
    }

    /// Deliver a message to every current subscriber
    pub fn publish_message(&self, msg: MessageEnvelope) {
        if self.messages.send(msg).is_err() {
            debug!("Incoming message dropped, no subscribers");
        }
    }

    /// Subscribe to incoming messages published from now on
    pub fn subscribe_messages(&self) -> IncomingMessages {
        IncomingMessages {
            receiver: self.messages.subscribe(),
        }
    }
}
