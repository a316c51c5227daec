//! Client configuration
//!
//! Holds the server base URL, reconnect backoff and channel sizes, and
//! builds the join URL for a room.

use std::env;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::codec::CodecConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::RoomId;

/// Default server address
pub const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8080";

/// Per-subscriber buffer for incoming messages
pub const DEFAULT_MESSAGE_BUFFER: usize = 64;

/// Per-subscriber buffer for state transitions
pub const DEFAULT_STATE_BUFFER: usize = 32;

/// Reconnect delay policy
///
/// Doubles from `base` on every failed attempt, capped at `max`:
/// 1s, 2s, 4s, 8s, 10s, 10s, ... with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub base: Duration,
    /// Delay ceiling
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` consecutive failures (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `ws://chat.example.com`
    pub base_url: String,
    /// Reconnect backoff
    pub backoff: BackoffPolicy,
    /// Incoming message buffer per subscriber (oldest dropped on overflow)
    pub message_buffer: usize,
    /// State transition buffer per subscriber
    pub state_buffer: usize,
    /// JSON codec settings
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            backoff: BackoffPolicy::default(),
            message_buffer: DEFAULT_MESSAGE_BUFFER,
            state_buffer: DEFAULT_STATE_BUFFER,
            codec: CodecConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `CHAT_BASE_URL`, `CHAT_BACKOFF_MAX_SECS`
    /// and `CHAT_MESSAGE_BUFFER`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = env::var("CHAT_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(secs) = parse_env::<u64>("CHAT_BACKOFF_MAX_SECS") {
            config.backoff.max = Duration::from_secs(secs);
        }
        if let Some(size) = parse_env::<usize>("CHAT_MESSAGE_BUFFER") {
            config.message_buffer = size;
        }

        config
    }

    /// Set the reconnect backoff
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the incoming message buffer size
    pub fn with_message_buffer(mut self, size: usize) -> Self {
        self.message_buffer = size;
        self
    }

    /// Set how many state changes a subscriber may lag before skipping ahead
    pub fn with_state_buffer(mut self, size: usize) -> Self {
        self.state_buffer = size;
        self
    }

    /// Set the codec settings
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Build `<base>/join/<room>?user=<name>&userId=<id>&userInfo=true`
    ///
    /// Empty or absent identifiers are left out. When both are given the
    /// server prefers `userId`.
    pub fn join_url(
        &self,
        room: &RoomId,
        user_name: Option<&str>,
        user_id: Option<&str>,
    ) -> ClientResult<Url> {
        let mut url = Url::parse(&self.base_url)?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("join")
            .push(&room.0);

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            if let Some(name) = user_name.filter(|n| !n.is_empty()) {
                query.append_pair("user", name);
            }
            if let Some(id) = user_id.filter(|i| !i.is_empty()) {
                query.append_pair("userId", id);
            }
            query.append_pair("userInfo", "true");
        }

        Ok(url)
    }
}

/// Read and parse an environment variable, ignoring bad values
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}
