//! Wire codec
//!
//! Turns envelopes into text frames and back. The JSON settings are an
//! explicit [`CodecConfig`] value owned by whoever needs a codec, so two
//! clients in one process can disagree about them.

use crate::error::{ClientError, ClientResult};
use crate::message::{MessageEnvelope, OutgoingMessage};

/// Fields an inbound envelope may carry
const ENVELOPE_FIELDS: &[&str] = &["id", "type", "message", "timestamp", "user", "additionalInfo"];

/// JSON codec settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Skip fields the client does not know instead of rejecting the frame
    pub ignore_unknown_keys: bool,
    /// Pretty-print outgoing JSON
    pub pretty: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            ignore_unknown_keys: true,
            pretty: false,
        }
    }
}

/// Envelope encoder/decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    /// Create a codec with the given settings
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Get the codec settings
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode an outgoing envelope as one text frame
    pub fn encode(&self, msg: &OutgoingMessage) -> ClientResult<String> {
        let text = if self.config.pretty {
            serde_json::to_string_pretty(msg)?
        } else {
            serde_json::to_string(msg)?
        };
        Ok(text)
    }

    /// Decode one inbound text frame
    pub fn decode(&self, text: &str) -> ClientResult<MessageEnvelope> {
        if self.config.ignore_unknown_keys {
            return Ok(serde_json::from_str(text)?);
        }

        let value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(object) = value.as_object() {
            if let Some(unknown) = object
                .keys()
                .find(|key| !ENVELOPE_FIELDS.contains(&key.as_str()))
            {
                return Err(ClientError::UnknownField(unknown.clone()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}
