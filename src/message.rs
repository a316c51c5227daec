//! Message protocol definitions
//!
//! JSON envelope exchanged with the chat server. Unlike the closed tagged
//! enums a server can afford, the client keeps `type` as an open string:
//! servers add event kinds over time and the client must pass unknown ones
//! through untouched. Well-known values live in [`message_type`].

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::User;

/// Conventional values of the envelope `type` field
pub mod message_type {
    /// Plain text chat message
    pub const MESSAGE: &str = "message";
    /// Base64 image payload, mime type in `additionalInfo["mimeType"]`
    pub const IMAGE: &str = "image";
    /// Server-generated notice (joins, leaves, identity assignment)
    pub const SYSTEM: &str = "system";
    /// An earlier message was edited
    pub const MESSAGE_UPDATED: &str = "message_updated";
    /// An earlier message was removed
    pub const MESSAGE_DELETED: &str = "message_deleted";
    /// A participant started typing
    pub const USER_TYPING: &str = "user_typing";
    /// A participant stopped typing
    pub const USER_STOPPED_TYPING: &str = "user_stopped_typing";
}

/// Well-known `additionalInfo` keys
pub mod info_key {
    /// `"true"` on the identity event addressed to the joining client
    pub const SELF: &str = "self";
    /// Id the server assigned to the joining user
    pub const JOINED_USER_ID: &str = "joinedUserId";
    /// Name the server assigned to the joining user
    pub const JOINED_USER_NAME: &str = "joinedUserName";
    /// Mime type of an image payload
    pub const MIME_TYPE: &str = "mimeType";
}

/// Server → Client envelope
///
/// `id`, `timestamp` and `user` are assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Server message id (absent on ephemeral events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Open event tag, see [`message_type`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Text body, or base64 data for images
    #[serde(default)]
    pub message: String,
    /// Server timestamp, UTC
    #[serde(with = "instant")]
    pub timestamp: NaiveDateTime,
    /// Author of the event
    pub user: User,
    /// Free-form string attributes
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_info"
    )]
    pub additional_info: Option<HashMap<String, String>>,
}

impl MessageEnvelope {
    /// Look up an `additionalInfo` attribute
    pub fn info(&self, key: &str) -> Option<&str> {
        self.additional_info
            .as_ref()
            .and_then(|info| info.get(key))
            .map(String::as_str)
    }

    /// Check the envelope's `type` tag
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Identity assigned to this client, if this is its self-join event
    ///
    /// Requires `self == "true"` together with both joined-user attributes.
    pub fn self_identity(&self) -> Option<User> {
        if self.info(info_key::SELF) != Some("true") {
            return None;
        }
        let id = self.info(info_key::JOINED_USER_ID)?;
        let name = self.info(info_key::JOINED_USER_NAME)?;
        Some(User::new(id, name))
    }
}

/// Client → Server envelope
///
/// Absent attributes are omitted from the wire form rather than sent as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Open event tag, see [`message_type`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Text body, or base64 data for images
    pub message: String,
    /// Free-form string attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<HashMap<String, String>>,
}

impl OutgoingMessage {
    /// Build an arbitrary event
    pub fn event(
        kind: impl Into<String>,
        message: impl Into<String>,
        additional_info: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            additional_info,
        }
    }

    /// Build a text chat message
    pub fn text(text: impl Into<String>, additional_info: Option<HashMap<String, String>>) -> Self {
        Self::event(message_type::MESSAGE, text, additional_info)
    }

    /// Build an image message
    ///
    /// The bytes are base64-encoded (standard alphabet, no wrapping). The
    /// mime type overrides any `mimeType` the caller put in `additional_info`.
    pub fn image(
        bytes: &[u8],
        mime_type: &str,
        additional_info: Option<HashMap<String, String>>,
    ) -> Self {
        let mut info = additional_info.unwrap_or_default();
        info.insert(info_key::MIME_TYPE.to_string(), mime_type.to_string());
        Self::event(message_type::IMAGE, STANDARD.encode(bytes), Some(info))
    }
}

/// Parse an ISO-8601 instant into a naive UTC datetime
pub fn parse_instant(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.naive_utc())
}

/// Render a naive UTC datetime as an ISO-8601 instant with a `Z` suffix
pub fn format_instant(value: &NaiveDateTime) -> String {
    value.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Serde adapter for instant strings
pub mod instant {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_instant(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw).map_err(serde::de::Error::custom)
    }
}

/// Accept null, and scalar non-string values, inside `additionalInfo`
fn lenient_info<'de, D>(deserializer: D) -> Result<Option<HashMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect()
    }))
}
