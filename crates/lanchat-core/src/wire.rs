//! Lanchat wire format: UDP datagrams and TCP control frames.
//!
//! Every UDP datagram is a single UTF-8 JSON object carrying the constant
//! application tag in `app` and a message kind in `type`. Anything that
//! fails to decode, carries another tag, or names an unknown kind is
//! dropped by the receiver without a reply.
//!
//! The TCP file channel exchanges small JSON control messages framed with
//! a 4-byte big-endian length prefix; raw file bytes flow between the
//! `ready` reply and the final verification reply.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application tag carried by every datagram. Traffic from other
/// applications sharing the broadcast port does not carry it.
pub const APP_TAG: &str = "lanchat";

/// Default UDP port for presence, chat and handshake datagrams.
pub const DEFAULT_UDP_PORT: u16 = 15000;

/// Default TCP port for file data.
pub const DEFAULT_TCP_PORT: u16 = 15001;

/// Largest payload that fits one IPv4 UDP datagram.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Largest TCP control frame accepted from a peer.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// File data is streamed and hashed in chunks of this size.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Display name used when a file request carries no sender name.
pub const UNKNOWN_SENDER: &str = "unknown";

// ── Datagrams ────────────────────────────────────────────────────────────────

/// The four datagram kinds understood on the UDP channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Datagram {
    /// Chat text, unicast to one peer.
    Message { content: String },

    /// Periodic liveness announcement, broadcast.
    Presence {
        username: String,
        #[serde(default = "online")]
        status: String,
    },

    /// Offer to send a file. `port` is the sender's file port and is
    /// informational only.
    FileRequest {
        filename: String,
        size: u64,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default = "unknown_sender")]
        sender: String,
    },

    /// Answer to a [`Datagram::FileRequest`].
    FileResponse { filename: String, accepted: bool },
}

fn online() -> String {
    "online".to_string()
}

fn unknown_sender() -> String {
    UNKNOWN_SENDER.to_string()
}

/// Serialized form: the datagram's fields flattened next to `app`.
#[derive(Serialize)]
struct Tagged<'a> {
    app: &'static str,
    #[serde(flatten)]
    body: &'a Datagram,
}

const KNOWN_TYPES: [&str; 4] = ["message", "presence", "file_request", "file_response"];

impl Datagram {
    /// Build a presence announcement.
    pub fn presence(username: impl Into<String>) -> Self {
        Self::Presence {
            username: username.into(),
            status: online(),
        }
    }

    /// The `type` string used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Presence { .. } => "presence",
            Self::FileRequest { .. } => "file_request",
            Self::FileResponse { .. } => "file_response",
        }
    }

    /// Encode as a tagged JSON datagram, refusing anything that would not
    /// fit a single UDP packet.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = serde_json::to_vec(&Tagged {
            app: APP_TAG,
            body: self,
        })?;
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(WireError::DatagramTooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Decode a received datagram.
    ///
    /// The tag and kind are checked before the per-kind fields so that
    /// foreign traffic and unknown kinds are told apart from malformed
    /// datagrams of our own.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let object = value.as_object().ok_or(WireError::NotAnObject)?;

        match object.get("app").and_then(|v| v.as_str()) {
            Some(APP_TAG) => {}
            _ => return Err(WireError::ForeignApp),
        }

        let kind = object
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(WireError::NotAnObject)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(WireError::UnknownType(kind.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

// ── TCP control frames ───────────────────────────────────────────────────────

/// First frame on a file connection, sent by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub filename: String,
    pub size: u64,
    /// Hex-encoded MD5 of the whole file.
    pub digest: String,
}

/// Receiver's answer to a [`FileHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HeaderReply {
    Ready,
    Rejected,
}

/// Last frame on a file connection, sent by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReply {
    pub md5_match: bool,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("datagram is not a tagged JSON object")]
    NotAnObject,
    #[error("datagram belongs to another application")]
    ForeignApp,
    #[error("unknown datagram type {0:?}")]
    UnknownType(String),
    #[error("encoded datagram is {0} bytes, larger than one UDP packet")]
    DatagramTooLarge(usize),
}
