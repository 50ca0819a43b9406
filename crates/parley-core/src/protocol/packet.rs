//! Frame encoding and parsing.
//!
//! Malformed frames map to `InvalidMessage`; a version below the supported
//! minimum maps to `LegacyMessage` before the body is touched.

use super::types::MessageType;
use super::{validate_version, CURRENT_VERSION};
use crate::error::{Error, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Header size: version (1) + type (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Maximum accepted frame size (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Version the message was produced with.
    pub version: u8,
    /// Message type.
    pub message_type: MessageType,
}

impl FrameHeader {
    /// Create a header at the current version.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            version: CURRENT_VERSION,
            message_type,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [(self.version << 4) | CURRENT_VERSION, self.message_type.to_byte()]
    }

    /// Parse header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidMessage("frame too short".into()));
        }

        let version = bytes[0] >> 4;
        validate_version(version)?;

        let message_type = MessageType::from_byte(bytes[1])?;

        Ok(Self {
            version,
            message_type,
        })
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_MESSAGE_SIZE as u64)
}

/// Encode a message body into a frame.
pub fn encode<T: Serialize>(message_type: MessageType, body: &T) -> Result<Vec<u8>> {
    let mut bytes = FrameHeader::new(message_type).to_bytes().to_vec();
    wire_options()
        .serialize_into(&mut bytes, body)
        .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(bytes)
}

/// Decode a frame, checking that it carries the expected message type.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], expected: MessageType) -> Result<T> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage("frame too large".into()));
    }

    let header = FrameHeader::from_bytes(bytes)?;
    if header.message_type != expected {
        return Err(Error::InvalidMessage(format!(
            "expected {:?}, got {:?}",
            expected, header.message_type
        )));
    }

    decode_body(&bytes[HEADER_SIZE..])
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    wire_options()
        .deserialize(body)
        .map_err(|e| Error::InvalidMessage(format!("malformed body: {}", e)))
}

pub(crate) fn encode_body<T: Serialize>(body: &T) -> Result<Vec<u8>> {
    wire_options()
        .serialize(body)
        .map_err(|e| Error::Encoding(e.to_string()))
}
