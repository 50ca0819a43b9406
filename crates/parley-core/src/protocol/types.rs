//! Message types and their wire bodies.
//!
//! Pairwise: `SignalMessage` (WHISPER) and `PreKeySignalMessage` (PREKEY).
//! Group: `SenderKeyMessage` (SENDERKEY) and `SenderKeyDistributionMessage`
//! (SENDERKEY_DISTRIBUTION). Prekey bundles use BUNDLE.

use super::packet::{decode, decode_body, encode, encode_body, FrameHeader, HEADER_SIZE};
use super::CURRENT_VERSION;
use crate::crypto::{serde_bytes, X25519PublicKey, TAG_SIZE};
use crate::error::{Error, Result};
use crate::identity::{IdentityKey, SIGNATURE_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Ratchet message on an established session.
    Whisper = 2,
    /// Ratchet message carrying session bootstrap data.
    PreKey = 3,
    /// Group message.
    SenderKey = 4,
    /// Group sender chain distribution.
    SenderKeyDistribution = 5,
    /// Published prekey bundle.
    Bundle = 6,
}

impl MessageType {
    /// Parse message type from byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            2 => Ok(Self::Whisper),
            3 => Ok(Self::PreKey),
            4 => Ok(Self::SenderKey),
            5 => Ok(Self::SenderKeyDistribution),
            6 => Ok(Self::Bundle),
            _ => Err(Error::InvalidMessage(format!(
                "unknown message type: {:#04x}",
                byte
            ))),
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A Double Ratchet message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Sender's current ratchet public key.
    pub ratchet_key: X25519PublicKey,
    /// Message number in the sending chain.
    pub counter: u32,
    /// Length of the sender's previous sending chain.
    pub previous_counter: u32,
    /// Encrypted body.
    pub body: Vec<u8>,
    /// Authentication tag.
    #[serde(with = "serde_bytes")]
    pub tag: [u8; TAG_SIZE],
}

impl SignalMessage {
    /// Header fields bound into the AEAD associated data.
    ///
    /// Layout: `version (1) || ratchet_key (32) || counter (4, BE) ||
    /// previous_counter (4, BE)`.
    pub fn header_bytes(&self) -> [u8; 41] {
        let mut bytes = [0u8; 41];
        bytes[0] = CURRENT_VERSION;
        bytes[1..33].copy_from_slice(self.ratchet_key.as_bytes());
        bytes[33..37].copy_from_slice(&self.counter.to_be_bytes());
        bytes[37..41].copy_from_slice(&self.previous_counter.to_be_bytes());
        bytes
    }

    /// Serialize to a WHISPER frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(MessageType::Whisper, self)
    }

    /// Parse a WHISPER frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, MessageType::Whisper)
    }
}

/// A ratchet message plus the data a responder needs to derive the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeySignalMessage {
    /// Initiator's registration id.
    pub registration_id: u32,
    /// One-time prekey used, if the bundle carried one.
    pub pre_key_id: Option<u32>,
    /// Signed prekey used.
    pub signed_pre_key_id: u32,
    /// Initiator's base (ephemeral) key.
    pub base_key: X25519PublicKey,
    /// Initiator's identity.
    pub identity_key: IdentityKey,
    /// The embedded ratchet message.
    pub message: SignalMessage,
}

impl PreKeySignalMessage {
    /// Serialize to a PREKEY frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(MessageType::PreKey, self)
    }

    /// Parse a PREKEY frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, MessageType::PreKey)
    }
}

/// Output of a pairwise encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextMessage {
    /// Established session.
    Whisper(SignalMessage),
    /// Session still bootstrapping.
    PreKey(PreKeySignalMessage),
}

impl CiphertextMessage {
    /// Wire type tag.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Whisper(_) => MessageType::Whisper,
            Self::PreKey(_) => MessageType::PreKey,
        }
    }

    /// Serialize to a frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Whisper(m) => m.to_bytes(),
            Self::PreKey(m) => m.to_bytes(),
        }
    }

    /// Parse a WHISPER or PREKEY frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;
        let body = &bytes[HEADER_SIZE..];
        match header.message_type {
            MessageType::Whisper => Ok(Self::Whisper(decode_body(body)?)),
            MessageType::PreKey => Ok(Self::PreKey(decode_body(body)?)),
            other => Err(Error::InvalidMessage(format!(
                "not a pairwise message: {:?}",
                other
            ))),
        }
    }
}

/// A sender's group chain position, handed to each member.
///
/// Carries the chain key in the clear; it must travel over a confidential
/// channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SenderKeyDistributionMessage {
    /// Sender chain id.
    pub key_id: u32,
    /// Chain position of `chain_key`.
    pub iteration: u32,
    /// Chain key at `iteration`.
    #[serde(with = "serde_bytes")]
    pub chain_key: [u8; 32],
    /// Ed25519 key that verifies the sender's group messages.
    #[serde(with = "serde_bytes")]
    pub signing_key: [u8; 32],
}

impl SenderKeyDistributionMessage {
    /// Serialize to a SENDERKEY_DISTRIBUTION frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(MessageType::SenderKeyDistribution, self)
    }

    /// Parse a SENDERKEY_DISTRIBUTION frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, MessageType::SenderKeyDistribution)
    }
}

impl fmt::Debug for SenderKeyDistributionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderKeyDistributionMessage")
            .field("key_id", &self.key_id)
            .field("iteration", &self.iteration)
            .field("chain_key", &"[REDACTED]")
            .field("signing_key", &hex::encode(&self.signing_key[..8]))
            .finish()
    }
}

/// A signed group message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyMessage {
    /// Sender chain id.
    pub key_id: u32,
    /// Chain position used to encrypt.
    pub iteration: u32,
    /// Encrypted body.
    pub body: Vec<u8>,
    /// Authentication tag.
    #[serde(with = "serde_bytes")]
    pub tag: [u8; TAG_SIZE],
    /// Ed25519 signature over [`Self::signed_bytes`].
    #[serde(with = "serde_bytes")]
    pub signature: [u8; SIGNATURE_SIZE],
}

impl SenderKeyMessage {
    /// The bytes covered by the signature: the frame header followed by
    /// every field except the signature.
    pub fn signed_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = FrameHeader::new(MessageType::SenderKey).to_bytes().to_vec();
        bytes.extend(encode_body(&(
            self.key_id,
            self.iteration,
            &self.body,
            self.tag.as_slice(),
        ))?);
        Ok(bytes)
    }

    /// Serialize to a SENDERKEY frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(MessageType::SenderKey, self)
    }

    /// Parse a SENDERKEY frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, MessageType::SenderKey)
    }
}
