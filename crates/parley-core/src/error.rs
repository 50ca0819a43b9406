//! Error types for Parley.
//!
//! Display strings are intentionally generic so they can be surfaced or
//! logged without leaking key material or acting as a decryption oracle.
//! The variant payload carries the detail for callers that need it.

use thiserror::Error;

/// Core error type for Parley operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed key, or a signature that does not verify.
    #[error("invalid key material")]
    InvalidKey(String),

    /// The peer presented an identity key that differs from the trusted one.
    /// Carries the peer address.
    #[error("untrusted identity")]
    UntrustedIdentity(String),

    /// No session or sender-key state exists for the peer.
    #[error("no session")]
    NoSession(String),

    /// Counter or iteration already consumed, or outside the skip window.
    #[error("duplicate message")]
    DuplicateMessage(String),

    /// Message version below the minimum supported version.
    #[error("legacy message")]
    LegacyMessage(u8),

    /// Malformed wire structure or authentication failure.
    #[error("invalid message")]
    InvalidMessage(String),

    /// The message references a one-time prekey that was already consumed.
    #[error("stale prekey reference")]
    StaleKeyReference(u32),

    /// A cryptographic primitive failed.
    #[error("cryptographic operation failed")]
    Crypto(String),

    /// Record encoding/decoding error.
    #[error("encoding error")]
    Encoding(String),

    /// Store operation failed.
    #[error("storage error")]
    Storage(String),
}

/// Result type alias using Parley's Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether recovering from this error needs a fresh prekey bundle from
    /// the peer.
    pub fn requires_new_session(&self) -> bool {
        matches!(self, Error::NoSession(_) | Error::StaleKeyReference(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}
