//! Wire formats for Parley.
//!
//! Every message is a versioned binary frame. Only the version and type are
//! visible outside the bincode body; everything a decryptor needs to reject
//! a message early (legacy version, unknown type) sits in the first two
//! bytes.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────┬─────────┬──────────────────────┐
//! │ Version              │  Type   │  Body                │
//! │ (msg << 4 | current) │ (1 byte)│  (bincode, variable) │
//! └──────────────────────┴─────────┴──────────────────────┘
//! ```

mod packet;
mod types;

pub use packet::{decode, encode, FrameHeader, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use types::{
    CiphertextMessage, MessageType, PreKeySignalMessage, SenderKeyDistributionMessage,
    SenderKeyMessage, SignalMessage,
};

use crate::error::{Error, Result};

/// Current protocol version.
pub const CURRENT_VERSION: u8 = 3;

/// Minimum supported protocol version.
pub const MIN_VERSION: u8 = 3;

/// Validate that a message version is supported.
///
/// Older versions fail with `LegacyMessage` so callers can tell a peer
/// running old software apart from garbage.
pub fn validate_version(version: u8) -> Result<()> {
    if version < MIN_VERSION {
        return Err(Error::LegacyMessage(version));
    }
    if version > CURRENT_VERSION {
        return Err(Error::InvalidMessage(format!(
            "unknown message version: {}",
            version
        )));
    }
    Ok(())
}
