//! Prekeys published ahead of time so peers can start sessions while the
//! owner is offline.
//!
//! - One-time prekeys: consumed at most once, then deleted
//! - Signed prekeys: medium-term, signed by the identity key, rotated on a
//!   schedule (see [`rotation`])
//! - Bundles: the publishable snapshot a peer hands to `SessionBuilder`

mod bundle;
pub mod rotation;

pub use bundle::PreKeyBundle;
pub use rotation::SignedPreKeyRotation;

use crate::crypto::{serde_bytes, KeyPair};
use crate::identity::{IdentityKeyPair, SIGNATURE_SIZE};
use serde::{Deserialize, Serialize};

/// Prekey ids live in `1..MAX_PRE_KEY_ID`.
pub const MAX_PRE_KEY_ID: u32 = 0xFF_FFFF;

/// A one-time prekey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    /// Wrap a key pair.
    pub fn new(id: u32, key_pair: KeyPair) -> Self {
        Self { id, key_pair }
    }

    /// Prekey id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// A signed prekey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: u32,
    timestamp: u64,
    key_pair: KeyPair,
    #[serde(with = "serde_bytes")]
    signature: [u8; SIGNATURE_SIZE],
}

impl SignedPreKeyRecord {
    /// Generate and sign a new signed prekey created at `timestamp`
    /// (Unix milliseconds).
    pub fn generate(identity: &IdentityKeyPair, id: u32, timestamp: u64) -> Self {
        let key_pair = KeyPair::generate();
        let signature = identity.sign(key_pair.public_key().as_bytes());
        Self {
            id,
            timestamp,
            key_pair,
            signature,
        }
    }

    /// Signed prekey id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Creation time in Unix milliseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Identity signature over the public key.
    pub fn signature(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.signature
    }
}

/// Generate `count` one-time prekeys with consecutive ids starting after
/// `start`, wrapping within `1..MAX_PRE_KEY_ID`.
pub fn generate_pre_keys(start: u32, count: u32) -> Vec<PreKeyRecord> {
    (0..count)
        .map(|i| {
            let id = (start.wrapping_add(i) % (MAX_PRE_KEY_ID - 1)) + 1;
            PreKeyRecord::new(id, KeyPair::generate())
        })
        .collect()
}

/// Generate a signed prekey stamped with the current time.
pub fn generate_signed_pre_key(identity: &IdentityKeyPair, id: u32) -> SignedPreKeyRecord {
    SignedPreKeyRecord::generate(identity, id, now_millis())
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::generate_identity_key_pair;

    #[test]
    fn test_generate_pre_keys_ids() {
        let keys = generate_pre_keys(0, 100);
        assert_eq!(keys.len(), 100);
        assert_eq!(keys[0].id(), 1);
        assert_eq!(keys[99].id(), 100);
    }

    #[test]
    fn test_generate_pre_keys_wraps() {
        let keys = generate_pre_keys(MAX_PRE_KEY_ID - 3, 4);
        let ids: Vec<u32> = keys.iter().map(PreKeyRecord::id).collect();
        assert_eq!(ids, vec![MAX_PRE_KEY_ID - 2, MAX_PRE_KEY_ID - 1, 1, 2]);
        assert!(ids.iter().all(|id| *id >= 1 && *id < MAX_PRE_KEY_ID));
    }

    #[test]
    fn test_signed_pre_key_signature() {
        let identity = generate_identity_key_pair();
        let record = generate_signed_pre_key(&identity, 5);

        assert_eq!(record.id(), 5);
        assert!(record.timestamp() > 0);
        identity
            .public_key()
            .verify_signature(record.key_pair().public_key().as_bytes(), record.signature())
            .expect("signature should verify");
    }
}
