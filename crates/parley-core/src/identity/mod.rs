//! Long-term party identity.
//!
//! An identity is an Ed25519 signing key (signs prekeys) paired with an
//! X25519 static key (takes part in key agreement). The public half is the
//! 64-byte concatenation `x25519_public || ed25519_public`.
//!
//! ## Security
//!
//! - Secret keys are zeroized on drop
//! - Fingerprints enable out-of-band verification, and are only logged
//!   through [`crate::logging::RedactedHex`]

use crate::crypto::{KeyPair, SharedSecret, X25519PublicKey, X25519_KEY_SIZE};
use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Serialized size of an [`IdentityKey`].
pub const IDENTITY_KEY_SIZE: usize = X25519_KEY_SIZE + PUBLIC_KEY_LENGTH;

/// Size of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Largest registration id handed out by [`generate_registration_id`].
pub const MAX_REGISTRATION_ID: u32 = 16380;

/// Public identity of a party.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdentityKey {
    dh: X25519PublicKey,
    signing: VerifyingKey,
}

impl IdentityKey {
    /// Parse and validate a serialized identity key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != IDENTITY_KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "identity key must be {} bytes, got {}",
                IDENTITY_KEY_SIZE,
                bytes.len()
            )));
        }

        let mut dh = [0u8; X25519_KEY_SIZE];
        dh.copy_from_slice(&bytes[..X25519_KEY_SIZE]);
        let mut signing = [0u8; PUBLIC_KEY_LENGTH];
        signing.copy_from_slice(&bytes[X25519_KEY_SIZE..]);

        let signing = VerifyingKey::from_bytes(&signing)
            .map_err(|_| Error::InvalidKey("invalid Ed25519 identity point".into()))?;

        Ok(Self {
            dh: X25519PublicKey::from_bytes(dh),
            signing,
        })
    }

    /// Serialize as `x25519_public || ed25519_public`.
    pub fn to_bytes(&self) -> [u8; IDENTITY_KEY_SIZE] {
        let mut out = [0u8; IDENTITY_KEY_SIZE];
        out[..X25519_KEY_SIZE].copy_from_slice(self.dh.as_bytes());
        out[X25519_KEY_SIZE..].copy_from_slice(self.signing.as_bytes());
        out
    }

    /// The Diffie-Hellman half.
    pub fn dh_public(&self) -> &X25519PublicKey {
        &self.dh
    }

    /// The signature verification half.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.signing
    }

    /// Verify a signature made by this identity.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> Result<()> {
        let signature = Signature::from_bytes(signature);
        self.signing
            .verify_strict(message, &signature)
            .map_err(|_| Error::InvalidKey("signature verification failed".into()))
    }

    /// SHA-256 fingerprint, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({}...)", &self.fingerprint()[..16])
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_bytes().as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Long-term identity key pair of the local party.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing: SigningKey,
    dh: KeyPair,
}

impl IdentityKeyPair {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            dh: KeyPair::generate(),
        }
    }

    /// Restore from the 64 secret bytes produced by [`Self::secret_bytes`].
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 2 * X25519_KEY_SIZE {
            return Err(Error::InvalidKey("identity secret must be 64 bytes".into()));
        }
        let mut signing = Zeroizing::new([0u8; 32]);
        signing.copy_from_slice(&bytes[..32]);
        let mut dh = Zeroizing::new([0u8; X25519_KEY_SIZE]);
        dh.copy_from_slice(&bytes[32..]);

        Ok(Self {
            signing: SigningKey::from_bytes(&signing),
            dh: KeyPair::from_secret_bytes(*dh),
        })
    }

    /// Export `ed25519_secret || x25519_secret` for storage.
    ///
    /// # Security
    /// These bytes must be encrypted before storage.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(64));
        out.extend_from_slice(&self.signing.to_bytes());
        out.extend_from_slice(&*self.dh.secret_bytes());
        out
    }

    /// Public identity.
    pub fn public_key(&self) -> IdentityKey {
        IdentityKey {
            dh: *self.dh.public_key(),
            signing: self.signing.verifying_key(),
        }
    }

    /// Sign a message with the identity signing key.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    /// Diffie-Hellman with the identity X25519 key.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        self.dh.diffie_hellman(their_public)
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Generate a new random identity key pair.
pub fn generate_identity_key_pair() -> IdentityKeyPair {
    IdentityKeyPair::generate()
}

/// Generate a registration id in `1..=16380`.
pub fn generate_registration_id() -> u32 {
    OsRng.gen_range(1..=MAX_REGISTRATION_ID)
}
