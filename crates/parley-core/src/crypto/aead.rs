//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! Message bodies and authentication tags travel as separate wire fields, so
//! encryption is done in place with a detached tag. Associated data binds the
//! message header and both identities to the ciphertext.

use crate::error::{Error, Result};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce as ChaNonce, Tag,
};

/// Size of encryption key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// A nonce for AEAD encryption.
///
/// Nonces are derived together with the key from a single-use message key
/// seed, so a (key, nonce) pair is never repeated.
#[derive(Clone, Copy, Debug)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl From<[u8; NONCE_SIZE]> for Nonce {
    fn from(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Encrypt plaintext, returning the ciphertext body and the detached tag.
///
/// # Arguments
///
/// * `key` - 32-byte single-use message key
/// * `nonce` - 12-byte nonce derived alongside the key
/// * `plaintext` - Data to encrypt
/// * `associated_data` - Authenticated but not encrypted (header, identities)
pub fn encrypt_detached(
    key: &[u8; KEY_SIZE],
    nonce: &Nonce,
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let cha_nonce = ChaNonce::from_slice(nonce.as_bytes());

    let mut body = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(cha_nonce, associated_data, &mut body)
        .map_err(|_| Error::Crypto("encryption failed".into()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((body, tag_bytes))
}

/// Verify the tag and decrypt the body.
///
/// # Security
///
/// Returns a generic `InvalidMessage` on any failure; the buffer is dropped
/// without being returned, so no unauthenticated plaintext escapes.
pub fn decrypt_detached(
    key: &[u8; KEY_SIZE],
    nonce: &Nonce,
    body: &[u8],
    tag: &[u8; TAG_SIZE],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let cha_nonce = ChaNonce::from_slice(nonce.as_bytes());

    let mut buffer = body.to_vec();
    cipher
        .decrypt_in_place_detached(cha_nonce, associated_data, &mut buffer, Tag::from_slice(tag))
        .map_err(|_| Error::InvalidMessage("authentication failed".into()))?;

    Ok(buffer)
}
