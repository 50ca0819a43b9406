//! Double Ratchet key schedule and session state.
//!
//! - **DH ratchet**: a new peer ratchet key advances the root key and yields
//!   fresh receiving and sending chains (break-in recovery)
//! - **Symmetric ratchet**: every message steps a chain key one-way and
//!   derives a single-use message key (forward secrecy)
//! - **Skipped keys**: keys for messages that have not arrived yet are kept
//!   in a bounded cache
//!
//! The message flow itself lives in `session::cipher`; this module owns the
//! key derivations and the persisted state they act on.

pub mod agreement;
mod state;

pub use agreement::{
    initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters,
};
pub use state::{PendingPreKey, SessionRecord, SessionState};

use crate::crypto::{hkdf_derive, KeyPair, Nonce, X25519PublicKey, KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// KDF info strings - domain separation for different key derivations
const ROOT_KDF_INFO: &[u8] = b"Parley Root KDF v1";
const CHAIN_KDF_INFO: &[u8] = b"Parley Chain KDF v1";
const MSG_KDF_INFO: &[u8] = b"Parley Message KDF v1";

/// Root key, advanced on every DH ratchet step.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; 32]);

impl RootKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// One DH ratchet step: mix `DH(our, their)` into the root key and
    /// split out a new root key and a chain key at index 0.
    pub fn create_chain(
        &self,
        their_ratchet_key: &X25519PublicKey,
        our_ratchet_key: &KeyPair,
    ) -> Result<(RootKey, ChainKey)> {
        let shared = our_ratchet_key.diffie_hellman(their_ratchet_key);
        let output = hkdf_derive(Some(self.0.as_slice()), shared.as_bytes(), ROOT_KDF_INFO, 64)?;

        let mut root = [0u8; 32];
        let mut chain = [0u8; 32];
        root.copy_from_slice(&output[..32]);
        chain.copy_from_slice(&output[32..]);

        Ok((RootKey(root), ChainKey::new(chain, 0)))
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootKey([REDACTED])")
    }
}

/// A sending or receiving chain key and its position.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey {
    key: [u8; 32],
    index: u32,
}

impl ChainKey {
    /// Wrap raw key bytes at `index`.
    pub fn new(key: [u8; 32], index: u32) -> Self {
        Self { key, index }
    }

    /// Position in the chain; also the counter of the next message key.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The chain key one step on.
    pub fn next(&self) -> Result<ChainKey> {
        let index = self
            .index
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("chain exhausted".into()))?;
        let output = hkdf_derive(None, &self.key, CHAIN_KDF_INFO, 32)?;

        let mut key = [0u8; 32];
        key.copy_from_slice(&output);
        Ok(ChainKey { key, index })
    }

    /// Message key for the current index.
    pub fn message_keys(&self) -> Result<MessageKeys> {
        let output = hkdf_derive(None, &self.key, MSG_KDF_INFO, KEY_SIZE + NONCE_SIZE)?;

        let mut cipher_key = [0u8; KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        cipher_key.copy_from_slice(&output[..KEY_SIZE]);
        nonce.copy_from_slice(&output[KEY_SIZE..]);

        Ok(MessageKeys {
            cipher_key,
            nonce,
            counter: self.index,
        })
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKey")
            .field("index", &self.index)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Single-use key material for one message.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MessageKeys {
    cipher_key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    counter: u32,
}

impl MessageKeys {
    /// AEAD key.
    pub fn cipher_key(&self) -> &[u8; KEY_SIZE] {
        &self.cipher_key
    }

    /// AEAD nonce.
    pub fn nonce(&self) -> Nonce {
        Nonce::from_bytes(self.nonce)
    }

    /// Counter of the message these keys belong to.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageKeys")
            .field("counter", &self.counter)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}
