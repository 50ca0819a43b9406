//! Sender key chains and their persisted records.

use crate::crypto::{hkdf_derive, Nonce, KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const SENDER_CHAIN_INFO: &[u8] = b"Parley Sender Chain v1";
const SENDER_MSG_INFO: &[u8] = b"Parley Sender Message v1";

/// A sender chain position: one seed per iteration.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SenderChainKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderChainKey {
    /// Wrap a seed at `iteration`.
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    /// Chain position.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw seed, for distribution messages.
    pub(crate) fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// The chain one step on.
    pub fn next(&self) -> Result<Self> {
        let iteration = self
            .iteration
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("sender chain exhausted".into()))?;
        let output = hkdf_derive(None, &self.seed, SENDER_CHAIN_INFO, 32)?;

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&output);
        Ok(Self { iteration, seed })
    }

    /// Message key for the current iteration.
    pub fn message_key(&self) -> Result<SenderMessageKey> {
        let output = hkdf_derive(None, &self.seed, SENDER_MSG_INFO, KEY_SIZE + NONCE_SIZE)?;

        let mut cipher_key = [0u8; KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        cipher_key.copy_from_slice(&output[..KEY_SIZE]);
        nonce.copy_from_slice(&output[KEY_SIZE..]);

        Ok(SenderMessageKey {
            iteration: self.iteration,
            cipher_key,
            nonce,
        })
    }
}

impl fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderChainKey")
            .field("iteration", &self.iteration)
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

/// Single-use key material for one group message.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SenderMessageKey {
    iteration: u32,
    cipher_key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl SenderMessageKey {
    /// Iteration this key belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// AEAD key.
    pub fn cipher_key(&self) -> &[u8; KEY_SIZE] {
        &self.cipher_key
    }

    /// AEAD nonce.
    pub fn nonce(&self) -> Nonce {
        Nonce::from_bytes(self.nonce)
    }
}

/// One sender chain within a group.
///
/// Only the originating sender holds the private signing key; members hold
/// the public half to verify.
#[derive(Clone, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_public: [u8; 32],
    signing_private: Option<[u8; 32]>,
    // Oldest first
    message_keys: VecDeque<SenderMessageKey>,
}

impl SenderKeyState {
    /// Create a chain state.
    pub fn new(
        key_id: u32,
        chain_key: SenderChainKey,
        signing_public: [u8; 32],
        signing_private: Option<[u8; 32]>,
    ) -> Self {
        Self {
            key_id,
            chain_key,
            signing_public,
            signing_private,
            message_keys: VecDeque::new(),
        }
    }

    /// Chain id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Current chain position.
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    /// Ed25519 verification key.
    pub fn signing_public(&self) -> &[u8; 32] {
        &self.signing_public
    }

    pub(crate) fn signing_private(&self) -> Option<&[u8; 32]> {
        self.signing_private.as_ref()
    }

    /// Cache a skipped key, evicting the oldest beyond `max_keys`.
    pub(crate) fn add_message_key(&mut self, key: SenderMessageKey, max_keys: usize) {
        self.message_keys.push_back(key);
        while self.message_keys.len() > max_keys {
            self.message_keys.pop_front();
        }
    }

    /// Remove and return the cached key for `iteration`, if any.
    pub(crate) fn take_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        let position = self
            .message_keys
            .iter()
            .position(|key| key.iteration() == iteration)?;
        self.message_keys.remove(position)
    }
}

impl Drop for SenderKeyState {
    fn drop(&mut self) {
        if let Some(ref mut private) = self.signing_private {
            private.zeroize();
        }
    }
}

impl fmt::Debug for SenderKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderKeyState")
            .field("key_id", &self.key_id)
            .field("chain_key", &self.chain_key)
            .field("signing_public", &hex::encode(&self.signing_public[..8]))
            .field("has_private", &self.signing_private.is_some())
            .finish()
    }
}

/// All chains held for one (group, sender).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    // Newest first
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no chain is held.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Newest chain.
    pub fn newest_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    /// Chain with `key_id`.
    pub fn state_for_key_id(&self, key_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.key_id() == key_id)
    }

    /// Install `state` as newest, replacing any chain with the same id and
    /// keeping at most `max_states`.
    pub fn add_state(&mut self, state: SenderKeyState, max_states: usize) {
        self.states.retain(|existing| existing.key_id() != state.key_id());
        self.states.push_front(state);
        self.states.truncate(max_states.max(1));
    }

    /// Replace the stored chain with the same id as `state`, keeping its
    /// position.
    pub(crate) fn update_state(&mut self, state: SenderKeyState) {
        if let Some(existing) = self
            .states
            .iter_mut()
            .find(|existing| existing.key_id() == state.key_id())
        {
            *existing = state;
        }
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
