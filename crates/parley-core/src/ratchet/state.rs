//! Persisted Double Ratchet state.
//!
//! A [`SessionRecord`] holds the current [`SessionState`] for one peer device
//! plus a bounded list of archived states. Archived states stay decryptable
//! so messages sent across a key change or a simultaneous initiation still
//! arrive.

use super::{ChainKey, MessageKeys, RootKey};
use crate::crypto::{KeyPair, X25519PublicKey};
use crate::error::Result;
use crate::identity::IdentityKey;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Serialize, Deserialize)]
struct SenderChain {
    ratchet_key: KeyPair,
    chain_key: ChainKey,
}

#[derive(Clone, Serialize, Deserialize)]
struct ReceiverChain {
    ratchet_key: X25519PublicKey,
    chain_key: ChainKey,
    // Oldest first
    message_keys: VecDeque<MessageKeys>,
}

/// Bootstrap data the initiator attaches to every message until the
/// responder replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    /// One-time prekey used, if any.
    pub pre_key_id: Option<u32>,
    /// Signed prekey used.
    pub signed_pre_key_id: u32,
    /// Initiator's base key.
    pub base_key: X25519PublicKey,
}

/// Ratchet state for one peer device.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionState {
    version: u8,
    local_identity: IdentityKey,
    remote_identity: IdentityKey,
    root_key: RootKey,
    sender_chain: SenderChain,
    // Oldest first
    receiver_chains: VecDeque<ReceiverChain>,
    previous_counter: u32,
    pending_pre_key: Option<PendingPreKey>,
    local_registration_id: u32,
    remote_registration_id: u32,
    base_key: X25519PublicKey,
}

impl SessionState {
    pub(crate) fn new(
        version: u8,
        local_identity: IdentityKey,
        remote_identity: IdentityKey,
        root_key: RootKey,
        sender_ratchet_key: KeyPair,
        sender_chain_key: ChainKey,
        base_key: X25519PublicKey,
    ) -> Self {
        Self {
            version,
            local_identity,
            remote_identity,
            root_key,
            sender_chain: SenderChain {
                ratchet_key: sender_ratchet_key,
                chain_key: sender_chain_key,
            },
            receiver_chains: VecDeque::new(),
            previous_counter: 0,
            pending_pre_key: None,
            local_registration_id: 0,
            remote_registration_id: 0,
            base_key,
        }
    }

    /// Protocol version the session was created with.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Local identity.
    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity
    }

    /// Peer identity.
    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    /// Base key of the initiator that created this session.
    pub fn base_key(&self) -> &X25519PublicKey {
        &self.base_key
    }

    /// Local registration id.
    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    /// Peer registration id.
    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub(crate) fn set_registration_ids(&mut self, local: u32, remote: u32) {
        self.local_registration_id = local;
        self.remote_registration_id = remote;
    }

    pub(crate) fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    /// Current sending ratchet public key.
    pub fn sender_ratchet_key(&self) -> &X25519PublicKey {
        self.sender_chain.ratchet_key.public_key()
    }

    pub(crate) fn sender_ratchet_key_pair(&self) -> &KeyPair {
        &self.sender_chain.ratchet_key
    }

    pub(crate) fn sender_chain_key(&self) -> &ChainKey {
        &self.sender_chain.chain_key
    }

    pub(crate) fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain.chain_key = chain_key;
    }

    pub(crate) fn set_sender_chain(&mut self, ratchet_key: KeyPair, chain_key: ChainKey) {
        self.sender_chain = SenderChain {
            ratchet_key,
            chain_key,
        };
    }

    /// Length of the previous sending chain.
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub(crate) fn set_previous_counter(&mut self, counter: u32) {
        self.previous_counter = counter;
    }

    /// Bootstrap data still attached to outgoing messages.
    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    pub(crate) fn set_pending_pre_key(&mut self, pending: PendingPreKey) {
        self.pending_pre_key = Some(pending);
    }

    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    /// Number of receiving chains held.
    pub fn receiver_chain_count(&self) -> usize {
        self.receiver_chains.len()
    }

    fn receiver_chain(&self, their_ratchet_key: &X25519PublicKey) -> Option<&ReceiverChain> {
        self.receiver_chains
            .iter()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
    }

    fn receiver_chain_mut(&mut self, their_ratchet_key: &X25519PublicKey) -> Option<&mut ReceiverChain> {
        self.receiver_chains
            .iter_mut()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
    }

    pub(crate) fn receiver_chain_key(&self, their_ratchet_key: &X25519PublicKey) -> Option<&ChainKey> {
        self.receiver_chain(their_ratchet_key)
            .map(|chain| &chain.chain_key)
    }

    /// Add a receiving chain, dropping the oldest beyond `max_chains`.
    pub(crate) fn add_receiver_chain(
        &mut self,
        their_ratchet_key: X25519PublicKey,
        chain_key: ChainKey,
        max_chains: usize,
    ) {
        self.receiver_chains.push_back(ReceiverChain {
            ratchet_key: their_ratchet_key,
            chain_key,
            message_keys: VecDeque::new(),
        });
        while self.receiver_chains.len() > max_chains.max(1) {
            self.receiver_chains.pop_front();
        }
    }

    pub(crate) fn set_receiver_chain_key(
        &mut self,
        their_ratchet_key: &X25519PublicKey,
        chain_key: ChainKey,
    ) {
        if let Some(chain) = self.receiver_chain_mut(their_ratchet_key) {
            chain.chain_key = chain_key;
        }
    }

    /// Cache a skipped message key, evicting the oldest beyond `max_keys`.
    pub(crate) fn add_message_keys(
        &mut self,
        their_ratchet_key: &X25519PublicKey,
        keys: MessageKeys,
        max_keys: usize,
    ) {
        if let Some(chain) = self.receiver_chain_mut(their_ratchet_key) {
            chain.message_keys.push_back(keys);
            while chain.message_keys.len() > max_keys {
                chain.message_keys.pop_front();
            }
        }
    }

    /// Remove and return the cached key for `counter`, if any.
    pub(crate) fn take_message_keys(
        &mut self,
        their_ratchet_key: &X25519PublicKey,
        counter: u32,
    ) -> Option<MessageKeys> {
        let chain = self.receiver_chain_mut(their_ratchet_key)?;
        let position = chain
            .message_keys
            .iter()
            .position(|keys| keys.counter() == counter)?;
        chain.message_keys.remove(position)
    }
}

/// All ratchet states held for one peer device.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    // Newest first
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record holding `state` as current.
    pub fn new(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous: VecDeque::new(),
        }
    }

    /// An empty record.
    pub fn new_fresh() -> Self {
        Self::default()
    }

    /// Whether a current state exists.
    pub fn has_current_state(&self) -> bool {
        self.current.is_some()
    }

    /// Current state.
    pub fn current_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn current_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub(crate) fn set_current_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Archived states, newest first.
    pub fn previous_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Whether any state (current or archived) was created from `base_key`.
    pub fn has_session_state(&self, version: u8, base_key: &X25519PublicKey) -> bool {
        self.current
            .iter()
            .chain(self.previous.iter())
            .any(|state| state.version() == version && state.base_key() == base_key)
    }

    /// Move the current state to the archive.
    pub fn archive_current_state(&mut self, max_archived: usize) {
        if let Some(state) = self.current.take() {
            self.previous.push_front(state);
            self.previous.truncate(max_archived);
        }
    }

    /// Archive the current state and install `state` as current.
    pub fn promote_state(&mut self, state: SessionState, max_archived: usize) {
        self.archive_current_state(max_archived);
        self.current = Some(state);
    }

    /// Replace archived state `index` with `updated` and make it current.
    pub(crate) fn promote_old_session(
        &mut self,
        index: usize,
        updated: SessionState,
        max_archived: usize,
    ) {
        self.previous.remove(index);
        self.promote_state(updated, max_archived);
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
