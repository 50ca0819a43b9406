//! Double Ratchet encryption and decryption.
//!
//! Every operation holds the peer's session lock for the whole
//! load-mutate-store cycle. Decryption runs on a copy of the state and the
//! copy is committed only after the message authenticates, so a forged or
//! replayed message never moves the ratchet.

use super::{SessionBuilder, SessionStatus};
use crate::address::ProtocolAddress;
use crate::config::SessionConfig;
use crate::crypto::{decrypt_detached, encrypt_detached, KeyPair, X25519PublicKey, TAG_SIZE};
use crate::error::{Error, Result};
use crate::identity::IdentityKey;
use crate::logging::RedactedBytes;
use crate::protocol::{CiphertextMessage, PreKeySignalMessage, SignalMessage};
use crate::ratchet::{ChainKey, MessageKeys, SessionRecord, SessionState};
use crate::store::{acquire, ProtocolStore};
use tracing::{debug, info, trace};

/// Encrypts and decrypts messages for one peer device.
pub struct SessionCipher<'a, S: ProtocolStore> {
    store: &'a S,
    remote: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> SessionCipher<'a, S> {
    /// Create a cipher with default limits.
    pub fn new(store: &'a S, remote: ProtocolAddress) -> Self {
        Self::with_config(store, remote, SessionConfig::default())
    }

    /// Create a cipher with explicit limits and trust policy.
    pub fn with_config(store: &'a S, remote: ProtocolAddress, config: SessionConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    /// Peer device this cipher talks to.
    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote
    }

    /// Encrypt `plaintext` on the current session.
    ///
    /// While the peer has not replied yet the result is a pre-key message
    /// carrying the bootstrap data; afterwards it is a plain ratchet message.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CiphertextMessage> {
        let lock = self.store.session_lock(&self.remote);
        let _guard = acquire(&lock);

        let mut record = self.load_record()?;
        let state = record
            .current_state_mut()
            .ok_or_else(|| Error::NoSession(self.remote.to_string()))?;

        if !self
            .store
            .is_trusted_identity(&self.remote, state.remote_identity())?
        {
            return Err(Error::UntrustedIdentity(self.remote.to_string()));
        }

        let chain_key = state.sender_chain_key().clone();
        let message_keys = chain_key.message_keys()?;

        let mut message = SignalMessage {
            ratchet_key: *state.sender_ratchet_key(),
            counter: chain_key.index(),
            previous_counter: state.previous_counter(),
            body: Vec::new(),
            tag: [0u8; TAG_SIZE],
        };
        let aad = associated_data(state.local_identity(), state.remote_identity(), &message);
        let (body, tag) = encrypt_detached(
            message_keys.cipher_key(),
            &message_keys.nonce(),
            plaintext,
            &aad,
        )?;
        message.body = body;
        message.tag = tag;

        state.set_sender_chain_key(chain_key.next()?);

        let output = match state.pending_pre_key() {
            Some(pending) => CiphertextMessage::PreKey(PreKeySignalMessage {
                registration_id: state.local_registration_id(),
                pre_key_id: pending.pre_key_id,
                signed_pre_key_id: pending.signed_pre_key_id,
                base_key: pending.base_key,
                identity_key: *state.local_identity(),
                message,
            }),
            None => CiphertextMessage::Whisper(message),
        };

        self.store.store_session(&self.remote, &record)?;
        trace!(
            peer = %self.remote,
            counter = chain_key.index(),
            plaintext = %RedactedBytes(plaintext),
            "encrypted"
        );
        Ok(output)
    }

    /// Decrypt a pairwise message.
    ///
    /// Pre-key messages first derive (or locate) the responder session; the
    /// one-time prekey is removed only once the message has decrypted.
    pub fn decrypt(&self, message: &CiphertextMessage) -> Result<Vec<u8>> {
        match message {
            CiphertextMessage::Whisper(message) => self.decrypt_signal(message),
            CiphertextMessage::PreKey(message) => self.decrypt_pre_key(message),
        }
    }

    /// Parse a frame and decrypt it.
    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.decrypt(&CiphertextMessage::from_bytes(bytes)?)
    }

    fn decrypt_signal(&self, message: &SignalMessage) -> Result<Vec<u8>> {
        let lock = self.store.session_lock(&self.remote);
        let _guard = acquire(&lock);

        let mut record = self
            .store
            .load_session(&self.remote)?
            .ok_or_else(|| Error::NoSession(self.remote.to_string()))?;

        let plaintext = self.decrypt_with_record(&mut record, message)?;
        self.store.store_session(&self.remote, &record)?;
        Ok(plaintext)
    }

    fn decrypt_pre_key(&self, message: &PreKeySignalMessage) -> Result<Vec<u8>> {
        let lock = self.store.session_lock(&self.remote);
        let _guard = acquire(&lock);

        // Another peer may name the same one-time prekey; only one of them
        // gets to consume it.
        let pre_key_lock = message.pre_key_id.map(|id| self.store.pre_key_lock(id));
        let _pre_key_guard = pre_key_lock.as_deref().map(acquire);

        let mut record = self
            .store
            .load_session(&self.remote)?
            .unwrap_or_default();

        let builder =
            SessionBuilder::with_config(self.store, self.remote.clone(), self.config.clone());
        let consumed = builder.process_pre_key_message(&mut record, message)?;

        let plaintext = self.decrypt_with_record(&mut record, &message.message)?;

        self.store.store_session(&self.remote, &record)?;
        self.store.save_identity(&self.remote, &message.identity_key)?;
        if let Some(id) = consumed {
            self.store.remove_pre_key(id)?;
            info!(peer = %self.remote, pre_key_id = id, "consumed one-time prekey");
        }
        Ok(plaintext)
    }

    /// Try the current state, then each archived state, on copies. The first
    /// state that decrypts is committed (archived ones are promoted).
    fn decrypt_with_record(
        &self,
        record: &mut SessionRecord,
        message: &SignalMessage,
    ) -> Result<Vec<u8>> {
        let mut errors = Vec::new();

        if let Some(current) = record.current_state() {
            let mut state = current.clone();
            match self.decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    record.set_current_state(state);
                    return Ok(plaintext);
                }
                Err(e) => errors.push(e),
            }
        }

        let mut promoted = None;
        for (index, previous) in record.previous_states().enumerate() {
            let mut state = previous.clone();
            match self.decrypt_with_state(&mut state, message) {
                Ok(plaintext) => {
                    promoted = Some((index, state, plaintext));
                    break;
                }
                Err(e) => errors.push(e),
            }
        }

        if let Some((index, state, plaintext)) = promoted {
            debug!(peer = %self.remote, index, "promoted archived session state");
            record.promote_old_session(index, state, self.config.max_archived_states);
            return Ok(plaintext);
        }

        if errors.is_empty() {
            return Err(Error::NoSession(self.remote.to_string()));
        }
        // A duplicate anywhere means the message was seen before; report
        // that over authentication failures on unrelated states.
        match errors
            .iter()
            .position(|e| matches!(e, Error::DuplicateMessage(_)))
        {
            Some(index) => Err(errors.swap_remove(index)),
            None => Err(errors.swap_remove(0)),
        }
    }

    fn decrypt_with_state(
        &self,
        state: &mut SessionState,
        message: &SignalMessage,
    ) -> Result<Vec<u8>> {
        let their_ratchet_key = message.ratchet_key;
        let chain_key = self.get_or_create_chain_key(state, &their_ratchet_key)?;
        let message_keys =
            self.get_or_create_message_keys(state, &their_ratchet_key, &chain_key, message.counter)?;

        let aad = associated_data(state.remote_identity(), state.local_identity(), message);
        let plaintext = decrypt_detached(
            message_keys.cipher_key(),
            &message_keys.nonce(),
            &message.body,
            &message.tag,
            &aad,
        )?;

        state.clear_pending_pre_key();
        Ok(plaintext)
    }

    /// Receiving chain for `their_ratchet_key`, performing a DH ratchet step
    /// if the key is new.
    fn get_or_create_chain_key(
        &self,
        state: &mut SessionState,
        their_ratchet_key: &X25519PublicKey,
    ) -> Result<ChainKey> {
        if let Some(chain_key) = state.receiver_chain_key(their_ratchet_key) {
            return Ok(chain_key.clone());
        }

        let (root, receiving) = state
            .root_key()
            .create_chain(their_ratchet_key, state.sender_ratchet_key_pair())?;
        let our_new_ratchet_key = KeyPair::generate();
        let (root, sending) = root.create_chain(their_ratchet_key, &our_new_ratchet_key)?;

        let previous_counter = state.sender_chain_key().index().saturating_sub(1);

        state.set_root_key(root);
        state.add_receiver_chain(
            *their_ratchet_key,
            receiving.clone(),
            self.config.max_receiver_chains,
        );
        state.set_previous_counter(previous_counter);
        state.set_sender_chain(our_new_ratchet_key, sending);

        debug!(peer = %self.remote, previous_counter, "DH ratchet step");
        Ok(receiving)
    }

    /// Message keys for `counter`, from the cache if the chain is already
    /// past it, otherwise by advancing the chain and caching skipped keys.
    fn get_or_create_message_keys(
        &self,
        state: &mut SessionState,
        their_ratchet_key: &X25519PublicKey,
        chain_key: &ChainKey,
        counter: u32,
    ) -> Result<MessageKeys> {
        let index = chain_key.index();

        if index > counter {
            return state
                .take_message_keys(their_ratchet_key, counter)
                .ok_or_else(|| Error::DuplicateMessage(format!("counter {}", counter)));
        }

        if counter - index > self.config.max_skip {
            return Err(Error::DuplicateMessage(format!(
                "counter {} outside skip window",
                counter
            )));
        }

        let mut chain_key = chain_key.clone();
        while chain_key.index() < counter {
            state.add_message_keys(
                their_ratchet_key,
                chain_key.message_keys()?,
                self.config.max_message_keys,
            );
            chain_key = chain_key.next()?;
        }

        state.set_receiver_chain_key(their_ratchet_key, chain_key.next()?);
        chain_key.message_keys()
    }

    /// Registration id of the peer device.
    pub fn remote_registration_id(&self) -> Result<u32> {
        self.current_state_field(SessionState::remote_registration_id)
    }

    /// Protocol version of the current session.
    pub fn session_version(&self) -> Result<u8> {
        self.current_state_field(SessionState::version)
    }

    /// Where the session with the peer stands.
    pub fn status(&self) -> Result<SessionStatus> {
        let record = self.store.load_session(&self.remote)?;
        Ok(match record.as_ref().and_then(SessionRecord::current_state) {
            None => SessionStatus::Uninitialized,
            Some(state) if state.pending_pre_key().is_some() => SessionStatus::InitiatorPending,
            Some(_) => SessionStatus::Established,
        })
    }

    fn current_state_field<T>(&self, field: impl Fn(&SessionState) -> T) -> Result<T> {
        self.store
            .load_session(&self.remote)?
            .as_ref()
            .and_then(SessionRecord::current_state)
            .map(field)
            .ok_or_else(|| Error::NoSession(self.remote.to_string()))
    }

    fn load_record(&self) -> Result<SessionRecord> {
        self.store
            .load_session(&self.remote)?
            .ok_or_else(|| Error::NoSession(self.remote.to_string()))
    }
}

/// `sender identity || receiver identity || header`
fn associated_data(
    sender: &IdentityKey,
    receiver: &IdentityKey,
    message: &SignalMessage,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(2 * 64 + 41);
    aad.extend_from_slice(&sender.to_bytes());
    aad.extend_from_slice(&receiver.to_bytes());
    aad.extend_from_slice(&message.header_bytes());
    aad
}
