//! Session setup from prekey bundles and pre-key messages.

use super::check_trust;
use crate::address::ProtocolAddress;
use crate::config::SessionConfig;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};
use crate::logging::RedactedHex;
use crate::prekeys::PreKeyBundle;
use crate::protocol::{PreKeySignalMessage, CURRENT_VERSION};
use crate::ratchet::{
    initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters,
    PendingPreKey, SessionRecord,
};
use crate::store::{acquire, ProtocolStore};
use tracing::{debug, info, warn};

/// Builds sessions toward one peer device.
pub struct SessionBuilder<'a, S: ProtocolStore> {
    store: &'a S,
    remote: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> SessionBuilder<'a, S> {
    /// Create a builder with default limits.
    pub fn new(store: &'a S, remote: ProtocolAddress) -> Self {
        Self::with_config(store, remote, SessionConfig::default())
    }

    /// Create a builder with explicit limits and trust policy.
    pub fn with_config(store: &'a S, remote: ProtocolAddress, config: SessionConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    /// Start a session from the peer's published bundle.
    ///
    /// Verifies the signed prekey signature and the peer's identity, derives
    /// the initiator state and makes it current (archiving any previous
    /// state). The one-time prekey is only consumed on the peer's side.
    pub fn process_pre_key_bundle(&self, bundle: &PreKeyBundle) -> Result<()> {
        if let Err(e) = bundle.verify_signature() {
            warn!(peer = %self.remote, "prekey bundle signature invalid");
            return Err(e);
        }
        check_trust(
            self.store,
            &self.remote,
            bundle.identity_key(),
            self.config.trust_policy,
        )?;

        let lock = self.store.session_lock(&self.remote);
        let _guard = acquire(&lock);

        let our_identity = self.store.identity_key_pair()?;
        let base_key = KeyPair::generate();

        let mut state = initialize_alice_session(&AliceParameters {
            our_identity: &our_identity,
            our_base_key: &base_key,
            their_identity: bundle.identity_key(),
            their_signed_pre_key: bundle.signed_pre_key_public(),
            their_one_time_pre_key: bundle.pre_key_public(),
        })?;
        state.set_pending_pre_key(PendingPreKey {
            pre_key_id: bundle.pre_key_id(),
            signed_pre_key_id: bundle.signed_pre_key_id(),
            base_key: *base_key.public_key(),
        });
        state.set_registration_ids(
            self.store.local_registration_id()?,
            bundle.registration_id(),
        );

        let mut record = self
            .store
            .load_session(&self.remote)?
            .unwrap_or_default();
        record.promote_state(state, self.config.max_archived_states);

        self.store.store_session(&self.remote, &record)?;
        self.store.save_identity(&self.remote, bundle.identity_key())?;

        let fingerprint = bundle.identity_key().fingerprint();
        info!(
            peer = %self.remote,
            pre_key_id = ?bundle.pre_key_id(),
            signed_pre_key_id = bundle.signed_pre_key_id(),
            fingerprint = %RedactedHex(&fingerprint),
            "session initialized from prekey bundle"
        );
        Ok(())
    }

    /// Install the responder state for a pre-key message into `record`.
    ///
    /// Returns the one-time prekey id to remove once the embedded message
    /// has decrypted. The caller must hold the session lock.
    pub(crate) fn process_pre_key_message(
        &self,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>> {
        check_trust(
            self.store,
            &self.remote,
            &message.identity_key,
            self.config.trust_policy,
        )?;

        if record.has_session_state(CURRENT_VERSION, &message.base_key) {
            debug!(peer = %self.remote, "pre-key message for existing session");
            return Ok(None);
        }

        let one_time = match message.pre_key_id {
            Some(id) => match self.store.load_pre_key(id)? {
                Some(record) => Some(record),
                None => {
                    warn!(peer = %self.remote, pre_key_id = id, "prekey already consumed");
                    return Err(Error::StaleKeyReference(id));
                }
            },
            None => None,
        };

        let signed = self
            .store
            .load_signed_pre_key(message.signed_pre_key_id)?
            .ok_or_else(|| {
                Error::InvalidKey(format!("no signed prekey {}", message.signed_pre_key_id))
            })?;

        let our_identity = self.store.identity_key_pair()?;
        let mut state = initialize_bob_session(&BobParameters {
            our_identity: &our_identity,
            our_signed_pre_key: signed.key_pair(),
            our_one_time_pre_key: one_time.as_ref().map(|record| record.key_pair()),
            their_identity: &message.identity_key,
            their_base_key: &message.base_key,
        })?;
        state.set_registration_ids(
            self.store.local_registration_id()?,
            message.registration_id,
        );

        record.promote_state(state, self.config.max_archived_states);

        info!(
            peer = %self.remote,
            pre_key_id = ?message.pre_key_id,
            signed_pre_key_id = message.signed_pre_key_id,
            "session initialized from pre-key message"
        );
        Ok(message.pre_key_id)
    }
}
