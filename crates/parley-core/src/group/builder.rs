//! Creation and installation of sender key chains.

use super::state::{SenderChainKey, SenderKeyState};
use crate::address::SenderKeyName;
use crate::config::SenderKeyConfig;
use crate::crypto::random_bytes;
use crate::error::{Error, Result};
use crate::logging::Redacted;
use crate::protocol::{CiphertextMessage, SenderKeyDistributionMessage};
use crate::session::SessionCipher;
use crate::store::{acquire, ProtocolStore, SenderKeyStore};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Key ids are 31-bit.
const KEY_ID_MASK: u32 = 0x7FFF_FFFF;

/// Creates and processes sender key distribution messages.
pub struct GroupSessionBuilder<'a, S: SenderKeyStore> {
    store: &'a S,
    config: SenderKeyConfig,
}

impl<'a, S: SenderKeyStore> GroupSessionBuilder<'a, S> {
    /// Create a builder with default limits.
    pub fn new(store: &'a S) -> Self {
        Self::with_config(store, SenderKeyConfig::default())
    }

    /// Create a builder with explicit limits.
    pub fn with_config(store: &'a S, config: SenderKeyConfig) -> Self {
        Self { store, config }
    }

    /// Distribution message for our own chain in `name`, creating the chain
    /// on first use.
    ///
    /// Re-emitting after messages were sent hands out the current position,
    /// so new members cannot read earlier messages.
    pub fn create(&self, name: &SenderKeyName) -> Result<SenderKeyDistributionMessage> {
        let lock = self.store.sender_key_lock(name);
        let _guard = acquire(&lock);

        let mut record = self.store.load_sender_key(name)?.unwrap_or_default();

        if record.is_empty() {
            let key_id = OsRng.gen::<u32>() & KEY_ID_MASK;
            let signing_key = SigningKey::generate(&mut OsRng);
            let state = SenderKeyState::new(
                key_id,
                SenderChainKey::new(0, random_bytes()),
                signing_key.verifying_key().to_bytes(),
                Some(signing_key.to_bytes()),
            );
            record.add_state(state, self.config.max_states);
            self.store.store_sender_key(name, &record)?;
            info!(sender_key = %name, key_id, "created sender key");
        }

        let state = record
            .newest_state()
            .ok_or_else(|| Error::NoSession(name.to_string()))?;
        Ok(SenderKeyDistributionMessage {
            key_id: state.key_id(),
            iteration: state.chain_key().iteration(),
            chain_key: *state.chain_key().seed(),
            signing_key: *state.signing_public(),
        })
    }

    /// Install a sender's chain from its distribution message.
    ///
    /// A message for a chain we already hold at a later position is ignored,
    /// so a stale or replayed distribution never rewinds the chain.
    pub fn process(&self, name: &SenderKeyName, message: &SenderKeyDistributionMessage) -> Result<()> {
        VerifyingKey::from_bytes(&message.signing_key)
            .map_err(|_| Error::InvalidKey("invalid sender signing key".into()))?;

        let lock = self.store.sender_key_lock(name);
        let _guard = acquire(&lock);

        let mut record = self.store.load_sender_key(name)?.unwrap_or_default();

        if let Some(existing) = record.state_for_key_id(message.key_id) {
            if existing.signing_public() == &message.signing_key
                && existing.chain_key().iteration() >= message.iteration
            {
                debug!(
                    sender_key = %name,
                    key_id = message.key_id,
                    iteration = message.iteration,
                    "ignoring stale sender key distribution"
                );
                return Ok(());
            }
        }

        let state = SenderKeyState::new(
            message.key_id,
            SenderChainKey::new(message.iteration, message.chain_key),
            message.signing_key,
            None,
        );
        record.add_state(state, self.config.max_states);
        self.store.store_sender_key(name, &record)?;

        info!(
            sender_key = %name,
            key_id = message.key_id,
            iteration = message.iteration,
            chain_key = %Redacted(&message.chain_key),
            "installed sender key"
        );
        Ok(())
    }

    /// [`Self::create`], encrypted for one member over an established
    /// pairwise session.
    pub fn create_sealed<P: ProtocolStore>(
        &self,
        name: &SenderKeyName,
        cipher: &SessionCipher<'_, P>,
    ) -> Result<CiphertextMessage> {
        let distribution = self.create(name)?;
        let bytes = Zeroizing::new(distribution.to_bytes()?);
        cipher.encrypt(&bytes)
    }

    /// [`Self::process`] for a distribution that arrived over the pairwise
    /// session with the sender named in `name`.
    ///
    /// The pairwise session authenticates the distribution: it is rejected
    /// unless `cipher` talks to that sender.
    pub fn process_sealed<P: ProtocolStore>(
        &self,
        name: &SenderKeyName,
        cipher: &SessionCipher<'_, P>,
        message: &CiphertextMessage,
    ) -> Result<()> {
        if cipher.remote_address() != name.sender() {
            warn!(
                sender_key = %name,
                peer = %cipher.remote_address(),
                "sealed distribution from a different peer"
            );
            return Err(Error::InvalidMessage(
                "distribution sender does not match session peer".into(),
            ));
        }

        let plaintext = Zeroizing::new(cipher.decrypt(message)?);
        let distribution = SenderKeyDistributionMessage::from_bytes(&plaintext)?;
        self.process(name, &distribution)
    }
}
