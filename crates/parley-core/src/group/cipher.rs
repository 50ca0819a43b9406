//! Sender-key encryption and decryption.

use super::state::{SenderKeyState, SenderMessageKey};
use crate::address::SenderKeyName;
use crate::config::SenderKeyConfig;
use crate::crypto::{decrypt_detached, encrypt_detached};
use crate::error::{Error, Result};
use crate::identity::SIGNATURE_SIZE;
use crate::logging::RedactedBytes;
use crate::protocol::SenderKeyMessage;
use crate::store::{acquire, SenderKeyStore};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use tracing::{debug, trace, warn};

/// Encrypts and decrypts one sender's messages in one group.
pub struct GroupCipher<'a, S: SenderKeyStore> {
    store: &'a S,
    name: SenderKeyName,
    config: SenderKeyConfig,
}

impl<'a, S: SenderKeyStore> GroupCipher<'a, S> {
    /// Create a cipher with default limits.
    pub fn new(store: &'a S, name: SenderKeyName) -> Self {
        Self::with_config(store, name, SenderKeyConfig::default())
    }

    /// Create a cipher with explicit limits.
    pub fn with_config(store: &'a S, name: SenderKeyName, config: SenderKeyConfig) -> Self {
        Self {
            store,
            name,
            config,
        }
    }

    /// Encrypt on our own chain and advance it.
    ///
    /// Fails with `NoSession` until [`GroupSessionBuilder::create`] has run
    /// for this name.
    ///
    /// [`GroupSessionBuilder::create`]: super::GroupSessionBuilder::create
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SenderKeyMessage> {
        let lock = self.store.sender_key_lock(&self.name);
        let _guard = acquire(&lock);

        let mut record = self
            .store
            .load_sender_key(&self.name)?
            .ok_or_else(|| Error::NoSession(self.name.to_string()))?;
        let mut state = record
            .newest_state()
            .cloned()
            .ok_or_else(|| Error::NoSession(self.name.to_string()))?;
        let signing_key = match state.signing_private() {
            Some(private) => SigningKey::from_bytes(private),
            None => {
                return Err(Error::InvalidKey(
                    "sender key has no private signing key".into(),
                ))
            }
        };

        let message_key = state.chain_key().message_key()?;
        let aad = associated_data(state.key_id(), message_key.iteration());
        let (body, tag) = encrypt_detached(
            message_key.cipher_key(),
            &message_key.nonce(),
            plaintext,
            &aad,
        )?;

        let mut message = SenderKeyMessage {
            key_id: state.key_id(),
            iteration: message_key.iteration(),
            body,
            tag,
            signature: [0u8; SIGNATURE_SIZE],
        };
        message.signature = signing_key.sign(&message.signed_bytes()?).to_bytes();

        state.set_chain_key(state.chain_key().next()?);
        record.update_state(state);
        self.store.store_sender_key(&self.name, &record)?;

        trace!(
            sender_key = %self.name,
            iteration = message.iteration,
            plaintext = %RedactedBytes(plaintext),
            "group encrypted"
        );
        Ok(message)
    }

    /// Verify and decrypt a message from the sender named by this cipher.
    ///
    /// Iterations behind the chain decrypt only from the skipped-key cache,
    /// so each message decrypts at most once.
    pub fn decrypt(&self, message: &SenderKeyMessage) -> Result<Vec<u8>> {
        let lock = self.store.sender_key_lock(&self.name);
        let _guard = acquire(&lock);

        let mut record = self
            .store
            .load_sender_key(&self.name)?
            .filter(|record| !record.is_empty())
            .ok_or_else(|| Error::NoSession(self.name.to_string()))?;
        let mut state = record
            .state_for_key_id(message.key_id)
            .cloned()
            .ok_or_else(|| {
                Error::NoSession(format!("{} key id {}", self.name, message.key_id))
            })?;

        let verifying_key = VerifyingKey::from_bytes(state.signing_public())
            .map_err(|_| Error::InvalidKey("invalid sender signing key".into()))?;
        let signature = Signature::from_bytes(&message.signature);
        if verifying_key
            .verify_strict(&message.signed_bytes()?, &signature)
            .is_err()
        {
            warn!(sender_key = %self.name, iteration = message.iteration, "bad group signature");
            return Err(Error::InvalidMessage("signature verification failed".into()));
        }

        let message_key = self.sender_message_key(&mut state, message.iteration)?;
        let aad = associated_data(message.key_id, message.iteration);
        let plaintext = decrypt_detached(
            message_key.cipher_key(),
            &message_key.nonce(),
            &message.body,
            &message.tag,
            &aad,
        )?;

        record.update_state(state);
        self.store.store_sender_key(&self.name, &record)?;
        Ok(plaintext)
    }

    /// Parse a SENDERKEY frame and decrypt it.
    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.decrypt(&SenderKeyMessage::from_bytes(bytes)?)
    }

    /// Key for `iteration`, from the cache if the chain is already past it,
    /// otherwise by advancing the chain and caching skipped keys.
    fn sender_message_key(
        &self,
        state: &mut SenderKeyState,
        iteration: u32,
    ) -> Result<SenderMessageKey> {
        let current = state.chain_key().iteration();

        if current > iteration {
            return state.take_message_key(iteration).ok_or_else(|| {
                Error::DuplicateMessage(format!("iteration {}", iteration))
            });
        }

        if iteration - current > self.config.max_skip {
            return Err(Error::DuplicateMessage(format!(
                "iteration {} outside skip window",
                iteration
            )));
        }

        let mut chain_key = state.chain_key().clone();
        while chain_key.iteration() < iteration {
            state.add_message_key(chain_key.message_key()?, self.config.max_message_keys);
            chain_key = chain_key.next()?;
        }
        if iteration > current {
            debug!(sender_key = %self.name, skipped = iteration - current, "advanced sender chain");
        }

        let message_key = chain_key.message_key()?;
        state.set_chain_key(chain_key.next()?);
        Ok(message_key)
    }
}

/// `key_id || iteration`, both big-endian.
fn associated_data(key_id: u32, iteration: u32) -> [u8; 8] {
    let mut aad = [0u8; 8];
    aad[..4].copy_from_slice(&key_id.to_be_bytes());
    aad[4..].copy_from_slice(&iteration.to_be_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ProtocolAddress;
    use crate::group::GroupSessionBuilder;
    use crate::store::InMemorySenderKeyStore;

    fn name() -> SenderKeyName {
        SenderKeyName::new("group", ProtocolAddress::new("charlie", 1))
    }

    fn pair() -> (InMemorySenderKeyStore, InMemorySenderKeyStore) {
        let sender = InMemorySenderKeyStore::new();
        let receiver = InMemorySenderKeyStore::new();
        let distribution = GroupSessionBuilder::new(&sender).create(&name()).expect("create");
        GroupSessionBuilder::new(&receiver)
            .process(&name(), &distribution)
            .expect("process");
        (sender, receiver)
    }

    #[test]
    fn test_group_roundtrip() {
        let (sender, receiver) = pair();
        let message = GroupCipher::new(&sender, name()).encrypt(b"hello").expect("encrypt");
        let bytes = message.to_bytes().expect("encode");

        let plaintext = GroupCipher::new(&receiver, name())
            .decrypt_bytes(&bytes)
            .expect("decrypt");
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_out_of_order_then_replay() {
        let (sender, receiver) = pair();
        let cipher = GroupCipher::new(&sender, name());
        let first = cipher.encrypt(b"one").expect("encrypt");
        let second = cipher.encrypt(b"two").expect("encrypt");

        let receiving = GroupCipher::new(&receiver, name());
        assert_eq!(receiving.decrypt(&second).expect("second"), b"two");
        assert_eq!(receiving.decrypt(&first).expect("first"), b"one");
        assert!(matches!(
            receiving.decrypt(&first),
            Err(Error::DuplicateMessage(_))
        ));
    }

    #[test]
    fn test_receiver_cannot_encrypt() {
        let (_, receiver) = pair();
        assert!(matches!(
            GroupCipher::new(&receiver, name()).encrypt(b"x"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_forged_signature_rejected() {
        let (sender, receiver) = pair();
        let mut message = GroupCipher::new(&sender, name()).encrypt(b"hello").expect("encrypt");
        message.signature[0] ^= 0x01;

        assert!(matches!(
            GroupCipher::new(&receiver, name()).decrypt(&message),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_skip_window() {
        let (sender, receiver) = pair();
        let config = SenderKeyConfig {
            max_skip: 2,
            ..SenderKeyConfig::default()
        };
        let cipher = GroupCipher::new(&sender, name());
        let mut last = None;
        for _ in 0..4 {
            last = Some(cipher.encrypt(b"m").expect("encrypt"));
        }

        let receiving = GroupCipher::with_config(&receiver, name(), config);
        assert!(matches!(
            receiving.decrypt(&last.expect("message")),
            Err(Error::DuplicateMessage(_))
        ));
    }

    #[test]
    fn test_unknown_sender() {
        let store = InMemorySenderKeyStore::new();
        let (sender, _) = pair();
        let message = GroupCipher::new(&sender, name()).encrypt(b"x").expect("encrypt");

        assert!(matches!(
            GroupCipher::new(&store, name()).decrypt(&message),
            Err(Error::NoSession(_))
        ));
    }
}
