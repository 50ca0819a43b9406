//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use parley_core::crypto::KeyPair;
use parley_core::identity::{generate_identity_key_pair, generate_registration_id};
use parley_core::prekeys::{generate_signed_pre_key, PreKeyBundle, PreKeyRecord};
use parley_core::{
    CiphertextMessage, IdentityKeyStore, InMemoryProtocolStore, InMemorySenderKeyStore,
    PreKeyStore, ProtocolAddress, SessionBuilder, SessionCipher, SignedPreKeyStore,
};
use tracing_subscriber::EnvFilter;

/// Signed prekey id every party publishes first.
pub const SIGNED_PRE_KEY_ID: u32 = 1;

/// Route library logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One device with its own stores.
pub struct Party {
    pub address: ProtocolAddress,
    pub store: InMemoryProtocolStore,
    pub sender_keys: InMemorySenderKeyStore,
}

impl Party {
    pub fn new(name: &str) -> Self {
        Self::with_device(name, 1)
    }

    pub fn with_device(name: &str, device_id: u32) -> Self {
        let store =
            InMemoryProtocolStore::new(generate_identity_key_pair(), generate_registration_id());
        Self {
            address: ProtocolAddress::new(name, device_id),
            store,
            sender_keys: InMemorySenderKeyStore::new(),
        }
    }

    /// Store a signed prekey (once) and optionally a one-time prekey, and
    /// return the resulting bundle.
    pub fn publish(&self, pre_key_id: Option<u32>) -> PreKeyBundle {
        if !self
            .store
            .contains_signed_pre_key(SIGNED_PRE_KEY_ID)
            .expect("signed prekey lookup")
        {
            let identity = self.store.identity_key_pair().expect("identity");
            self.store
                .store_signed_pre_key(generate_signed_pre_key(&identity, SIGNED_PRE_KEY_ID))
                .expect("store signed prekey");
        }
        if let Some(id) = pre_key_id {
            self.store
                .store_pre_key(PreKeyRecord::new(id, KeyPair::generate()))
                .expect("store prekey");
        }

        PreKeyBundle::from_store(
            &self.store,
            self.address.device_id(),
            pre_key_id,
            SIGNED_PRE_KEY_ID,
        )
        .expect("bundle")
    }

    pub fn cipher_for(&self, peer: &Party) -> SessionCipher<'_, InMemoryProtocolStore> {
        SessionCipher::new(&self.store, peer.address.clone())
    }

    pub fn builder_for(&self, peer: &Party) -> SessionBuilder<'_, InMemoryProtocolStore> {
        SessionBuilder::new(&self.store, peer.address.clone())
    }
}

/// Run the bootstrap so both sides hold an established session.
pub fn establish(alice: &Party, bob: &Party) {
    alice
        .builder_for(bob)
        .process_pre_key_bundle(&bob.publish(Some(31337)))
        .expect("process bundle");

    let hello = alice.cipher_for(bob).encrypt(b"hello").expect("encrypt");
    bob.cipher_for(alice).decrypt(&hello).expect("decrypt hello");

    let reply = bob.cipher_for(alice).encrypt(b"reply").expect("encrypt reply");
    alice.cipher_for(bob).decrypt(&reply).expect("decrypt reply");
}

/// Counter of the ratchet message inside `message`.
pub fn counter(message: &CiphertextMessage) -> u32 {
    match message {
        CiphertextMessage::Whisper(message) => message.counter,
        CiphertextMessage::PreKey(message) => message.message.counter,
    }
}
