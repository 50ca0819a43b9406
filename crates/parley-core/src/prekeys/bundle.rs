//! Publishable prekey bundles.

use crate::crypto::{serde_bytes, X25519PublicKey};
use crate::error::{Error, Result};
use crate::identity::{IdentityKey, SIGNATURE_SIZE};
use crate::protocol::{decode, encode, MessageType};
use crate::store::{IdentityKeyStore, PreKeyStore, SignedPreKeyStore};
use serde::{Deserialize, Serialize};

/// Everything a peer needs to start a session with this device while it is
/// offline.
///
/// The one-time prekey is optional: once a device runs out, it can still
/// publish a bundle and key agreement falls back to three DH products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    registration_id: u32,
    device_id: u32,
    pre_key: Option<(u32, X25519PublicKey)>,
    signed_pre_key_id: u32,
    signed_pre_key_public: X25519PublicKey,
    #[serde(with = "serde_bytes")]
    signed_pre_key_signature: [u8; SIGNATURE_SIZE],
    identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Assemble a bundle.
    pub fn new(
        registration_id: u32,
        device_id: u32,
        pre_key: Option<(u32, X25519PublicKey)>,
        signed_pre_key_id: u32,
        signed_pre_key_public: X25519PublicKey,
        signed_pre_key_signature: [u8; SIGNATURE_SIZE],
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            pre_key,
            signed_pre_key_id,
            signed_pre_key_public,
            signed_pre_key_signature,
            identity_key,
        }
    }

    /// Build a bundle from a party's own stores.
    ///
    /// Fails with `InvalidKey` if either referenced prekey is missing.
    pub fn from_store<S>(
        store: &S,
        device_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
    ) -> Result<Self>
    where
        S: IdentityKeyStore + PreKeyStore + SignedPreKeyStore,
    {
        let pre_key = match pre_key_id {
            Some(id) => {
                let record = store
                    .load_pre_key(id)?
                    .ok_or_else(|| Error::InvalidKey(format!("no prekey {}", id)))?;
                Some((id, *record.key_pair().public_key()))
            }
            None => None,
        };

        let signed = store
            .load_signed_pre_key(signed_pre_key_id)?
            .ok_or_else(|| Error::InvalidKey(format!("no signed prekey {}", signed_pre_key_id)))?;

        Ok(Self {
            registration_id: store.local_registration_id()?,
            device_id,
            pre_key,
            signed_pre_key_id,
            signed_pre_key_public: *signed.key_pair().public_key(),
            signed_pre_key_signature: *signed.signature(),
            identity_key: store.identity_key_pair()?.public_key(),
        })
    }

    /// Check the signed prekey signature against the bundle identity.
    pub fn verify_signature(&self) -> Result<()> {
        self.identity_key.verify_signature(
            self.signed_pre_key_public.as_bytes(),
            &self.signed_pre_key_signature,
        )
    }

    /// Registration id of the publishing device.
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// Device id of the publishing device.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// One-time prekey id, if present.
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key.map(|(id, _)| id)
    }

    /// One-time prekey public key, if present.
    pub fn pre_key_public(&self) -> Option<&X25519PublicKey> {
        self.pre_key.as_ref().map(|(_, key)| key)
    }

    /// Signed prekey id.
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Signed prekey public key.
    pub fn signed_pre_key_public(&self) -> &X25519PublicKey {
        &self.signed_pre_key_public
    }

    /// Identity signature over the signed prekey.
    pub fn signed_pre_key_signature(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.signed_pre_key_signature
    }

    /// Identity of the publishing party.
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Serialize to a BUNDLE frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(MessageType::Bundle, self)
    }

    /// Parse a BUNDLE frame.
    ///
    /// Parsing does not verify the signature; `SessionBuilder` does that
    /// before using the bundle.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes, MessageType::Bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{generate_identity_key_pair, generate_registration_id};
    use crate::prekeys::{generate_pre_keys, generate_signed_pre_key};
    use crate::store::InMemoryProtocolStore;

    fn published_store() -> InMemoryProtocolStore {
        let identity = generate_identity_key_pair();
        let store = InMemoryProtocolStore::new(identity.clone(), generate_registration_id());
        for record in generate_pre_keys(0, 2) {
            store.store_pre_key(record).expect("store prekey");
        }
        store
            .store_signed_pre_key(generate_signed_pre_key(&identity, 5))
            .expect("store signed prekey");
        store
    }

    #[test]
    fn test_from_store() {
        let store = published_store();
        let bundle = PreKeyBundle::from_store(&store, 1, Some(1), 5).expect("bundle");

        assert_eq!(bundle.pre_key_id(), Some(1));
        assert_eq!(bundle.signed_pre_key_id(), 5);
        assert_eq!(
            bundle.registration_id(),
            store.local_registration_id().expect("reg id")
        );
        bundle.verify_signature().expect("signature should verify");

        let parsed = PreKeyBundle::from_bytes(&bundle.to_bytes().expect("encode")).expect("decode");
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn test_from_store_missing_keys() {
        let store = published_store();
        assert!(matches!(
            PreKeyBundle::from_store(&store, 1, Some(99), 5),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            PreKeyBundle::from_store(&store, 1, None, 6),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_forged_signature_rejected() {
        let store = published_store();
        let bundle = PreKeyBundle::from_store(&store, 1, None, 5).expect("bundle");

        let forged = PreKeyBundle::new(
            bundle.registration_id(),
            bundle.device_id(),
            None,
            bundle.signed_pre_key_id(),
            X25519PublicKey::from_bytes([9u8; 32]),
            *bundle.signed_pre_key_signature(),
            *bundle.identity_key(),
        );
        assert!(matches!(forged.verify_signature(), Err(Error::InvalidKey(_))));
    }
}
