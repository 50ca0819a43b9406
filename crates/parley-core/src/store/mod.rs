//! Key and session storage.
//!
//! The protocol core only depends on these traits. Each party supplies its
//! own store instances; [`InMemoryProtocolStore`] and
//! [`InMemorySenderKeyStore`] are volatile reference implementations.
//!
//! ## Contract
//!
//! - Methods take `&self`; implementations lock internally and must be
//!   `Send + Sync` so one store can serve several threads
//! - `load_*` returns an independent copy; callers mutate it and write it
//!   back with `store_*`
//! - `session_lock` / `sender_key_lock` / `pre_key_lock` return the same
//!   mutex for the same key, and ciphers hold it across a whole
//!   load-mutate-store cycle
//! - Lock order is session, then prekey

mod lock;
mod memory;

pub use lock::{acquire, LockTable};
pub use memory::{InMemoryProtocolStore, InMemorySenderKeyStore};

use crate::address::{ProtocolAddress, SenderKeyName};
use crate::error::Result;
use crate::group::SenderKeyRecord;
use crate::identity::{IdentityKey, IdentityKeyPair};
use crate::prekeys::{PreKeyRecord, SignedPreKeyRecord};
use crate::ratchet::SessionRecord;
use std::sync::{Arc, Mutex};

/// The local identity and the identities trusted for peers.
pub trait IdentityKeyStore: Send + Sync {
    /// Local identity key pair.
    fn identity_key_pair(&self) -> Result<IdentityKeyPair>;

    /// Local registration id.
    fn local_registration_id(&self) -> Result<u32>;

    /// Replace the local identity.
    fn set_local_identity(&self, identity: IdentityKeyPair, registration_id: u32) -> Result<()>;

    /// Whether `identity` may be used for `address`: true when nothing is
    /// stored yet or the stored key matches.
    fn is_trusted_identity(&self, address: &ProtocolAddress, identity: &IdentityKey)
        -> Result<bool>;

    /// Trust `identity` for `address`. Returns true when a different key
    /// was replaced.
    fn save_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> Result<bool>;

    /// Stored identity for `address`.
    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>>;
}

/// One-time prekeys.
pub trait PreKeyStore: Send + Sync {
    /// Load a prekey.
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>>;

    /// Store a prekey.
    fn store_pre_key(&self, record: PreKeyRecord) -> Result<()>;

    /// Remove a consumed prekey.
    fn remove_pre_key(&self, id: u32) -> Result<()>;

    /// Whether a prekey is present.
    fn contains_pre_key(&self, id: u32) -> Result<bool>;

    /// Lock serializing consumption of one prekey id across all peers.
    ///
    /// Held from the load of a prekey until its removal, so two sessions can
    /// never be derived from the same one-time prekey.
    fn pre_key_lock(&self, id: u32) -> Arc<Mutex<()>>;
}

/// Signed prekeys.
pub trait SignedPreKeyStore: Send + Sync {
    /// Load a signed prekey.
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>>;

    /// Load all signed prekeys, ordered by id.
    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>>;

    /// Store a signed prekey.
    fn store_signed_pre_key(&self, record: SignedPreKeyRecord) -> Result<()>;

    /// Whether a signed prekey is present.
    fn contains_signed_pre_key(&self, id: u32) -> Result<bool>;

    /// Remove a signed prekey.
    fn remove_signed_pre_key(&self, id: u32) -> Result<()>;
}

/// Per-peer-device session records.
pub trait SessionStore: Send + Sync {
    /// Load the record for a peer device.
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>>;

    /// Store the record for a peer device.
    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord) -> Result<()>;

    /// Whether a usable (current) session exists.
    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool>;

    /// Delete one device's session.
    fn delete_session(&self, address: &ProtocolAddress) -> Result<()>;

    /// Delete every device session for an account name.
    fn delete_all_sessions(&self, name: &str) -> Result<()>;

    /// Device ids other than the primary device (1) that have sessions for
    /// `name`.
    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>>;

    /// Lock serializing operations on one peer device's session.
    fn session_lock(&self, address: &ProtocolAddress) -> Arc<Mutex<()>>;
}

/// Per-(group, sender) sender key records.
pub trait SenderKeyStore: Send + Sync {
    /// Load a sender key record.
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<Option<SenderKeyRecord>>;

    /// Store a sender key record.
    fn store_sender_key(&self, name: &SenderKeyName, record: &SenderKeyRecord) -> Result<()>;

    /// Lock serializing operations on one sender chain.
    fn sender_key_lock(&self, name: &SenderKeyName) -> Arc<Mutex<()>>;
}

/// Everything a pairwise session needs.
pub trait ProtocolStore: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore {}

impl<T> ProtocolStore for T where T: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore {}
