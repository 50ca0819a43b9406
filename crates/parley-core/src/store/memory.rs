//! Volatile in-memory stores.
//!
//! Session and sender-key records are kept serialized, so every load hands
//! out a fresh copy and a caller can never mutate stored state by accident.

use super::lock::LockTable;
use super::{IdentityKeyStore, PreKeyStore, SenderKeyStore, SessionStore, SignedPreKeyStore};
use crate::address::{ProtocolAddress, SenderKeyName};
use crate::error::{Error, Result};
use crate::group::SenderKeyRecord;
use crate::identity::{IdentityKey, IdentityKeyPair};
use crate::prekeys::{PreKeyRecord, SignedPreKeyRecord};
use crate::ratchet::SessionRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Primary device id, excluded from `sub_device_sessions`.
const PRIMARY_DEVICE_ID: u32 = 1;

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Storage("store lock poisoned".into()))
}

struct LocalIdentity {
    key_pair: IdentityKeyPair,
    registration_id: u32,
}

/// In-memory identity, prekey, signed prekey and session store for one
/// party.
pub struct InMemoryProtocolStore {
    local: Mutex<LocalIdentity>,
    trusted: Mutex<HashMap<ProtocolAddress, IdentityKey>>,
    pre_keys: Mutex<HashMap<u32, PreKeyRecord>>,
    signed_pre_keys: Mutex<BTreeMap<u32, SignedPreKeyRecord>>,
    sessions: Mutex<HashMap<ProtocolAddress, Vec<u8>>>,
    session_locks: LockTable<ProtocolAddress>,
    pre_key_locks: LockTable<u32>,
}

impl InMemoryProtocolStore {
    /// Create a store for a party with the given identity.
    pub fn new(identity: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            local: Mutex::new(LocalIdentity {
                key_pair: identity,
                registration_id,
            }),
            trusted: Mutex::new(HashMap::new()),
            pre_keys: Mutex::new(HashMap::new()),
            signed_pre_keys: Mutex::new(BTreeMap::new()),
            sessions: Mutex::new(HashMap::new()),
            session_locks: LockTable::new(),
            pre_key_locks: LockTable::new(),
        }
    }
}

impl IdentityKeyStore for InMemoryProtocolStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair> {
        Ok(guard(&self.local)?.key_pair.clone())
    }

    fn local_registration_id(&self) -> Result<u32> {
        Ok(guard(&self.local)?.registration_id)
    }

    fn set_local_identity(&self, identity: IdentityKeyPair, registration_id: u32) -> Result<()> {
        let mut local = guard(&self.local)?;
        local.key_pair = identity;
        local.registration_id = registration_id;
        Ok(())
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool> {
        Ok(guard(&self.trusted)?
            .get(address)
            .map_or(true, |stored| stored == identity))
    }

    fn save_identity(&self, address: &ProtocolAddress, identity: &IdentityKey) -> Result<bool> {
        let previous = guard(&self.trusted)?.insert(address.clone(), *identity);
        let replaced = previous.map_or(false, |old| old != *identity);
        if replaced {
            warn!(peer = %address, "replaced trusted identity");
        }
        Ok(replaced)
    }

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>> {
        Ok(guard(&self.trusted)?.get(address).copied())
    }
}

impl PreKeyStore for InMemoryProtocolStore {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>> {
        Ok(guard(&self.pre_keys)?.get(&id).cloned())
    }

    fn store_pre_key(&self, record: PreKeyRecord) -> Result<()> {
        guard(&self.pre_keys)?.insert(record.id(), record);
        Ok(())
    }

    fn remove_pre_key(&self, id: u32) -> Result<()> {
        guard(&self.pre_keys)?.remove(&id);
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool> {
        Ok(guard(&self.pre_keys)?.contains_key(&id))
    }

    fn pre_key_lock(&self, id: u32) -> Arc<Mutex<()>> {
        self.pre_key_locks.lock_for(&id)
    }
}

impl SignedPreKeyStore for InMemoryProtocolStore {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>> {
        Ok(guard(&self.signed_pre_keys)?.get(&id).cloned())
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>> {
        Ok(guard(&self.signed_pre_keys)?.values().cloned().collect())
    }

    fn store_signed_pre_key(&self, record: SignedPreKeyRecord) -> Result<()> {
        guard(&self.signed_pre_keys)?.insert(record.id(), record);
        Ok(())
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool> {
        Ok(guard(&self.signed_pre_keys)?.contains_key(&id))
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<()> {
        guard(&self.signed_pre_keys)?.remove(&id);
        Ok(())
    }
}

impl SessionStore for InMemoryProtocolStore {
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>> {
        guard(&self.sessions)?
            .get(address)
            .map(|bytes| SessionRecord::from_bytes(bytes))
            .transpose()
    }

    fn store_session(&self, address: &ProtocolAddress, record: &SessionRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        guard(&self.sessions)?.insert(address.clone(), bytes);
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool> {
        Ok(self
            .load_session(address)?
            .map_or(false, |record| record.has_current_state()))
    }

    fn delete_session(&self, address: &ProtocolAddress) -> Result<()> {
        if guard(&self.sessions)?.remove(address).is_some() {
            debug!(peer = %address, "deleted session");
        }
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<()> {
        guard(&self.sessions)?.retain(|address, _| address.name() != name);
        Ok(())
    }

    fn sub_device_sessions(&self, name: &str) -> Result<Vec<u32>> {
        let mut devices: Vec<u32> = guard(&self.sessions)?
            .keys()
            .filter(|address| address.name() == name && address.device_id() != PRIMARY_DEVICE_ID)
            .map(ProtocolAddress::device_id)
            .collect();
        devices.sort_unstable();
        Ok(devices)
    }

    fn session_lock(&self, address: &ProtocolAddress) -> Arc<Mutex<()>> {
        self.session_locks.lock_for(address)
    }
}

/// In-memory sender key store for one party.
#[derive(Default)]
pub struct InMemorySenderKeyStore {
    records: Mutex<HashMap<SenderKeyName, Vec<u8>>>,
    locks: LockTable<SenderKeyName>,
}

impl InMemorySenderKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SenderKeyStore for InMemorySenderKeyStore {
    fn load_sender_key(&self, name: &SenderKeyName) -> Result<Option<SenderKeyRecord>> {
        guard(&self.records)?
            .get(name)
            .map(|bytes| SenderKeyRecord::from_bytes(bytes))
            .transpose()
    }

    fn store_sender_key(&self, name: &SenderKeyName, record: &SenderKeyRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        guard(&self.records)?.insert(name.clone(), bytes);
        Ok(())
    }

    fn sender_key_lock(&self, name: &SenderKeyName) -> Arc<Mutex<()>> {
        self.locks.lock_for(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{generate_identity_key_pair, generate_registration_id};
    use crate::prekeys::{generate_pre_keys, generate_signed_pre_key};

    fn store() -> InMemoryProtocolStore {
        InMemoryProtocolStore::new(generate_identity_key_pair(), generate_registration_id())
    }

    #[test]
    fn test_trust_on_first_use() {
        let store = store();
        let bob = ProtocolAddress::new("bob", 1);
        let key = generate_identity_key_pair().public_key();
        let other = generate_identity_key_pair().public_key();

        assert!(store.is_trusted_identity(&bob, &key).expect("trust check"));
        assert!(!store.save_identity(&bob, &key).expect("save"));
        assert!(store.is_trusted_identity(&bob, &key).expect("trust check"));
        assert!(!store.is_trusted_identity(&bob, &other).expect("trust check"));

        assert!(store.save_identity(&bob, &other).expect("save"));
        assert_eq!(store.identity(&bob).expect("load"), Some(other));
    }

    #[test]
    fn test_pre_key_lifecycle() {
        let store = store();
        for record in generate_pre_keys(0, 3) {
            store.store_pre_key(record).expect("store");
        }

        assert!(store.contains_pre_key(2).expect("contains"));
        assert_eq!(store.load_pre_key(2).expect("load").map(|r| r.id()), Some(2));

        store.remove_pre_key(2).expect("remove");
        assert!(!store.contains_pre_key(2).expect("contains"));
        assert!(store.load_pre_key(2).expect("load").is_none());
    }

    #[test]
    fn test_signed_pre_keys_ordered() {
        let store = store();
        let identity = store.identity_key_pair().expect("identity");
        for id in [9, 3, 5] {
            store
                .store_signed_pre_key(generate_signed_pre_key(&identity, id))
                .expect("store");
        }

        let ids: Vec<u32> = store
            .load_signed_pre_keys()
            .expect("load")
            .iter()
            .map(SignedPreKeyRecord::id)
            .collect();
        assert_eq!(ids, vec![3, 5, 9]);

        store.remove_signed_pre_key(5).expect("remove");
        assert!(!store.contains_signed_pre_key(5).expect("contains"));
    }

    #[test]
    fn test_session_enumeration_and_deletion() {
        let store = store();
        let record = SessionRecord::new_fresh();
        for device in [1, 2, 3] {
            store
                .store_session(&ProtocolAddress::new("bob", device), &record)
                .expect("store");
        }
        store
            .store_session(&ProtocolAddress::new("carol", 2), &record)
            .expect("store");

        assert_eq!(store.sub_device_sessions("bob").expect("list"), vec![2, 3]);

        // Records without a current state are not usable sessions.
        assert!(!store
            .contains_session(&ProtocolAddress::new("bob", 1))
            .expect("contains"));

        store
            .delete_session(&ProtocolAddress::new("bob", 3))
            .expect("delete");
        assert_eq!(store.sub_device_sessions("bob").expect("list"), vec![2]);

        store.delete_all_sessions("bob").expect("delete all");
        assert!(store.sub_device_sessions("bob").expect("list").is_empty());
        assert!(store
            .load_session(&ProtocolAddress::new("carol", 2))
            .expect("load")
            .is_some());
    }

    #[test]
    fn test_session_lock_shared_per_address() {
        let store = store();
        let bob = ProtocolAddress::new("bob", 1);
        let a = store.session_lock(&bob);
        let b = store.session_lock(&bob);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pre_key_lock_shared_per_id() {
        let store = store();
        let a = store.pre_key_lock(77);
        let b = store.pre_key_lock(77);
        let other = store.pre_key_lock(78);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_local_identity_replaced() {
        let store = store();
        let replacement = generate_identity_key_pair();
        store
            .set_local_identity(replacement.clone(), 42)
            .expect("set");

        assert_eq!(store.local_registration_id().expect("reg id"), 42);
        assert_eq!(
            store.identity_key_pair().expect("identity").public_key(),
            replacement.public_key()
        );
    }
}
