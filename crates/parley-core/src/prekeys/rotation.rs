//! Signed prekey rotation.
//!
//! A signed prekey is replaced every `rotation_period`. Replaced keys stay in
//! the store for `overlap_period` so bundles fetched before the rotation can
//! still start sessions, and at most `max_retained_keys` of them are kept.

use super::{now_millis, SignedPreKeyRecord, MAX_PRE_KEY_ID};
use crate::config::RotationConfig;
use crate::error::Result;
use crate::store::{IdentityKeyStore, SignedPreKeyStore};
use std::collections::HashSet;
use tracing::{debug, info};

/// Rotation schedule for a party's signed prekeys.
#[derive(Debug, Clone, Default)]
pub struct SignedPreKeyRotation {
    config: RotationConfig,
}

impl SignedPreKeyRotation {
    /// Create a rotation schedule.
    pub fn new(config: RotationConfig) -> Self {
        Self { config }
    }

    /// Whether the newest signed prekey in `store` is due for replacement at
    /// `now` (Unix milliseconds). True when there is none.
    pub fn needs_rotation<S: SignedPreKeyStore>(&self, store: &S, now: u64) -> Result<bool> {
        let newest = store
            .load_signed_pre_keys()?
            .iter()
            .map(SignedPreKeyRecord::timestamp)
            .max();

        Ok(match newest {
            Some(created) => now >= created.saturating_add(millis(self.config.rotation_period)),
            None => true,
        })
    }

    /// Rotate if due at the current time. Returns the new key, if any.
    pub fn rotate_if_needed<S>(&self, store: &S) -> Result<Option<SignedPreKeyRecord>>
    where
        S: IdentityKeyStore + SignedPreKeyStore,
    {
        let now = now_millis();
        if self.needs_rotation(store, now)? {
            self.rotate(store, now).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Generate, sign and store a new signed prekey stamped `now`, then
    /// prune replaced keys.
    pub fn rotate<S>(&self, store: &S, now: u64) -> Result<SignedPreKeyRecord>
    where
        S: IdentityKeyStore + SignedPreKeyStore,
    {
        let existing = store.load_signed_pre_keys()?;
        let id = next_id(&existing);

        let identity = store.identity_key_pair()?;
        let record = SignedPreKeyRecord::generate(&identity, id, now);
        store.store_signed_pre_key(record.clone())?;
        info!(signed_pre_key_id = id, "rotated signed prekey");

        self.prune(store, id, now)?;
        Ok(record)
    }

    /// Remove replaced signed prekeys outside the overlap window, keeping at
    /// most `max_retained_keys` besides `current_id`. Returns removed ids.
    pub fn prune<S: SignedPreKeyStore>(&self, store: &S, current_id: u32, now: u64) -> Result<Vec<u32>> {
        let lifetime = millis(self.config.rotation_period)
            .saturating_add(millis(self.config.overlap_period));

        let mut replaced: Vec<SignedPreKeyRecord> = store
            .load_signed_pre_keys()?
            .into_iter()
            .filter(|record| record.id() != current_id)
            .collect();
        // Newest first
        replaced.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

        let mut removed = Vec::new();
        for (index, record) in replaced.iter().enumerate() {
            let expired = now >= record.timestamp().saturating_add(lifetime);
            if expired || index >= self.config.max_retained_keys {
                store.remove_signed_pre_key(record.id())?;
                removed.push(record.id());
            }
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned signed prekeys");
        }
        Ok(removed)
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Id after the newest key, skipping ids still held by retained keys.
fn next_id(existing: &[SignedPreKeyRecord]) -> u32 {
    let mut id = existing
        .iter()
        .max_by_key(|record| (record.timestamp(), record.id()))
        .map_or(0, SignedPreKeyRecord::id);
    let taken: HashSet<u32> = existing.iter().map(SignedPreKeyRecord::id).collect();

    for _ in 0..=existing.len() {
        id = (id % (MAX_PRE_KEY_ID - 1)) + 1;
        if !taken.contains(&id) {
            break;
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{generate_identity_key_pair, generate_registration_id};
    use crate::store::InMemoryProtocolStore;
    use std::time::Duration;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn store() -> InMemoryProtocolStore {
        InMemoryProtocolStore::new(generate_identity_key_pair(), generate_registration_id())
    }

    fn rotation() -> SignedPreKeyRotation {
        SignedPreKeyRotation::new(RotationConfig {
            rotation_period: Duration::from_millis(7 * DAY),
            overlap_period: Duration::from_millis(30 * DAY),
            max_retained_keys: 3,
        })
    }

    #[test]
    fn test_needs_rotation() {
        let store = store();
        let rotation = rotation();
        assert!(rotation.needs_rotation(&store, 0).expect("check"));

        rotation.rotate(&store, 1_000).expect("rotate");
        assert!(!rotation.needs_rotation(&store, 1_000 + DAY).expect("check"));
        assert!(rotation.needs_rotation(&store, 1_000 + 7 * DAY).expect("check"));
    }

    #[test]
    fn test_rotation_ids_increase() {
        let store = store();
        let rotation = rotation();
        let first = rotation.rotate(&store, 0).expect("rotate");
        let second = rotation.rotate(&store, 7 * DAY).expect("rotate");

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        // Replaced key is kept for late bootstraps.
        assert!(store.contains_signed_pre_key(1).expect("contains"));
    }

    #[test]
    fn test_overlap_window_expires() {
        let store = store();
        let rotation = rotation();
        rotation.rotate(&store, 0).expect("rotate");

        // 7 days of use plus 30 days overlap.
        let current = rotation.rotate(&store, 36 * DAY).expect("rotate");
        assert!(store.contains_signed_pre_key(1).expect("contains"));

        let removed = rotation.prune(&store, current.id(), 37 * DAY).expect("prune");
        assert_eq!(removed, vec![1]);
        assert!(!store.contains_signed_pre_key(1).expect("contains"));
        assert!(store.contains_signed_pre_key(current.id()).expect("contains"));
    }

    #[test]
    fn test_max_retained_keys() {
        let store = store();
        let rotation = rotation();
        for i in 0..6 {
            rotation.rotate(&store, i * DAY).expect("rotate");
        }

        // Current key plus three replaced ones, newest retained.
        let ids: Vec<u32> = store
            .load_signed_pre_keys()
            .expect("load")
            .iter()
            .map(SignedPreKeyRecord::id)
            .collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_rotation_skips_retained_ids() {
        let store = store();
        let rotation = rotation();
        let identity = store.identity_key_pair().expect("identity");

        // Ids wrapped: the newest key sits at the top of the range while an
        // older key still holds id 1.
        let old = SignedPreKeyRecord::generate(&identity, 1, 0);
        let newest = SignedPreKeyRecord::generate(&identity, MAX_PRE_KEY_ID - 1, DAY);
        store.store_signed_pre_key(old.clone()).expect("store");
        store.store_signed_pre_key(newest).expect("store");

        let rotated = rotation.rotate(&store, 2 * DAY).expect("rotate");
        assert_eq!(rotated.id(), 2);

        let kept = store.load_signed_pre_key(1).expect("load").expect("retained");
        assert_eq!(kept.signature(), old.signature());
        assert!(store.contains_signed_pre_key(MAX_PRE_KEY_ID - 1).expect("contains"));
    }
}
