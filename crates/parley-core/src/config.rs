//! Protocol configuration.
//!
//! All limits that bound memory and CPU on the decrypt path live here so they
//! are explicit rather than implied library defaults. Every struct has a
//! `Default` matching the constants in the crate root and can be loaded with
//! serde from any format the caller prefers.

use crate::{MAX_MESSAGE_KEYS, MAX_SKIP};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default signed prekey rotation period (7 days).
pub const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default retention of rotated signed prekeys (30 days).
pub const DEFAULT_OVERLAP_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How a changed peer identity key is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrustPolicy {
    /// Trust the first identity seen for an address and reject any change.
    #[default]
    Strict,
    /// Accept a changed identity and overwrite the stored one.
    ///
    /// Only for callers that have verified the new key out of band.
    AcceptChanged,
}

/// Limits for pairwise Double Ratchet sessions.
///
/// These also bound the work an unauthenticated frame can cause. A ratchet
/// message is tried against the current state and then each archived state
/// until one authenticates, so a forged frame with an unknown ratchet key
/// costs at most `1 + max_archived_states` attempts. Each attempt costs two
/// X25519 operations and up to `max_skip` chain-key steps. With the defaults
/// that is 41 attempts and roughly 41k chain steps, which is the worst case
/// one frame can cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Largest forward jump in a receiving chain.
    pub max_skip: u32,
    /// Skipped message keys cached per receiving chain (oldest evicted).
    pub max_message_keys: usize,
    /// Receiving chains retained per session state.
    pub max_receiver_chains: usize,
    /// Archived session states retained per peer device. Also the number of
    /// extra decrypt attempts a failing message can cause.
    pub max_archived_states: usize,
    /// Handling of peer identity changes.
    pub trust_policy: TrustPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skip: MAX_SKIP,
            max_message_keys: MAX_MESSAGE_KEYS,
            max_receiver_chains: 5,
            max_archived_states: 40,
            trust_policy: TrustPolicy::Strict,
        }
    }
}

/// Limits for sender-key group chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderKeyConfig {
    /// Largest forward jump in a sender chain.
    pub max_skip: u32,
    /// Skipped message keys cached per sender chain (oldest evicted).
    pub max_message_keys: usize,
    /// Sender key states retained per sender (one per key id).
    pub max_states: usize,
}

impl Default for SenderKeyConfig {
    fn default() -> Self {
        Self {
            max_skip: MAX_SKIP,
            max_message_keys: MAX_MESSAGE_KEYS,
            max_states: 5,
        }
    }
}

/// Signed prekey rotation schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// How often to generate a new signed prekey.
    pub rotation_period: Duration,
    /// How long a replaced signed prekey stays available for late bootstraps.
    pub overlap_period: Duration,
    /// Maximum number of replaced signed prekeys to retain.
    pub max_retained_keys: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_period: DEFAULT_ROTATION_PERIOD,
            overlap_period: DEFAULT_OVERLAP_PERIOD,
            max_retained_keys: 3,
        }
    }
}

/// Complete protocol configuration for one party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Pairwise session limits.
    pub session: SessionConfig,
    /// Group sender-key limits.
    pub sender_key: SenderKeyConfig,
    /// Signed prekey rotation.
    pub rotation: RotationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();
        assert_eq!(config.session.max_skip, MAX_SKIP);
        assert_eq!(config.session.max_message_keys, MAX_MESSAGE_KEYS);
        assert_eq!(config.session.trust_policy, TrustPolicy::Strict);
        assert_eq!(config.sender_key.max_states, 5);
        assert!(config.rotation.overlap_period > config.rotation.rotation_period);
    }
}
