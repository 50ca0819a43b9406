//! Pairwise sessions.
//!
//! [`SessionBuilder`] starts a session from a peer's prekey bundle;
//! [`SessionCipher`] encrypts and decrypts on it, deriving the responder
//! side lazily from the first pre-key message.
//!
//! ## Session Lifecycle
//!
//! 1. **Uninitialized**: no state stored for the peer device
//! 2. **InitiatorPending**: bundle processed, outgoing messages still carry
//!    bootstrap data
//! 3. **Established**: the peer has replied, plain ratchet messages only

mod builder;
mod cipher;

pub use builder::SessionBuilder;
pub use cipher::SessionCipher;

use crate::address::ProtocolAddress;
use crate::config::TrustPolicy;
use crate::error::{Error, Result};
use crate::identity::IdentityKey;
use crate::logging::RedactedHex;
use crate::store::IdentityKeyStore;
use tracing::warn;

/// Where a session with a peer device stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session state.
    Uninitialized,
    /// Initiated locally; waiting for the first reply.
    InitiatorPending,
    /// Both sides have exchanged messages.
    Established,
}

/// Reject `identity` for `address` if it differs from the trusted one and
/// the policy does not accept changes.
pub(crate) fn check_trust<S: IdentityKeyStore + ?Sized>(
    store: &S,
    address: &ProtocolAddress,
    identity: &IdentityKey,
    policy: TrustPolicy,
) -> Result<()> {
    if store.is_trusted_identity(address, identity)? {
        return Ok(());
    }

    match policy {
        TrustPolicy::AcceptChanged => Ok(()),
        TrustPolicy::Strict => {
            let fingerprint = identity.fingerprint();
            warn!(
                peer = %address,
                fingerprint = %RedactedHex(&fingerprint),
                "untrusted identity"
            );
            Err(Error::UntrustedIdentity(address.to_string()))
        }
    }
}
