//! # Parley Core Library
//!
//! End-to-end encrypted sessions between parties that are never required to
//! be online at the same time.
//!
//! ## Protocol Layers
//!
//! - Asynchronous key agreement from published prekey bundles
//! - Double Ratchet sessions with forward secrecy and break-in recovery
//! - Sender-key groups: one symmetric chain per sender, distributed once per
//!   member
//!
//! ## Core Guarantees
//!
//! - One-time prekeys are consumed at most once
//! - Ratchet state is committed only after a message authenticates
//! - Skipped-key caches are bounded by count and by forward gap
//! - Fail-closed: no partial plaintext is ever returned
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     session        │       group        │
//! ├─────────────────────────────────────────┤
//! │   ratchet   │   protocol (wire)         │
//! ├─────────────────────────────────────────┤
//! │  store  │  prekeys  │  identity         │
//! ├─────────────────────────────────────────┤
//! │                crypto                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Every party owns its own stores; components borrow them. There is no
//! process-wide state.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod address;
pub mod config;
pub mod crypto;
pub mod error;
pub mod group;
pub mod identity;
pub mod logging;
pub mod prekeys;
pub mod protocol;
pub mod ratchet;
pub mod session;
pub mod store;

pub use address::{ProtocolAddress, SenderKeyName};
pub use config::{ProtocolConfig, SenderKeyConfig, SessionConfig, TrustPolicy};
pub use error::{Error, Result};
pub use group::{GroupCipher, GroupSessionBuilder};
pub use identity::{IdentityKey, IdentityKeyPair};
pub use prekeys::{PreKeyBundle, PreKeyRecord, SignedPreKeyRecord};
pub use protocol::{
    CiphertextMessage, PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage,
    SignalMessage,
};
pub use session::{SessionBuilder, SessionCipher, SessionStatus};
pub use store::{
    IdentityKeyStore, InMemoryProtocolStore, InMemorySenderKeyStore, PreKeyStore,
    ProtocolStore, SenderKeyStore, SessionStore, SignedPreKeyStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum forward gap a receiving chain may be advanced in one step.
pub const MAX_SKIP: u32 = 1000;

/// Maximum number of skipped message keys cached per chain.
pub const MAX_MESSAGE_KEYS: usize = 2000;
