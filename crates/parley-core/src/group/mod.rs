//! Sender-key groups.
//!
//! Each member owns one symmetric chain per group and hands its current
//! position to every other member once, through a
//! [`SenderKeyDistributionMessage`](crate::protocol::SenderKeyDistributionMessage).
//! After that a group message costs one encryption regardless of group size.
//!
//! Group messages are signed with a per-chain Ed25519 key, so members can
//! tell the sender's messages apart from anything another member forges with
//! the shared chain.

mod builder;
mod cipher;
mod state;

pub use builder::GroupSessionBuilder;
pub use cipher::GroupCipher;
pub use state::{SenderChainKey, SenderKeyRecord, SenderKeyState, SenderMessageKey};
