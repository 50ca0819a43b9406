//! Asynchronous key agreement (X3DH) and initial ratchet states.
//!
//! ```text
//! secret = 0xFF*32 || DH(IK_A, SPK_B) || DH(EK_A, IK_B) || DH(EK_A, SPK_B)
//!          [|| DH(EK_A, OPK_B)]
//! (root, chain) = HKDF-SHA256(secret)
//! ```
//!
//! Both sides compute the same products in the same order, so the responder
//! never needs to be online. The leading 0xFF block keeps the input distinct
//! from any single curve point.

use super::{ChainKey, RootKey, SessionState};
use crate::crypto::{hkdf_derive, KeyPair, X25519PublicKey};
use crate::error::Result;
use crate::identity::{IdentityKey, IdentityKeyPair};
use crate::protocol::CURRENT_VERSION;
use zeroize::Zeroizing;

const AGREEMENT_INFO: &[u8] = b"Parley X3DH v1";

/// Initiator inputs.
pub struct AliceParameters<'a> {
    /// Initiator identity.
    pub our_identity: &'a IdentityKeyPair,
    /// Fresh base (ephemeral) key.
    pub our_base_key: &'a KeyPair,
    /// Responder identity from the bundle.
    pub their_identity: &'a IdentityKey,
    /// Responder signed prekey; also its first ratchet key.
    pub their_signed_pre_key: &'a X25519PublicKey,
    /// Responder one-time prekey, if the bundle had one.
    pub their_one_time_pre_key: Option<&'a X25519PublicKey>,
}

/// Responder inputs.
pub struct BobParameters<'a> {
    /// Responder identity.
    pub our_identity: &'a IdentityKeyPair,
    /// Signed prekey named by the message; also the first ratchet key.
    pub our_signed_pre_key: &'a KeyPair,
    /// One-time prekey named by the message, if any.
    pub our_one_time_pre_key: Option<&'a KeyPair>,
    /// Initiator identity from the message.
    pub their_identity: &'a IdentityKey,
    /// Initiator base key from the message.
    pub their_base_key: &'a X25519PublicKey,
}

fn derive_keys(secret: &[u8]) -> Result<(RootKey, ChainKey)> {
    let output = hkdf_derive(None, secret, AGREEMENT_INFO, 64)?;

    let mut root = [0u8; 32];
    let mut chain = [0u8; 32];
    root.copy_from_slice(&output[..32]);
    chain.copy_from_slice(&output[32..]);

    Ok((RootKey::new(root), ChainKey::new(chain, 0)))
}

/// Build the initiator's first state.
///
/// The responder's signed prekey becomes the first receiving chain, and one
/// root step with a fresh ratchet key yields the first sending chain.
pub fn initialize_alice_session(params: &AliceParameters<'_>) -> Result<SessionState> {
    let mut secret = Zeroizing::new(vec![0xFFu8; 32]);
    secret.extend_from_slice(
        params
            .our_identity
            .diffie_hellman(params.their_signed_pre_key)
            .as_bytes(),
    );
    secret.extend_from_slice(
        params
            .our_base_key
            .diffie_hellman(params.their_identity.dh_public())
            .as_bytes(),
    );
    secret.extend_from_slice(
        params
            .our_base_key
            .diffie_hellman(params.their_signed_pre_key)
            .as_bytes(),
    );
    if let Some(one_time) = params.their_one_time_pre_key {
        secret.extend_from_slice(params.our_base_key.diffie_hellman(one_time).as_bytes());
    }

    let (root, receiving) = derive_keys(&secret)?;

    let sending_ratchet = KeyPair::generate();
    let (root, sending) = root.create_chain(params.their_signed_pre_key, &sending_ratchet)?;

    let mut state = SessionState::new(
        CURRENT_VERSION,
        params.our_identity.public_key(),
        *params.their_identity,
        root,
        sending_ratchet,
        sending,
        *params.our_base_key.public_key(),
    );
    // Only needs to hold this one chain.
    state.add_receiver_chain(*params.their_signed_pre_key, receiving, 1);
    Ok(state)
}

/// Build the responder's first state, mirroring the initiator's products.
pub fn initialize_bob_session(params: &BobParameters<'_>) -> Result<SessionState> {
    let mut secret = Zeroizing::new(vec![0xFFu8; 32]);
    secret.extend_from_slice(
        params
            .our_signed_pre_key
            .diffie_hellman(params.their_identity.dh_public())
            .as_bytes(),
    );
    secret.extend_from_slice(
        params
            .our_identity
            .diffie_hellman(params.their_base_key)
            .as_bytes(),
    );
    secret.extend_from_slice(
        params
            .our_signed_pre_key
            .diffie_hellman(params.their_base_key)
            .as_bytes(),
    );
    if let Some(one_time) = params.our_one_time_pre_key {
        secret.extend_from_slice(one_time.diffie_hellman(params.their_base_key).as_bytes());
    }

    let (root, sending) = derive_keys(&secret)?;

    Ok(SessionState::new(
        CURRENT_VERSION,
        params.our_identity.public_key(),
        *params.their_identity,
        root,
        params.our_signed_pre_key.clone(),
        sending,
        *params.their_base_key,
    ))
}
