//! Cryptographic primitives for Parley.
//!
//! - **X25519**: Diffie-Hellman for key agreement and the DH ratchet
//! - **Ed25519**: identity and sender-key signatures
//! - **ChaCha20-Poly1305**: message encryption with a detached tag
//! - **HKDF-SHA256**: every key derivation
//!
//! Secret material is zeroized on drop.

mod aead;
mod keys;

pub use aead::{decrypt_detached, encrypt_detached, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use keys::{KeyPair, SharedSecret, X25519PublicKey, X25519_KEY_SIZE};
pub(crate) use keys::serde_bytes;

use crate::error::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Derive keys using HKDF-SHA256.
///
/// This is the one key derivation function used throughout Parley; callers
/// separate domains with distinct `info` strings.
pub fn hkdf_derive(
    salt: Option<&[u8]>,
    input_key_material: &[u8],
    info: &[u8],
    output_length: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hkdf = Hkdf::<Sha256>::new(salt, input_key_material);
    let mut output = Zeroizing::new(vec![0u8; output_length]);
    hkdf.expand(info, &mut output)
        .map_err(|_| Error::Crypto("HKDF expansion failed".into()))?;
    Ok(output)
}

/// Generate cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_derive() {
        let ikm = b"input key material";
        let salt = b"salt";
        let info = b"Parley key derivation";

        let out1 = hkdf_derive(Some(&salt[..]), ikm, info, 64).expect("should derive");
        assert_eq!(out1.len(), 64);

        // Deterministic
        let out2 = hkdf_derive(Some(&salt[..]), ikm, info, 64).expect("should derive");
        assert_eq!(&*out1, &*out2);

        // Different info -> different output
        let out3 = hkdf_derive(Some(&salt[..]), ikm, b"different", 64).expect("should derive");
        assert_ne!(&*out1, &*out3);
    }

    #[test]
    fn test_hkdf_rejects_oversized_output() {
        // HKDF-SHA256 is limited to 255 * 32 bytes
        assert!(hkdf_derive(None, b"ikm", b"info", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_random_bytes() {
        let a: [u8; 32] = random_bytes();
        let b: [u8; 32] = random_bytes();
        assert_ne!(a, b);
    }
}
