//! XChaCha20-Poly1305 implementation of the [`Cipher`] trait.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use crate::{error::VaultError, traits::Cipher};

/// Version tag for the XChaCha20-Poly1305 cipher.
pub const VERSION_TAG: u8 = 0x01;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size.
const TAG_LEN: usize = 16;

/// XChaCha20-Poly1305 AEAD cipher.
///
/// The 192-bit nonce is drawn at random for every call, which keeps the
/// collision probability negligible without any per-key counter state.
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaCha20Poly1305Cipher;

impl Cipher for XChaCha20Poly1305Cipher {
    fn version_tag(&self) -> u8 {
        VERSION_TAG
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    #[allow(deprecated)]
    fn encrypt(
        &self,
        key: &[u8; 32],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), VaultError> {
        let cipher = XChaCha20Poly1305::new(key.into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload {
                msg: plaintext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))?;

        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    #[allow(deprecated)]
    fn decrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
            return Err(VaultError::Decryption);
        }

        let nonce = XNonce::from_slice(nonce);
        let cipher = XChaCha20Poly1305::new(key.into());

        cipher
            .decrypt(nonce, Payload {
                msg: ciphertext,
                aad,
            })
            .map_err(|_| VaultError::Decryption)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_aad() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x42u8; 32];

        let (nonce, ct) = cipher.encrypt(&key, b"secret data", b"history:c1").unwrap();
        let pt = cipher.decrypt(&key, &nonce, &ct, b"history:c1").unwrap();
        assert_eq!(pt, b"secret data");
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let (nonce, ct) = cipher.encrypt(&[0x42u8; 32], b"secret", b"").unwrap();
        let result = cipher.decrypt(&[0x43u8; 32], &nonce, &ct, b"");
        assert!(matches!(result, Err(VaultError::Decryption)));
    }

    #[test]
    fn wrong_aad_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x42u8; 32];
        let (nonce, ct) = cipher.encrypt(&key, b"secret", b"correct").unwrap();
        assert!(cipher.decrypt(&key, &nonce, &ct, b"wrong").is_err());
    }

    #[test]
    fn short_inputs_fail() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x42u8; 32];
        assert!(cipher.decrypt(&key, &[0u8; 12], &[0u8; 32], b"").is_err());
        assert!(cipher.decrypt(&key, &[0u8; NONCE_LEN], &[0u8; 8], b"").is_err());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x42u8; 32];
        let (n1, c1) = cipher.encrypt(&key, b"same input", b"").unwrap();
        let (n2, c2) = cipher.encrypt(&key, b"same input", b"").unwrap();
        assert_eq!(n1.len(), NONCE_LEN);
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x42u8; 32];
        let (nonce, ct) = cipher.encrypt(&key, b"", b"").unwrap();
        assert_eq!(ct.len(), TAG_LEN);
        assert!(cipher.decrypt(&key, &nonce, &ct, b"").unwrap().is_empty());
    }
}
