//! Cipher trait for swappable authenticated encryption backends.

use crate::error::VaultError;

/// Trait for authenticated encryption with associated data (AEAD).
///
/// Implementations can be swapped without changing the rest of the vault.
/// Each implementation has a unique version tag stored as the first byte of
/// the ciphertext, enabling future cipher migrations.
pub trait Cipher: Send + Sync {
    /// Unique identifier for this cipher.
    fn version_tag(&self) -> u8;

    /// Nonce length in bytes. The nonce is persisted as the record IV.
    fn nonce_len(&self) -> usize;

    /// Encrypt `plaintext` with `key` and `aad` under a freshly generated nonce.
    ///
    /// Returns `(nonce, ciphertext || tag)`. Callers cannot choose the nonce.
    fn encrypt(
        &self,
        key: &[u8; 32],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), VaultError>;

    /// Decrypt a ciphertext previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError>;
}
