//! Passphrase verification via an encrypted canary.
//!
//! At setup a fixed constant is encrypted under the fresh key and stored with
//! the profile. Later unlocks derive a key and must be able to open it before
//! that key is trusted with real data.

use crate::{
    crypto::{self, EncryptedRecord},
    error::VaultError,
    kdf::{self, DerivedKey, KdfParams, Salt},
    traits::Cipher,
    xchacha20::XChaCha20Poly1305Cipher,
};

/// Fixed-length plaintext sealed inside every canary.
pub const CANARY_PLAINTEXT: &str = "lockbox.canary.v1:7f3a9c2e5b1d84";

/// Associated data for canary records, distinct from any data AAD.
const CANARY_AAD: &str = "canary";

/// Encrypt the canary constant under `key`. Called once, at vault creation.
pub fn create_canary(key: &DerivedKey) -> Result<EncryptedRecord, VaultError> {
    create_canary_with(&XChaCha20Poly1305Cipher, key)
}

pub fn create_canary_with(
    cipher: &dyn Cipher,
    key: &DerivedKey,
) -> Result<EncryptedRecord, VaultError> {
    crypto::encrypt_with(cipher, CANARY_PLAINTEXT, key, CANARY_AAD)
}

/// Whether `key` opens `canary` and recovers the expected constant.
pub fn verify_key(key: &DerivedKey, canary: &EncryptedRecord) -> bool {
    verify_key_with(&XChaCha20Poly1305Cipher, key, canary)
}

pub fn verify_key_with(cipher: &dyn Cipher, key: &DerivedKey, canary: &EncryptedRecord) -> bool {
    match crypto::decrypt_with(cipher, canary, key, CANARY_AAD) {
        Ok(plaintext) => plaintext == CANARY_PLAINTEXT,
        Err(_) => false,
    }
}

/// Derive a key from `(passphrase, salt)` and check it against `canary`.
///
/// A wrong passphrase is an expected outcome, so every failure, including a
/// derivation error, is reported as `false`. The transient key is wiped when
/// this returns.
pub async fn verify(
    passphrase: &str,
    salt: &Salt,
    params: &KdfParams,
    canary: &EncryptedRecord,
) -> bool {
    match kdf::derive_key(passphrase, salt, params).await {
        Ok(key) => verify_key(&key, canary),
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "key derivation failed during verification");
            false
        },
    }
}
