//! Record-level encryption, reuse hashing, and randomness.
//!
//! These are stateless. Session-aware wrappers live in [`crate::session`].

use {
    base64::Engine,
    sha2::{Digest, Sha256},
};

use crate::{
    error::VaultError,
    kdf::DerivedKey,
    traits::Cipher,
    xchacha20::XChaCha20Poly1305Cipher,
};

/// The only persisted shape the vault dictates.
///
/// `ciphertext` is base64 of `[version tag][ciphertext + tag]` and `iv` is
/// base64 of the nonce. Both fields must be stored together.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncryptedRecord {
    pub ciphertext: String,
    pub iv: String,
}

/// Encrypt `plaintext` under `key` with no associated data.
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<EncryptedRecord, VaultError> {
    encrypt_with(&XChaCha20Poly1305Cipher, plaintext, key, "")
}

/// Decrypt a record produced by [`encrypt`].
pub fn decrypt(record: &EncryptedRecord, key: &DerivedKey) -> Result<String, VaultError> {
    decrypt_with(&XChaCha20Poly1305Cipher, record, key, "")
}

/// Encrypt with an explicit cipher and associated data.
///
/// The associated data is authenticated but not stored; decryption must
/// present the same value.
pub fn encrypt_with(
    cipher: &dyn Cipher,
    plaintext: &str,
    key: &DerivedKey,
    aad: &str,
) -> Result<EncryptedRecord, VaultError> {
    let (nonce, encrypted) = cipher.encrypt(key.expose(), plaintext.as_bytes(), aad.as_bytes())?;

    let mut blob = Vec::with_capacity(1 + encrypted.len());
    blob.push(cipher.version_tag());
    blob.extend_from_slice(&encrypted);

    let engine = base64::engine::general_purpose::STANDARD;
    Ok(EncryptedRecord {
        ciphertext: engine.encode(blob),
        iv: engine.encode(nonce),
    })
}

/// Decrypt with an explicit cipher and associated data.
///
/// Every failure collapses into [`VaultError::Decryption`] so callers cannot
/// tell a wrong key from a corrupted record.
pub fn decrypt_with(
    cipher: &dyn Cipher,
    record: &EncryptedRecord,
    key: &DerivedKey,
    aad: &str,
) -> Result<String, VaultError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let blob = engine
        .decode(&record.ciphertext)
        .map_err(|_| VaultError::Decryption)?;
    let nonce = engine
        .decode(&record.iv)
        .map_err(|_| VaultError::Decryption)?;

    let Some((&version, encrypted)) = blob.split_first() else {
        return Err(VaultError::Decryption);
    };
    if version != cipher.version_tag() || nonce.len() != cipher.nonce_len() {
        return Err(VaultError::Decryption);
    }

    let plaintext = cipher.decrypt(key.expose(), &nonce, encrypted, aad.as_bytes())?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
}

/// One-way SHA-256 digest as lowercase hex, used for reuse comparison only.
pub fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `n` bytes from the thread-local CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    use rand::RngCore;

    let mut buf = vec![0u8; n];
    rand::rng().fill_bytes(&mut buf);
    buf
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use {super::*, rstest::rstest};

    use crate::kdf::{Salt, derive_key_blocking, test_params};

    fn key() -> DerivedKey {
        DerivedKey::from_bytes([0x42; 32])
    }

    fn flip_byte(b64: &str, index: usize) -> String {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut bytes = engine.decode(b64).unwrap();
        bytes[index] ^= 0x01;
        engine.encode(bytes)
    }

    #[rstest]
    #[case("")]
    #[case("hunter2")]
    #[case("pässwörd ✓ with unicode")]
    fn round_trip(#[case] plaintext: &str) {
        let record = encrypt(plaintext, &key()).unwrap();
        assert_eq!(decrypt(&record, &key()).unwrap(), plaintext);
    }

    #[test]
    fn large_plaintext_round_trip() {
        let plaintext = "x".repeat(100_000);
        let record = encrypt(&plaintext, &key()).unwrap();
        assert_eq!(decrypt(&record, &key()).unwrap(), plaintext);
    }

    #[test]
    fn keys_derived_twice_decrypt_each_other() {
        let salt = Salt::generate();
        let k1 = derive_key_blocking(b"Tr0ub4dor&3", &salt, &test_params()).unwrap();
        let k2 = derive_key_blocking(b"Tr0ub4dor&3", &salt, &test_params()).unwrap();

        let record = encrypt("hunter2", &k1).unwrap();
        assert_eq!(decrypt(&record, &k2).unwrap(), "hunter2");
    }

    #[test]
    fn wrong_key_is_decryption_error() {
        let record = encrypt("secret", &key()).unwrap();
        let other = DerivedKey::from_bytes([0x43; 32]);
        assert!(matches!(decrypt(&record, &other), Err(VaultError::Decryption)));
    }

    #[test]
    fn flipping_any_ciphertext_byte_fails() {
        let record = encrypt("tamper me", &key()).unwrap();
        let len = base64::engine::general_purpose::STANDARD
            .decode(&record.ciphertext)
            .unwrap()
            .len();

        for i in 0..len {
            let tampered = EncryptedRecord {
                ciphertext: flip_byte(&record.ciphertext, i),
                iv: record.iv.clone(),
            };
            assert!(
                matches!(decrypt(&tampered, &key()), Err(VaultError::Decryption)),
                "byte {i} flip was not detected"
            );
        }
    }

    #[test]
    fn flipping_any_iv_byte_fails() {
        let record = encrypt("tamper me", &key()).unwrap();
        for i in 0..crate::xchacha20::NONCE_LEN {
            let tampered = EncryptedRecord {
                ciphertext: record.ciphertext.clone(),
                iv: flip_byte(&record.iv, i),
            };
            assert!(decrypt(&tampered, &key()).is_err(), "iv byte {i}");
        }
    }

    #[test]
    fn malformed_records_fail() {
        let record = encrypt("x", &key()).unwrap();
        let cases = [
            EncryptedRecord {
                ciphertext: "not base64!".into(),
                iv: record.iv.clone(),
            },
            EncryptedRecord {
                ciphertext: String::new(),
                iv: record.iv.clone(),
            },
            EncryptedRecord {
                ciphertext: record.ciphertext.clone(),
                iv: base64::engine::general_purpose::STANDARD.encode([0u8; 12]),
            },
        ];
        for bad in &cases {
            assert!(matches!(decrypt(bad, &key()), Err(VaultError::Decryption)));
        }
    }

    #[test]
    fn mismatched_association_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let record = encrypt_with(&cipher, "old", &key(), "history:a").unwrap();
        assert!(decrypt_with(&cipher, &record, &key(), "history:b").is_err());
        assert_eq!(
            decrypt_with(&cipher, &record, &key(), "history:a").unwrap(),
            "old"
        );
    }

    #[test]
    fn ivs_never_repeat() {
        let key = key();
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let record = encrypt("same", &key).unwrap();
            assert!(seen.insert(record.iv), "IV repeated");
        }
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash("hunter2"), hash("hunter2"));
        assert_ne!(hash("hunter2"), hash("hunter3"));
    }

    #[test]
    fn random_bytes_has_requested_length() {
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_bytes(16).len(), 16);
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn record_serializes_with_two_fields() {
        let record = encrypt("x", &key()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("ciphertext"));
        assert!(obj.contains_key("iv"));
    }
}
