//! Argon2id key derivation for passphrase → vault key.

use {argon2::Argon2, base64::Engine, zeroize::Zeroizing};

#[cfg(feature = "metrics")]
use lockbox_metrics::{histogram, vault as vault_metrics};

use crate::error::VaultError;

/// Salt length in bytes. Shared by setup and every later unlock.
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes.
pub const KEY_LEN: usize = 32;

/// Argon2id parameters stored alongside the user's salt.
///
/// Persisting them with the profile keeps old vaults reproducible when the
/// defaults change.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 64 MiB = 65536).
    pub m_cost: u32,
    /// Number of iterations (default: 3).
    pub t_cost: u32,
    /// Degree of parallelism (default: 1).
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// Per-user random salt, generated once at vault creation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Generate a fresh random salt.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decode a base64 salt, rejecting anything that isn't exactly [`SALT_LEN`] bytes.
    pub fn from_base64(b64: &str) -> Result<Self, VaultError> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| VaultError::validation("salt", e.to_string()))?;
        let bytes: [u8; SALT_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            VaultError::validation("salt", format!("expected {SALT_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", self.to_base64())
    }
}

/// Symmetric key derived from `(passphrase, salt)`.
///
/// Wiped on drop. Not `Clone`, not serializable, and the raw bytes are only
/// reachable from inside this crate.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
///
/// Runs on the calling thread. Prefer [`derive_key`] from async code.
pub fn derive_key_blocking(
    passphrase: &[u8],
    salt: &Salt,
    params: &KdfParams,
) -> Result<DerivedKey, VaultError> {
    let argon2_params =
        argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
            .map_err(|e| VaultError::KeyDerivation(format!("invalid KDF params: {e}")))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase, salt.as_bytes(), output.as_mut())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey(output))
}

/// Derive a key on the blocking pool so the async runtime stays responsive.
pub async fn derive_key(
    passphrase: &str,
    salt: &Salt,
    params: &KdfParams,
) -> Result<DerivedKey, VaultError> {
    let passphrase = Zeroizing::new(passphrase.as_bytes().to_vec());
    let salt = *salt;
    let params = params.clone();

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let key = tokio::task::spawn_blocking(move || derive_key_blocking(&passphrase, &salt, &params))
        .await
        .map_err(|e| VaultError::KeyDerivation(format!("derivation task failed: {e}")))?;

    #[cfg(feature = "metrics")]
    histogram!(vault_metrics::KDF_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    key
}

/// Cheap parameters for tests. Argon2 rejects anything below 8 KiB per lane.
#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_deterministic() {
        let salt = Salt::from_bytes(*b"test-salt-16byte");
        let key1 = derive_key_blocking(b"password", &salt, &test_params()).unwrap();
        let key2 = derive_key_blocking(b"password", &salt, &test_params()).unwrap();
        assert_eq!(key1.expose(), key2.expose());
    }

    #[test]
    fn different_passwords_different_keys() {
        let salt = Salt::from_bytes(*b"test-salt-16byte");
        let key1 = derive_key_blocking(b"password1", &salt, &test_params()).unwrap();
        let key2 = derive_key_blocking(b"password2", &salt, &test_params()).unwrap();
        assert_ne!(key1.expose(), key2.expose());
    }

    #[test]
    fn different_salts_different_keys() {
        let key1 = derive_key_blocking(
            b"password",
            &Salt::from_bytes(*b"salt-aaaaaaaaaaa"),
            &test_params(),
        )
        .unwrap();
        let key2 = derive_key_blocking(
            b"password",
            &Salt::from_bytes(*b"salt-bbbbbbbbbbb"),
            &test_params(),
        )
        .unwrap();
        assert_ne!(key1.expose(), key2.expose());
    }

    #[test]
    fn invalid_params_are_a_derivation_error() {
        let params = KdfParams {
            m_cost: 1,
            t_cost: 0,
            p_cost: 1,
        };
        let result = derive_key_blocking(b"password", &Salt::generate(), &params);
        assert!(matches!(result, Err(VaultError::KeyDerivation(_))));
    }

    #[tokio::test]
    async fn async_derivation_matches_blocking() {
        let salt = Salt::generate();
        let a = derive_key("Tr0ub4dor&3", &salt, &test_params()).await.unwrap();
        let b = derive_key_blocking(b"Tr0ub4dor&3", &salt, &test_params()).unwrap();
        assert_eq!(a.expose(), b.expose());
    }

    #[test]
    fn salt_base64_round_trip() {
        let salt = Salt::generate();
        let decoded = Salt::from_base64(&salt.to_base64()).unwrap();
        assert_eq!(decoded, salt);
    }

    #[test]
    fn salt_with_wrong_length_is_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 8]);
        assert!(matches!(
            Salt::from_base64(&short),
            Err(VaultError::Validation { field: "salt", .. })
        ));
    }

    #[test]
    fn derived_key_debug_is_redacted() {
        let key = DerivedKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DerivedKey(<redacted>)");
    }

    #[test]
    fn kdf_params_serialization() {
        let params = KdfParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let parsed: KdfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
    }
}
