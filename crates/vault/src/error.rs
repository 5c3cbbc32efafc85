//! Vault error types.
//!
//! No variant ever carries a passphrase, key bytes, or plaintext. Messages for
//! the cryptographic failures are deliberately fixed strings.

use crate::store::StoreError;

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The platform failed to derive a key (bad cost parameters, allocation failure).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The supplied passphrase did not open the canary.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// Authenticated decryption failed: wrong key, tampered or malformed record.
    #[error("decryption failed")]
    Decryption,

    /// No active session; the vault must be unlocked first.
    #[error("vault is locked")]
    VaultLocked,

    /// An unlock attempt finished after a newer attempt or a lock had started.
    #[error("unlock attempt was superseded")]
    Superseded,

    /// The vault profile already exists for this user.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// No vault profile exists for this user.
    #[error("vault is not initialized")]
    NotInitialized,

    /// Malformed input to a credential or history operation.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Encryption failed inside the cipher backend.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// The backing store rejected the call or was unreachable.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl VaultError {
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether the caller can reasonably retry after user action or backoff.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPassphrase | Self::VaultLocked | Self::Superseded | Self::Persistence(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_failures_have_fixed_messages() {
        assert_eq!(VaultError::InvalidPassphrase.to_string(), "invalid passphrase");
        assert_eq!(VaultError::Decryption.to_string(), "decryption failed");
        assert_eq!(VaultError::VaultLocked.to_string(), "vault is locked");
    }

    #[test]
    fn validation_names_the_field() {
        let err = VaultError::validation("credential_id", "must not be empty");
        assert_eq!(err.to_string(), "invalid credential_id: must not be empty");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn persistence_is_recoverable() {
        let err = VaultError::from(StoreError::message("connection reset"));
        assert!(err.is_recoverable());
        assert!(matches!(err, VaultError::Persistence(_)));
    }
}
