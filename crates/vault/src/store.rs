//! Persistence trait consumed by the vault core.
//!
//! The store only ever sees salts, canaries, KDF parameters, ciphertext and
//! one-way hashes. Implementations are treated as untrusted and unreliable.

use async_trait::async_trait;

use crate::{
    crypto::EncryptedRecord,
    history::PasswordHistoryEntry,
    kdf::{KdfParams, Salt},
};

/// Errors raised by a [`VaultStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl StoreError {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-user vault profile.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultProfile {
    pub salt: Salt,
    /// Always set by [`Vault::setup`](crate::Vault::setup). A profile without
    /// one cannot be unlocked.
    pub canary: Option<EncryptedRecord>,
    pub kdf_params: KdfParams,
}

/// Partial profile update. `None` fields are left untouched.
///
/// Creating a profile requires `salt` and `kdf_params`. The salt of an
/// existing profile can never change.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub salt: Option<Salt>,
    pub canary: Option<EncryptedRecord>,
    pub kdf_params: Option<KdfParams>,
}

/// Backing store for profiles and password history.
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<VaultProfile>>;

    /// Create a profile atomically. Returns `false`, leaving the stored
    /// profile untouched, when one already exists for `user_id`.
    async fn insert_profile(&self, user_id: &str, profile: &VaultProfile) -> StoreResult<bool>;

    /// Merge `update` into the profile, creating it if needed. Fails if the
    /// update carries a salt different from the stored one.
    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> StoreResult<()>;

    /// Insert one history entry. Must be all-or-nothing.
    async fn insert_history_entry(&self, entry: &PasswordHistoryEntry) -> StoreResult<()>;

    /// Whether any entry for `user_id` carries `password_hash`, ignoring
    /// entries of `exclude_credential_id` when given.
    async fn query_history_by_hash(
        &self,
        user_id: &str,
        password_hash: &str,
        exclude_credential_id: Option<&str>,
    ) -> StoreResult<bool>;

    /// History of one credential, newest first.
    async fn list_history(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> StoreResult<Vec<PasswordHistoryEntry>>;
}

/// Merge `update` into an optional existing profile.
pub(crate) fn apply_update(
    existing: Option<VaultProfile>,
    update: ProfileUpdate,
) -> StoreResult<VaultProfile> {
    match existing {
        Some(mut profile) => {
            if update.salt.is_some_and(|salt| salt != profile.salt) {
                return Err(StoreError::message("salt is immutable once set"));
            }
            if let Some(canary) = update.canary {
                profile.canary = Some(canary);
            }
            if let Some(params) = update.kdf_params {
                profile.kdf_params = params;
            }
            Ok(profile)
        },
        None => {
            let salt = update
                .salt
                .ok_or_else(|| StoreError::message("new profile requires a salt"))?;
            let kdf_params = update
                .kdf_params
                .ok_or_else(|| StoreError::message("new profile requires KDF params"))?;
            Ok(VaultProfile {
                salt,
                canary: update.canary,
                kdf_params,
            })
        },
    }
}
