//! Password change history and cross-credential reuse detection.
//!
//! Old passwords are encrypted under the session key (bound to their
//! credential through associated data) and hashed with [`crypto::hash`]. Reuse
//! checks only ever compare hashes, so they work without an unlocked session.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};

#[cfg(feature = "metrics")]
use lockbox_metrics::{counter, labels, vault as vault_metrics};

use crate::{
    crypto::{self, EncryptedRecord},
    error::{Result, VaultError},
    session::SessionManager,
    store::VaultStore,
};

/// Why a credential's password changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// The user edited the password.
    Manual,
    /// Replaced by a generated password.
    Generated,
    /// Rotated after a breach report.
    Breach,
    /// Rotated because the password aged out.
    Expired,
    /// Overwritten by an import.
    Import,
}

impl ChangeReason {
    pub const ALL: &'static [ChangeReason] = &[
        Self::Manual,
        Self::Generated,
        Self::Breach,
        Self::Expired,
        Self::Import,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Generated => "generated",
            Self::Breach => "breach",
            Self::Expired => "expired",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown change reason: {s}"))
    }
}

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PasswordHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub credential_id: String,
    pub encrypted_old_password: EncryptedRecord,
    pub password_hash: String,
    pub change_reason: ChangeReason,
    pub changed_at: DateTime<Utc>,
}

fn history_aad(credential_id: &str) -> String {
    format!("history:{credential_id}")
}

fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(VaultError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Records password changes and answers reuse queries.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn VaultStore>,
    session: SessionManager,
}

impl HistoryService {
    pub fn new(store: Arc<dyn VaultStore>, session: SessionManager) -> Self {
        Self { store, session }
    }

    /// Record that `credential_id`'s password `old_password` was replaced.
    ///
    /// Requires an unlocked session. The encrypted blob and the hash are
    /// written in a single insert.
    pub async fn add_to_history(
        &self,
        user_id: &str,
        credential_id: &str,
        old_password: &str,
        reason: ChangeReason,
    ) -> Result<PasswordHistoryEntry> {
        require_non_empty("user_id", user_id)?;
        require_non_empty("credential_id", credential_id)?;
        if old_password.is_empty() {
            return Err(VaultError::validation("old_password", "must not be empty"));
        }

        let encrypted_old_password = self
            .session
            .encrypt_with_aad(old_password, &history_aad(credential_id))
            .await?;

        let entry = PasswordHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            credential_id: credential_id.to_string(),
            encrypted_old_password,
            password_hash: crypto::hash(old_password),
            change_reason: reason,
            changed_at: Utc::now(),
        };

        self.store.insert_history_entry(&entry).await?;

        #[cfg(feature = "metrics")]
        counter!(vault_metrics::HISTORY_ENTRIES_TOTAL, labels::REASON => reason.as_str())
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(credential_id, %reason, "password history entry recorded");

        Ok(entry)
    }

    /// Whether `password_hash` appears in the user's history, optionally
    /// ignoring one credential. No session required.
    pub async fn check_password_reuse(
        &self,
        user_id: &str,
        password_hash: &str,
        exclude_credential_id: Option<&str>,
    ) -> Result<bool> {
        require_non_empty("user_id", user_id)?;
        require_non_empty("password_hash", password_hash)?;

        let reused = self
            .store
            .query_history_by_hash(user_id, password_hash, exclude_credential_id)
            .await?;

        #[cfg(feature = "metrics")]
        if reused {
            counter!(vault_metrics::REUSE_DETECTED_TOTAL).increment(1);
        }

        Ok(reused)
    }

    /// Hash `password` and run [`check_password_reuse`](Self::check_password_reuse).
    pub async fn is_password_reused(
        &self,
        user_id: &str,
        password: &str,
        exclude_credential_id: Option<&str>,
    ) -> Result<bool> {
        self.check_password_reuse(user_id, &crypto::hash(password), exclude_credential_id)
            .await
    }

    /// History of one credential, newest first.
    pub async fn list_history(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> Result<Vec<PasswordHistoryEntry>> {
        require_non_empty("user_id", user_id)?;
        require_non_empty("credential_id", credential_id)?;
        Ok(self.store.list_history(user_id, credential_id).await?)
    }

    /// Decrypt an entry's old password through the active session.
    pub async fn reveal(&self, entry: &PasswordHistoryEntry) -> Result<String> {
        self.session
            .decrypt_with_aad(
                &entry.encrypted_old_password,
                &history_aad(&entry.credential_id),
            )
            .await
    }
}
