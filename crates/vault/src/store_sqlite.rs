//! SQLite-backed [`VaultStore`].

use {
    async_trait::async_trait,
    chrono::{DateTime, SecondsFormat, Utc},
    sqlx::SqlitePool,
};

use crate::{
    crypto::EncryptedRecord,
    history::{ChangeReason, PasswordHistoryEntry},
    kdf::{KdfParams, Salt},
    store::{ProfileUpdate, StoreError, StoreResult, VaultProfile, VaultStore, apply_update},
};

#[derive(sqlx::FromRow)]
struct ProfileRow {
    salt: String,
    canary_ciphertext: Option<String>,
    canary_iv: Option<String>,
    kdf_params: String,
}

impl TryFrom<ProfileRow> for VaultProfile {
    type Error = StoreError;

    fn try_from(r: ProfileRow) -> StoreResult<Self> {
        let salt = Salt::from_base64(&r.salt)
            .map_err(|e| StoreError::message(format!("corrupt salt: {e}")))?;
        let kdf_params: KdfParams = serde_json::from_str(&r.kdf_params)?;
        let canary = match (r.canary_ciphertext, r.canary_iv) {
            (Some(ciphertext), Some(iv)) => Some(EncryptedRecord { ciphertext, iv }),
            _ => None,
        };
        Ok(Self {
            salt,
            canary,
            kdf_params,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    user_id: String,
    credential_id: String,
    old_password_ct: String,
    old_password_iv: String,
    password_hash: String,
    change_reason: String,
    changed_at: String,
}

impl TryFrom<HistoryRow> for PasswordHistoryEntry {
    type Error = StoreError;

    fn try_from(r: HistoryRow) -> StoreResult<Self> {
        let change_reason: ChangeReason = r.change_reason.parse().map_err(StoreError::message)?;
        let changed_at = DateTime::parse_from_rfc3339(&r.changed_at)
            .map_err(|e| StoreError::message(format!("corrupt changed_at: {e}")))?
            .with_timezone(&Utc);
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            credential_id: r.credential_id,
            encrypted_old_password: EncryptedRecord {
                ciphertext: r.old_password_ct,
                iv: r.old_password_iv,
            },
            password_hash: r.password_hash,
            change_reason,
            changed_at,
        })
    }
}

/// SQLite store. Run [`run_migrations`] on the pool first.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and migrate it.
    pub async fn open(path: &std::path::Path) -> StoreResult<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create the `vault_profiles` and `password_history` tables.
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

fn canary_columns(canary: Option<&EncryptedRecord>) -> (Option<&str>, Option<&str>) {
    match canary {
        Some(c) => (Some(c.ciphertext.as_str()), Some(c.iv.as_str())),
        None => (None, None),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl VaultStore for SqliteStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<VaultProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT salt, canary_ciphertext, canary_iv, kdf_params
             FROM vault_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VaultProfile::try_from).transpose()
    }

    async fn insert_profile(&self, user_id: &str, profile: &VaultProfile) -> StoreResult<bool> {
        let params_json = serde_json::to_string(&profile.kdf_params)?;
        let (canary_ct, canary_iv) = canary_columns(profile.canary.as_ref());

        let result = sqlx::query(
            r#"INSERT INTO vault_profiles (user_id, salt, canary_ciphertext, canary_iv, kdf_params)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(user_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(profile.salt.to_base64())
        .bind(canary_ct)
        .bind(canary_iv)
        .bind(&params_json)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, ProfileRow>(
            "SELECT salt, canary_ciphertext, canary_iv, kdf_params
             FROM vault_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(VaultProfile::try_from)
        .transpose()?;

        let profile = apply_update(existing, update)?;
        let params_json = serde_json::to_string(&profile.kdf_params)?;
        let (canary_ct, canary_iv) = canary_columns(profile.canary.as_ref());

        sqlx::query(
            r#"INSERT INTO vault_profiles (user_id, salt, canary_ciphertext, canary_iv, kdf_params)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                 canary_ciphertext = excluded.canary_ciphertext,
                 canary_iv = excluded.canary_iv,
                 kdf_params = excluded.kdf_params,
                 updated_at = datetime('now')"#,
        )
        .bind(user_id)
        .bind(profile.salt.to_base64())
        .bind(canary_ct)
        .bind(canary_iv)
        .bind(&params_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_history_entry(&self, entry: &PasswordHistoryEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO password_history
               (id, user_id, credential_id, old_password_ct, old_password_iv,
                password_hash, change_reason, changed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.credential_id)
        .bind(&entry.encrypted_old_password.ciphertext)
        .bind(&entry.encrypted_old_password.iv)
        .bind(&entry.password_hash)
        .bind(entry.change_reason.as_str())
        .bind(timestamp(&entry.changed_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_history_by_hash(
        &self,
        user_id: &str,
        password_hash: &str,
        exclude_credential_id: Option<&str>,
    ) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(
               SELECT 1 FROM password_history
               WHERE user_id = ? AND password_hash = ?
                 AND (? IS NULL OR credential_id <> ?)
             )",
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(exclude_credential_id)
        .bind(exclude_credential_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn list_history(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> StoreResult<Vec<PasswordHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, user_id, credential_id, old_password_ct, old_password_iv,
                    password_hash, change_reason, changed_at
             FROM password_history
             WHERE user_id = ? AND credential_id = ?
             ORDER BY changed_at DESC",
        )
        .bind(user_id)
        .bind(credential_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PasswordHistoryEntry::try_from).collect()
    }
}
