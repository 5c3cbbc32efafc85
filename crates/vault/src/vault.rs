//! Vault facade: profile setup, unlock against the stored canary, lock.

use std::sync::Arc;

use crate::{
    error::{Result, VaultError},
    history::HistoryService,
    kdf::{KdfParams, Salt},
    session::{SessionConfig, SessionInfo, SessionManager},
    store::{VaultProfile, VaultStore},
};

/// Vault status exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    /// No profile yet: the user never set a master passphrase.
    Uninitialized,
    /// Profile exists but no key is held in memory.
    Locked,
    /// A session is active.
    Unlocked,
}

/// One user's vault on one client.
///
/// Owns the [`SessionManager`] and hands out the [`HistoryService`] that shares
/// it. Build one at the composition root; nothing here is global.
pub struct Vault {
    store: Arc<dyn VaultStore>,
    session: SessionManager,
    history: HistoryService,
    kdf_params: KdfParams,
}

impl Vault {
    pub fn new(store: Arc<dyn VaultStore>, config: SessionConfig) -> Self {
        Self::with_kdf_params(store, config, KdfParams::default())
    }

    /// `kdf_params` only applies to vaults created by [`setup`](Self::setup);
    /// existing vaults keep the parameters stored in their profile.
    pub fn with_kdf_params(
        store: Arc<dyn VaultStore>,
        config: SessionConfig,
        kdf_params: KdfParams,
    ) -> Self {
        let session = SessionManager::new(config);
        let history = HistoryService::new(Arc::clone(&store), session.clone());
        Self {
            store,
            session,
            history,
            kdf_params,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub async fn status(&self, user_id: &str) -> Result<VaultStatus> {
        if self.store.get_profile(user_id).await?.is_none() {
            return Ok(VaultStatus::Uninitialized);
        }
        if self.session.is_active().await {
            Ok(VaultStatus::Unlocked)
        } else {
            Ok(VaultStatus::Locked)
        }
    }

    /// Create the vault: fresh salt, first session, canary, persisted profile.
    ///
    /// The profile is written once, complete, and only if none exists yet.
    /// On success the session is left unlocked; on any failure it is locked.
    pub async fn setup(&self, user_id: &str, passphrase: &str) -> Result<SessionInfo> {
        if user_id.trim().is_empty() {
            return Err(VaultError::validation("user_id", "must not be empty"));
        }
        if passphrase.is_empty() {
            return Err(VaultError::validation("passphrase", "must not be empty"));
        }
        if self.store.get_profile(user_id).await?.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }

        let salt = Salt::generate();
        let info = self
            .session
            .initialize_session(passphrase, &salt, &self.kdf_params, None)
            .await?;

        if let Err(e) = self.create_profile(user_id, salt).await {
            self.session.lock().await;
            #[cfg(feature = "tracing")]
            tracing::warn!(user_id, error = %e, "vault setup failed");
            return Err(e);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(user_id, "vault initialized");

        Ok(info)
    }

    /// Unlock with the master passphrase, verified against the stored canary.
    ///
    /// A profile without a canary has no way to check the passphrase and is
    /// treated as not initialized.
    pub async fn unlock(&self, user_id: &str, passphrase: &str) -> Result<SessionInfo> {
        let profile = self
            .store
            .get_profile(user_id)
            .await?
            .ok_or(VaultError::NotInitialized)?;

        let Some(canary) = profile.canary.as_ref() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(user_id, "refusing to unlock a profile without a canary");
            return Err(VaultError::NotInitialized);
        };

        self.session
            .initialize_session(passphrase, &profile.salt, &profile.kdf_params, Some(canary))
            .await
    }

    pub async fn lock(&self) {
        self.session.lock().await;
    }

    async fn create_profile(&self, user_id: &str, salt: Salt) -> Result<()> {
        let profile = VaultProfile {
            salt,
            canary: Some(self.session.create_canary().await?),
            kdf_params: self.kdf_params.clone(),
        };
        if !self.store.insert_profile(user_id, &profile).await? {
            return Err(VaultError::AlreadyInitialized);
        }
        Ok(())
    }
}
