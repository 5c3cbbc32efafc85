//! In-memory store for tests and embedding.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    history::PasswordHistoryEntry,
    store::{ProfileUpdate, StoreError, StoreResult, VaultProfile, VaultStore, apply_update},
};

/// In-memory store backed by `HashMap`. No persistence.
pub struct InMemoryStore {
    profiles: Mutex<HashMap<String, VaultProfile>>,
    history: Mutex<Vec<PasswordHistoryEntry>>,
    reject_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, simulating an unreachable backend.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of stored history entries across all users.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::message("store rejected write"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultStore for InMemoryStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<VaultProfile>> {
        let profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
        Ok(profiles.get(user_id).cloned())
    }

    async fn insert_profile(&self, user_id: &str, profile: &VaultProfile) -> StoreResult<bool> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
        match profiles.entry(user_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(true)
            },
        }
    }

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> StoreResult<()> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
        let profile = apply_update(profiles.get(user_id).cloned(), update)?;
        profiles.insert(user_id.to_string(), profile);
        Ok(())
    }

    async fn insert_history_entry(&self, entry: &PasswordHistoryEntry) -> StoreResult<()> {
        self.check_writable()?;
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(entry.clone());
        Ok(())
    }

    async fn query_history_by_hash(
        &self,
        user_id: &str,
        password_hash: &str,
        exclude_credential_id: Option<&str>,
    ) -> StoreResult<bool> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        Ok(history.iter().any(|e| {
            e.user_id == user_id
                && e.password_hash == password_hash
                && exclude_credential_id != Some(e.credential_id.as_str())
        }))
    }

    async fn list_history(
        &self,
        user_id: &str,
        credential_id: &str,
    ) -> StoreResult<Vec<PasswordHistoryEntry>> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = history
            .iter()
            .filter(|e| e.user_id == user_id && e.credential_id == credential_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        Ok(entries)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    use crate::kdf::{Salt, test_params};

    fn profile(salt: Salt) -> VaultProfile {
        VaultProfile {
            salt,
            canary: None,
            kdf_params: test_params(),
        }
    }

    #[tokio::test]
    async fn insert_profile_only_once() {
        let store = InMemoryStore::new();
        let first = Salt::generate();

        assert!(store.insert_profile("alice", &profile(first)).await.unwrap());
        assert!(
            !store
                .insert_profile("alice", &profile(Salt::generate()))
                .await
                .unwrap()
        );
        assert_eq!(store.get_profile("alice").await.unwrap().unwrap().salt, first);
    }

    #[tokio::test]
    async fn salt_change_is_rejected() {
        let store = InMemoryStore::new();
        let salt = Salt::generate();
        store.insert_profile("alice", &profile(salt)).await.unwrap();

        let result = store
            .update_profile("alice", ProfileUpdate {
                salt: Some(Salt::generate()),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_profile("alice").await.unwrap().unwrap().salt, salt);
    }

    #[tokio::test]
    async fn rejected_writes_leave_no_profile() {
        let store = InMemoryStore::new();
        store.set_reject_writes(true);
        assert!(
            store
                .insert_profile("alice", &profile(Salt::generate()))
                .await
                .is_err()
        );
        assert!(store.get_profile("alice").await.unwrap().is_none());
    }
}
