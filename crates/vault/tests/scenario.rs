#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use lockbox_vault::{
    ChangeReason, InMemoryStore, KdfParams, Salt, SessionConfig, SessionEvent, SessionManager,
    SqliteStore, Vault, VaultError, VaultStatus, canary, crypto, run_migrations,
};

fn cheap_kdf() -> KdfParams {
    KdfParams {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    }
}

#[tokio::test]
async fn unlock_encrypt_lock_walkthrough() {
    let salt = Salt::generate();
    let passphrase = "Tr0ub4dor&3";

    let setup_key = lockbox_vault::kdf::derive_key(passphrase, &salt, &cheap_kdf())
        .await
        .unwrap();
    let canary = canary::create_canary(&setup_key).unwrap();
    drop(setup_key);

    let session = SessionManager::new(SessionConfig::default());

    session
        .initialize_session(passphrase, &salt, &cheap_kdf(), Some(&canary))
        .await
        .unwrap();
    assert!(session.session_info().await.is_active);
    session.lock().await;

    let failed = session
        .initialize_session("wrong-pass", &salt, &cheap_kdf(), Some(&canary))
        .await;
    assert!(matches!(failed, Err(VaultError::InvalidPassphrase)));
    assert!(!session.session_info().await.is_active);

    session
        .initialize_session(passphrase, &salt, &cheap_kdf(), Some(&canary))
        .await
        .unwrap();
    let record = session.encrypt("hunter2").await.unwrap();
    assert_eq!(session.decrypt(&record).await.unwrap(), "hunter2");

    session.lock().await;
    assert!(matches!(
        session.decrypt(&record).await,
        Err(VaultError::VaultLocked)
    ));
}

#[tokio::test]
async fn vault_over_sqlite_with_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("lockbox.db")).await.unwrap());
    let vault = Vault::with_kdf_params(store.clone(), SessionConfig::default(), cheap_kdf());

    assert_eq!(vault.status("alice").await.unwrap(), VaultStatus::Uninitialized);
    vault.setup("alice", "Tr0ub4dor&3").await.unwrap();

    let history = vault.history();
    history
        .add_to_history("alice", "github", "hunter2", ChangeReason::Manual)
        .await
        .unwrap();
    history
        .add_to_history("alice", "gitlab", "correct horse", ChangeReason::Generated)
        .await
        .unwrap();

    assert!(
        history
            .is_password_reused("alice", "hunter2", Some("email"))
            .await
            .unwrap()
    );
    assert!(
        !history
            .is_password_reused("alice", "battery staple", None)
            .await
            .unwrap()
    );

    // Reopen the database with a fresh vault: the profile and history persist.
    vault.lock().await;
    let pool = store.pool().clone();
    run_migrations(&pool).await.unwrap();
    let reopened = Vault::with_kdf_params(
        Arc::new(SqliteStore::new(pool)),
        SessionConfig::default(),
        KdfParams::default(),
    );
    assert_eq!(reopened.status("alice").await.unwrap(), VaultStatus::Locked);
    reopened.unlock("alice", "Tr0ub4dor&3").await.unwrap();

    let entries = reopened.history().list_history("alice", "github").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].password_hash, crypto::hash("hunter2"));
    assert_eq!(reopened.history().reveal(&entries[0]).await.unwrap(), "hunter2");
}

#[tokio::test(start_paused = true)]
async fn idle_vault_locks_itself() {
    let store = Arc::new(InMemoryStore::new());
    let vault = Vault::with_kdf_params(
        store,
        SessionConfig {
            timeout: Duration::from_secs(300),
        },
        cheap_kdf(),
    );
    vault.setup("alice", "pw").await.unwrap();
    let mut events = vault.session().subscribe();

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(vault.status("alice").await.unwrap(), VaultStatus::Unlocked);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
    assert_eq!(vault.status("alice").await.unwrap(), VaultStatus::Locked);
    assert!(matches!(
        vault
            .history()
            .add_to_history("alice", "github", "old", ChangeReason::Expired)
            .await,
        Err(VaultError::VaultLocked)
    ));
}
