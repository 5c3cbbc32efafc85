//! Zero-knowledge credential vault core.
//!
//! The master passphrase is stretched with Argon2id into a key that only ever
//! lives in process memory, inside a [`SessionManager`]. Vault data is sealed
//! with XChaCha20-Poly1305 into [`EncryptedRecord`]s; the backing
//! [`VaultStore`] sees nothing but salts, canaries, ciphertext and one-way
//! hashes. Trait-based [`Cipher`] design allows swapping the encryption
//! backend.

pub mod canary;
pub mod crypto;
pub mod error;
pub mod history;
pub mod kdf;
pub mod session;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod traits;
pub mod vault;
pub mod xchacha20;

pub use {
    crypto::EncryptedRecord,
    error::VaultError,
    history::{ChangeReason, HistoryService, PasswordHistoryEntry},
    kdf::{DerivedKey, KdfParams, Salt},
    session::{KeyHandle, SessionConfig, SessionEvent, SessionInfo, SessionManager},
    store::{ProfileUpdate, StoreError, VaultProfile, VaultStore},
    store_memory::InMemoryStore,
    store_sqlite::{SqliteStore, run_migrations},
    traits::Cipher,
    vault::{Vault, VaultStatus},
    xchacha20::XChaCha20Poly1305Cipher,
};
