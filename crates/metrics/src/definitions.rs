//! Metric name and label definitions.

/// Vault session and storage metrics
pub mod vault {
    /// Unlock attempts, successful or not
    pub const UNLOCK_ATTEMPTS_TOTAL: &str = "lockbox_vault_unlock_attempts_total";
    /// Unlocks rejected by the passphrase verifier
    pub const UNLOCK_FAILURES_TOTAL: &str = "lockbox_vault_unlock_failures_total";
    /// 1 while a session holds a key, 0 otherwise
    pub const SESSIONS_ACTIVE: &str = "lockbox_vault_sessions_active";
    /// Sessions ended by the inactivity timeout
    pub const SESSIONS_EXPIRED_TOTAL: &str = "lockbox_vault_sessions_expired_total";
    /// Values sealed through the session
    pub const ENCRYPT_TOTAL: &str = "lockbox_vault_encrypt_total";
    /// Records opened through the session
    pub const DECRYPT_TOTAL: &str = "lockbox_vault_decrypt_total";
    /// Records that failed authentication
    pub const DECRYPT_FAILURES_TOTAL: &str = "lockbox_vault_decrypt_failures_total";
    /// Argon2id derivation time in seconds
    pub const KDF_DURATION_SECONDS: &str = "lockbox_vault_kdf_duration_seconds";
    /// Password history entries written (label: reason)
    pub const HISTORY_ENTRIES_TOTAL: &str = "lockbox_vault_history_entries_total";
    /// Reuse checks that found a match
    pub const REUSE_DETECTED_TOTAL: &str = "lockbox_vault_reuse_detected_total";
}

/// Common label keys
pub mod labels {
    pub const REASON: &str = "reason";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Key derivation buckets (in seconds)
    /// Covers 10ms to 10s; interactive Argon2 settings land near the middle.
    pub static KDF_DURATION: Lazy<Vec<f64>> =
        Lazy::new(|| vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]);
}
