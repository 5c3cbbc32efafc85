//! Session manager: holds the derived key for a bounded, sliding lifetime.
//!
//! States are `Locked` (no [`ActiveSession`]) and `Unlocked`. Every key access
//! checks expiry lazily, slides the deadline forward and re-arms the expiry
//! timer. The timer is the only background task; it carries an epoch so a
//! stale timer can never lock a newer session.
//!
//! Unlock attempts take a generation number before the slow derivation runs.
//! If another unlock or a `lock()` bumps the generation in the meantime, the
//! finished derivation is discarded instead of being installed.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    tokio::{
        sync::{Mutex, broadcast},
        task::JoinHandle,
        time::Instant,
    },
};

#[cfg(feature = "metrics")]
use lockbox_metrics::{counter, gauge, vault as vault_metrics};

use crate::{
    canary,
    crypto::{self, EncryptedRecord},
    error::{Result, VaultError},
    kdf::{self, DerivedKey, KdfParams, Salt},
    traits::Cipher,
    xchacha20::XChaCha20Poly1305Cipher,
};

/// Default idle timeout before the vault locks itself.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Upper bound for any single window so deadline arithmetic cannot overflow.
const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Timer resolution; the expiry timer wakes this long after the deadline.
const TIMER_SLACK: Duration = Duration::from_millis(1);

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding idle window. Each key access pushes expiry to `now + timeout`.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Notifications for the consuming layer. Delivery is best effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Unlocked,
    /// Locked on request.
    Locked,
    /// Locked because the idle window elapsed.
    Expired,
}

/// Read-only snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionInfo {
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub time_remaining: Duration,
}

impl SessionInfo {
    fn inactive() -> Self {
        Self {
            is_active: false,
            expires_at: None,
            last_activity: None,
            time_remaining: Duration::ZERO,
        }
    }
}

struct ActiveSession {
    /// Identifies this session for [`KeyHandle`]s; unique per manager.
    id: u64,
    key: Arc<DerivedKey>,
    deadline: Instant,
    expires_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl ActiveSession {
    fn slide(&mut self, window: Duration) {
        let now = Utc::now();
        let window = window.min(MAX_WINDOW);
        self.deadline = Instant::now() + window;
        self.expires_at = chrono::Duration::from_std(window)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.last_activity = now;
    }

    /// Strictly past the deadline; at the deadline itself the key is usable.
    fn is_expired(&self) -> bool {
        Instant::now() > self.deadline
    }
}

#[derive(Default)]
struct SessionState {
    /// Bumped by every unlock attempt and every lock.
    generation: u64,
    /// Bumped only when a session is installed.
    last_session_id: u64,
    session: Option<ActiveSession>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is re-armed or cancelled.
    timer_epoch: u64,
}

struct Shared {
    config: SessionConfig,
    cipher: Box<dyn Cipher>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Drop the session (wiping our key reference) and cancel the timer.
    ///
    /// Returns whether a session was actually ended.
    fn end_session(&self, state: &mut SessionState) -> bool {
        state.generation += 1;
        state.timer_epoch += 1;
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        let ended = state.session.take().is_some();
        #[cfg(feature = "metrics")]
        if ended {
            gauge!(vault_metrics::SESSIONS_ACTIVE).set(0.0);
        }
        ended
    }

    fn expire(&self, state: &mut SessionState) {
        if self.end_session(state) {
            #[cfg(feature = "metrics")]
            counter!(vault_metrics::SESSIONS_EXPIRED_TOTAL).increment(1);
            #[cfg(feature = "tracing")]
            tracing::info!("vault session expired");
            self.emit(SessionEvent::Expired);
        }
    }

    /// Cancel any pending timer and schedule a new one just past the session
    /// deadline.
    fn arm_timer(self: &Arc<Self>, state: &mut SessionState) {
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        state.timer_epoch += 1;

        let Some(deadline) = state.session.as_ref().map(|s| s.deadline) else {
            return;
        };
        let epoch = state.timer_epoch;
        let shared: Weak<Self> = Arc::downgrade(self);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline + TIMER_SLACK).await;
            if let Some(shared) = shared.upgrade() {
                shared.on_timer(epoch).await;
            }
        }));
    }

    async fn on_timer(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.timer_epoch != epoch {
            return;
        }
        // The handle belongs to the task running right now; detach it.
        state.timer.take();
        if state.session.as_ref().is_some_and(ActiveSession::is_expired) {
            self.expire(&mut state);
        }
    }
}

/// Owner of the in-memory derived key.
///
/// Cheap to clone; clones share one session. Construct one per vault at the
/// composition root and pass it to whoever needs encryption.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a locked session manager using XChaCha20-Poly1305.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_cipher(config, XChaCha20Poly1305Cipher)
    }

    pub fn with_cipher<C: Cipher + 'static>(config: SessionConfig, cipher: C) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                cipher: Box::new(cipher),
                state: Mutex::new(SessionState::default()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Subscribe to unlock/lock/expiry notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Derive the key and open a session.
    ///
    /// With a `canary`, the derived key must open it first; otherwise the
    /// attempt fails with [`VaultError::InvalidPassphrase`], any previous
    /// session is discarded and nothing is retained. Without a canary (first
    /// setup) the session opens unconditionally and the caller must create
    /// the canary afterwards.
    pub async fn initialize_session(
        &self,
        passphrase: &str,
        salt: &Salt,
        params: &KdfParams,
        canary: Option<&EncryptedRecord>,
    ) -> Result<SessionInfo> {
        let generation = {
            let mut state = self.shared.state.lock().await;
            state.generation += 1;
            state.generation
        };

        #[cfg(feature = "metrics")]
        counter!(vault_metrics::UNLOCK_ATTEMPTS_TOTAL).increment(1);

        let key = kdf::derive_key(passphrase, salt, params).await?;
        let verified =
            canary.is_none_or(|c| canary::verify_key_with(self.shared.cipher.as_ref(), &key, c));

        let mut state = self.shared.state.lock().await;
        if state.generation != generation {
            #[cfg(feature = "tracing")]
            tracing::debug!("discarding superseded unlock attempt");
            return Err(VaultError::Superseded);
        }

        if !verified {
            let ended = self.shared.end_session(&mut state);
            drop(state);
            if ended {
                self.shared.emit(SessionEvent::Locked);
            }
            #[cfg(feature = "metrics")]
            counter!(vault_metrics::UNLOCK_FAILURES_TOTAL).increment(1);
            #[cfg(feature = "tracing")]
            tracing::warn!("vault unlock rejected");
            return Err(VaultError::InvalidPassphrase);
        }

        state.last_session_id += 1;
        let now = Utc::now();
        let mut session = ActiveSession {
            id: state.last_session_id,
            key: Arc::new(key),
            deadline: Instant::now(),
            expires_at: now,
            last_activity: now,
        };
        session.slide(self.shared.config.timeout);
        state.session = Some(session);
        self.shared.arm_timer(&mut state);
        let info = snapshot(&state);
        drop(state);

        #[cfg(feature = "metrics")]
        gauge!(vault_metrics::SESSIONS_ACTIVE).set(1.0);
        #[cfg(feature = "tracing")]
        tracing::info!(timeout_secs = self.shared.config.timeout.as_secs(), "vault unlocked");

        self.shared.emit(SessionEvent::Unlocked);
        Ok(info)
    }

    /// Fetch the key for one operation, renewing the session.
    ///
    /// `bound` pins the access to a specific session id. Unlock attempts in
    /// flight do not affect it; only installing or ending a session does.
    async fn acquire_key(&self, bound: Option<u64>) -> Result<Arc<DerivedKey>> {
        let mut state = self.shared.state.lock().await;

        let Some(session) = state.session.as_mut() else {
            return Err(VaultError::VaultLocked);
        };
        if session.is_expired() {
            self.shared.expire(&mut state);
            return Err(VaultError::VaultLocked);
        }
        if bound.is_some_and(|id| id != session.id) {
            return Err(VaultError::VaultLocked);
        }

        session.slide(self.shared.config.timeout);
        let key = Arc::clone(&session.key);
        self.shared.arm_timer(&mut state);
        Ok(key)
    }

    /// A capability to encrypt and decrypt with the current session's key.
    ///
    /// The handle never exposes key material and stops working as soon as
    /// this session ends, even if a new one is opened later.
    pub async fn key_handle(&self) -> Result<KeyHandle> {
        let state = self.shared.state.lock().await;
        match &state.session {
            Some(session) if !session.is_expired() => Ok(KeyHandle {
                manager: self.clone(),
                session_id: session.id,
            }),
            _ => Err(VaultError::VaultLocked),
        }
    }

    pub async fn encrypt(&self, plaintext: &str) -> Result<EncryptedRecord> {
        self.encrypt_with_aad(plaintext, "").await
    }

    pub async fn decrypt(&self, record: &EncryptedRecord) -> Result<String> {
        self.decrypt_with_aad(record, "").await
    }

    pub async fn encrypt_with_aad(&self, plaintext: &str, aad: &str) -> Result<EncryptedRecord> {
        self.encrypt_bound(None, plaintext, aad).await
    }

    pub async fn decrypt_with_aad(&self, record: &EncryptedRecord, aad: &str) -> Result<String> {
        self.decrypt_bound(None, record, aad).await
    }

    async fn encrypt_bound(
        &self,
        bound: Option<u64>,
        plaintext: &str,
        aad: &str,
    ) -> Result<EncryptedRecord> {
        let key = self.acquire_key(bound).await?;
        let record = crypto::encrypt_with(self.shared.cipher.as_ref(), plaintext, &key, aad)?;
        #[cfg(feature = "metrics")]
        counter!(vault_metrics::ENCRYPT_TOTAL).increment(1);
        Ok(record)
    }

    async fn decrypt_bound(
        &self,
        bound: Option<u64>,
        record: &EncryptedRecord,
        aad: &str,
    ) -> Result<String> {
        let key = self.acquire_key(bound).await?;
        let result = crypto::decrypt_with(self.shared.cipher.as_ref(), record, &key, aad);
        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => counter!(vault_metrics::DECRYPT_TOTAL).increment(1),
            Err(_) => counter!(vault_metrics::DECRYPT_FAILURES_TOTAL).increment(1),
        }
        result
    }

    /// Encrypt the canary constant under the session key.
    ///
    /// Used right after a first, canary-less [`initialize_session`](Self::initialize_session).
    pub async fn create_canary(&self) -> Result<EncryptedRecord> {
        let key = self.acquire_key(None).await?;
        canary::create_canary_with(self.shared.cipher.as_ref(), &key)
    }

    /// Reset expiry to `now + extra`, or the configured timeout when `None`.
    pub async fn extend_session(&self, extra: Option<Duration>) -> Result<SessionInfo> {
        let mut state = self.shared.state.lock().await;
        let Some(session) = state.session.as_mut() else {
            return Err(VaultError::VaultLocked);
        };
        if session.is_expired() {
            self.shared.expire(&mut state);
            return Err(VaultError::VaultLocked);
        }
        session.slide(extra.unwrap_or(self.shared.config.timeout));
        self.shared.arm_timer(&mut state);
        Ok(snapshot(&state))
    }

    /// Lock the vault. Idempotent.
    pub async fn lock(&self) {
        let mut state = self.shared.state.lock().await;
        let ended = self.shared.end_session(&mut state);
        drop(state);
        if ended {
            #[cfg(feature = "tracing")]
            tracing::info!("vault locked");
            self.shared.emit(SessionEvent::Locked);
        }
    }

    /// Force the expiry path now, emitting [`SessionEvent::Expired`] if a
    /// session was open.
    pub async fn expire_session(&self) {
        let mut state = self.shared.state.lock().await;
        self.shared.expire(&mut state);
    }

    /// Snapshot of the session. No side effects.
    pub async fn session_info(&self) -> SessionInfo {
        let state = self.shared.state.lock().await;
        snapshot(&state)
    }

    pub async fn is_active(&self) -> bool {
        self.session_info().await.is_active
    }
}

fn snapshot(state: &SessionState) -> SessionInfo {
    match &state.session {
        Some(s) if !s.is_expired() => SessionInfo {
            is_active: true,
            expires_at: Some(s.expires_at),
            last_activity: Some(s.last_activity),
            time_remaining: s.deadline.saturating_duration_since(Instant::now()),
        },
        _ => SessionInfo::inactive(),
    }
}

/// Encrypt/decrypt capability tied to one session.
#[derive(Clone)]
pub struct KeyHandle {
    manager: SessionManager,
    session_id: u64,
}

impl KeyHandle {
    pub async fn encrypt(&self, plaintext: &str) -> Result<EncryptedRecord> {
        self.manager
            .encrypt_bound(Some(self.session_id), plaintext, "")
            .await
    }

    pub async fn decrypt(&self, record: &EncryptedRecord) -> Result<String> {
        self.manager
            .decrypt_bound(Some(self.session_id), record, "")
            .await
    }

    pub async fn encrypt_with_aad(&self, plaintext: &str, aad: &str) -> Result<EncryptedRecord> {
        self.manager
            .encrypt_bound(Some(self.session_id), plaintext, aad)
            .await
    }

    pub async fn decrypt_with_aad(&self, record: &EncryptedRecord, aad: &str) -> Result<String> {
        self.manager
            .decrypt_bound(Some(self.session_id), record, aad)
            .await
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
