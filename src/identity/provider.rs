use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::role::Role;
use super::session::{Session, SessionManager, SessionToken};
use crate::error::AuthError;

/// Notifications pushed by the identity provider outside of explicit calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    TokenRefreshed { previous_token: SessionToken, session: Session },
    SignedOut { token: SessionToken },
    Expired { token: SessionToken },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignUpMetadata {
    pub full_name: String,
    pub user_type: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpReceipt {
    pub identity_id: String,
    pub email: String,
    pub requires_verification: bool,
}

/// Boundary to the external identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_up(&self, email: &str, password: &str, metadata: &SignUpMetadata) -> Result<SignUpReceipt, AuthError>;
    /// Best effort; a failure to reach the provider only leaves the remote token to expire.
    async fn sign_out(&self, token: &str);
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCost {
    Standard,
    /// Minimal Argon2 parameters for demo seeding and tests.
    Fast,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub session_ttl: Duration,
    pub require_verification: bool,
    pub max_failed_attempts: u32,
    pub lockout_window: Duration,
    pub hash_cost: HashCost,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60 * 60),
            require_verification: false,
            max_failed_attempts: 5,
            lockout_window: Duration::from_secs(60),
            hash_cost: HashCost::Standard,
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    id: String,
    email: String,
    password_hash: String,
    verified: bool,
}

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    window_start: Instant,
}

fn normalize_email(email: &str) -> String { email.trim().to_ascii_lowercase() }

fn hasher(cost: HashCost) -> Result<Argon2<'static>, AuthError> {
    match cost {
        HashCost::Standard => Ok(Argon2::default()),
        HashCost::Fast => {
            let params = Params::new(1024, 1, 1, None)
                .map_err(|e| AuthError::InvalidSignUp(format!("argon2 params: {}", e)))?;
            Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
        }
    }
}

fn hash_password(cost: HashCost, password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::InvalidSignUp(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::InvalidSignUp(e.to_string()))?;
    let phc = hasher(cost)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::InvalidSignUp(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    // Parameters are read back from the PHC string.
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Shared account directory: the in-process stand-in for the hosted identity
/// service. Every client-facing `LocalIdentityProvider` talks to one of these.
pub struct IdentityDirectory {
    config: DirectoryConfig,
    accounts: RwLock<HashMap<String, Account>>,
    attempts: Mutex<HashMap<String, Attempts>>,
    sessions: SessionManager,
    events: broadcast::Sender<SessionEvent>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl IdentityDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let sessions = SessionManager::with_ttl(config.session_ttl);
        Self {
            config,
            accounts: RwLock::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            sessions,
            events,
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &DirectoryConfig { &self.config }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

    fn emit(&self, ev: SessionEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(ev);
    }

    /// Simulate the provider being unreachable.
    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    /// Simulated network round-trip applied to every provider call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) async fn round_trip(&self) -> Result<(), AuthError> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::NetworkUnreachable("identity provider offline".into()));
        }
        Ok(())
    }

    /// Register an account. `id` pins the identity id (seeding); otherwise a v4 uuid is minted.
    pub fn register(
        &self,
        id: Option<&str>,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
        verified: bool,
    ) -> Result<SignUpReceipt, AuthError> {
        let key = normalize_email(email);
        if !key.contains('@') || !key.contains('.') {
            return Err(AuthError::InvalidSignUp(format!("'{}' is not an email address", email)));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::InvalidSignUp("password must be at least 6 characters".into()));
        }
        if metadata.full_name.trim().is_empty() {
            return Err(AuthError::InvalidSignUp("full name is required".into()));
        }
        if self.accounts.read().contains_key(&key) {
            return Err(AuthError::EmailTaken(key));
        }
        let password_hash = hash_password(self.config.hash_cost, password)?;
        let account = Account {
            id: id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            email: key.clone(),
            password_hash,
            verified: verified || !self.config.require_verification,
        };
        let receipt = SignUpReceipt {
            identity_id: account.id.clone(),
            email: key.clone(),
            requires_verification: !account.verified,
        };
        {
            let mut accounts = self.accounts.write();
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailTaken(key));
            }
            accounts.insert(key, account);
        }
        info!(target: "auth", identity = %receipt.identity_id, role = %metadata.user_type, "account registered");
        Ok(receipt)
    }

    pub fn verify_email(&self, email: &str) -> bool {
        match self.accounts.write().get_mut(&normalize_email(email)) {
            Some(acc) => { acc.verified = true; true }
            None => false,
        }
    }

    pub fn identity_id_for(&self, email: &str) -> Option<String> {
        self.accounts.read().get(&normalize_email(email)).map(|a| a.id.clone())
    }

    /// Check credentials and issue a session.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let key = normalize_email(email);
        let now = Instant::now();
        {
            let mut attempts = self.attempts.lock();
            if let Some(a) = attempts.get(&key).copied() {
                let elapsed = now.saturating_duration_since(a.window_start);
                if elapsed >= self.config.lockout_window {
                    attempts.remove(&key);
                } else if a.failures >= self.config.max_failed_attempts {
                    let retry = self.config.lockout_window - elapsed;
                    return Err(AuthError::RateLimited { retry_after_secs: retry.as_secs().max(1) });
                }
            }
        }
        let account = self.accounts.read().get(&key).cloned();
        let Some(account) = account.filter(|a| verify_password(&a.password_hash, password)) else {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(key.clone()).or_insert(Attempts { failures: 0, window_start: now });
            entry.failures += 1;
            debug!(target: "auth", email = %key, failures = entry.failures, "sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        };
        self.attempts.lock().remove(&key);
        if !account.verified {
            return Err(AuthError::Unverified);
        }
        Ok(self.sessions.issue(&account.id, &account.email))
    }

    pub fn validate(&self, token: &str) -> Option<Session> { self.sessions.validate(token) }

    pub fn refresh(&self, token: &str) -> Option<Session> {
        let session = self.sessions.refresh(token)?;
        self.emit(SessionEvent::TokenRefreshed { previous_token: token.to_string(), session: session.clone() });
        Some(session)
    }

    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.logout(token);
        if removed {
            self.emit(SessionEvent::SignedOut { token: token.to_string() });
        }
        removed
    }

    /// Sign an identity out everywhere.
    pub fn revoke_identity(&self, identity_id: &str) -> usize {
        let tokens = self.sessions.revoke_identity(identity_id);
        for token in tokens.iter() {
            self.emit(SessionEvent::SignedOut { token: token.clone() });
        }
        tokens.len()
    }

    /// Forget failed-attempt windows that have lapsed.
    pub fn prune_attempts(&self) -> usize {
        let now = Instant::now();
        let window = self.config.lockout_window;
        let mut attempts = self.attempts.lock();
        let before = attempts.len();
        attempts.retain(|_, a| now.saturating_duration_since(a.window_start) < window);
        before - attempts.len()
    }

    pub fn tracked_attempts(&self) -> usize { self.attempts.lock().len() }

    /// Purge expired sessions and stale rate-limit windows, announcing the
    /// expired sessions to subscribers.
    pub fn sweep_expired(&self) -> usize {
        self.prune_attempts();
        let expired = self.sessions.purge_expired();
        for s in expired.iter() {
            self.emit(SessionEvent::Expired { token: s.token.clone() });
        }
        expired.len()
    }

    /// Background ticker announcing expired sessions to subscribers.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let dir = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                let Some(dir) = dir.upgrade() else { break };
                let removed = dir.sweep_expired();
                if removed > 0 { debug!(target: "auth", removed = removed, "session_sweep"); }
            }
        })
    }

    fn emit_signed_in(&self, session: &Session) { self.emit(SessionEvent::SignedIn(session.clone())); }
}

/// Identity provider as seen by one client: the directory plus the token the
/// client has persisted (the browser-storage slot of a hosted auth SDK).
pub struct LocalIdentityProvider {
    directory: Arc<IdentityDirectory>,
    persisted: Mutex<Option<SessionToken>>,
}

impl LocalIdentityProvider {
    pub fn new(directory: Arc<IdentityDirectory>) -> Self {
        Self { directory, persisted: Mutex::new(None) }
    }

    pub fn directory(&self) -> &Arc<IdentityDirectory> { &self.directory }

    /// Rotate the persisted session token, as a hosted SDK does before expiry.
    pub async fn refresh_session(&self) -> Result<Option<Session>, AuthError> {
        self.directory.round_trip().await?;
        let Some(token) = self.persisted.lock().clone() else { return Ok(None) };
        let fresh = self.directory.refresh(&token);
        let mut slot = self.persisted.lock();
        if slot.as_deref() == Some(token.as_str()) {
            *slot = fresh.as_ref().map(|s| s.token.clone());
        }
        Ok(fresh)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.directory.round_trip().await?;
        let session = self.directory.authenticate(email, password)?;
        *self.persisted.lock() = Some(session.token.clone());
        self.directory.emit_signed_in(&session);
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: &SignUpMetadata) -> Result<SignUpReceipt, AuthError> {
        self.directory.round_trip().await?;
        self.directory.register(None, email, password, metadata, false)
    }

    async fn sign_out(&self, token: &str) {
        {
            let mut slot = self.persisted.lock();
            if slot.as_deref() == Some(token) {
                *slot = None;
            }
        }
        if let Err(e) = self.directory.round_trip().await {
            warn!(target: "auth", "sign-out could not reach provider: {}", e);
            return;
        }
        self.directory.revoke(token);
    }

    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        self.directory.round_trip().await?;
        let Some(token) = self.persisted.lock().clone() else { return Ok(None) };
        let session = self.directory.validate(&token);
        if session.is_none() {
            let mut slot = self.persisted.lock();
            if slot.as_deref() == Some(token.as_str()) {
                *slot = None;
            }
        }
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.directory.subscribe() }
}
