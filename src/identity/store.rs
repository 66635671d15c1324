//! Session store: the single owner of the Session / Profile / demo triple.
//!
//! Every mutation funnels through `commit`, which runs `machine::apply` under
//! the state lock. The lock is never held across an `.await`: network calls
//! happen first, then the result is committed in one step. Each user intent
//! bumps an epoch; completions whose captured epoch is no longer current are
//! discarded, so the most recent intent wins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::effects::{Effect, EffectSink, Notification};
use super::machine::{self, AuthState, AuthStatus, EndReason, Event};
use super::profile::{Profile, ProfilePatch};
use super::profile_store::ProfileStore;
use super::provider::{IdentityProvider, SessionEvent, SignUpMetadata, SignUpReceipt};
use super::role::Role;
use super::session::Session;
use crate::error::SessionError;
use crate::guard::{self, GuardDecision, RouteRequirement, Verdict};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on the initial session check before degrading to signed out.
    pub session_check_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self { Self { session_check_timeout: Duration::from_secs(5) } }
}

/// Read-only view handed to guards, layouts and views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub status: AuthStatus,
    pub profile: Option<Profile>,
    pub is_demo_mode: bool,
    pub has_session: bool,
    /// An explicit action is waiting on the network.
    pub busy: bool,
}

impl AuthSnapshot {
    pub fn role(&self) -> Option<Role> { self.status.role() }
}

/// Result of a successful action: the status it settled in and the effects it emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: AuthStatus,
    pub effects: Vec<Effect>,
}

struct Inner {
    state: AuthState,
    epoch: u64,
}

struct Committed {
    effects: Vec<Effect>,
    /// Real session the transition removed, still live at the provider.
    dropped: Option<Session>,
}

/// Handle for the provider event listener; aborting it unsubscribes.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) { self.handle.abort(); }

    pub fn is_active(&self) -> bool { !self.handle.is_finished() }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

pub struct SessionStore {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    sink: Arc<dyn EffectSink>,
    config: StoreConfig,
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionStore {
    /// Build a store in `Initializing` and register the provider subscription.
    /// Must be called inside a Tokio runtime.
    pub fn create(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        sink: Arc<dyn EffectSink>,
        config: StoreConfig,
    ) -> Arc<Self> {
        let rx = identity.subscribe();
        let store = Arc::new(Self {
            identity,
            profiles,
            sink,
            config,
            inner: Mutex::new(Inner { state: AuthState::Initializing, epoch: 0 }),
            in_flight: AtomicUsize::new(0),
            subscription: Mutex::new(None),
        });
        let handle = tokio::spawn(listen(Arc::downgrade(&store), rx));
        *store.subscription.lock() = Some(Subscription { handle });
        store
    }

    /// Tear down the provider subscription. Idempotent.
    pub fn dispose(&self) {
        if let Some(sub) = self.subscription.lock().take() {
            sub.unsubscribe();
            debug!(target: "session", "session store disposed");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().as_ref().map(Subscription::is_active).unwrap_or(false)
    }

    pub fn status(&self) -> AuthStatus { self.inner.lock().state.status() }

    pub fn snapshot(&self) -> AuthSnapshot {
        let inner = self.inner.lock();
        AuthSnapshot {
            status: inner.state.status(),
            profile: inner.state.profile().cloned(),
            is_demo_mode: inner.state.is_demo(),
            has_session: inner.state.session().is_some(),
            busy: self.in_flight.load(Ordering::SeqCst) > 0,
        }
    }

    /// Current real session, if any.
    pub fn session(&self) -> Option<Session> { self.inner.lock().state.session().cloned() }

    fn epoch(&self) -> u64 { self.inner.lock().epoch }

    /// Record a new user intent, superseding anything still in flight.
    fn begin_intent(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.epoch
    }

    /// Apply `event` if `expected_epoch` is still current (or unconditionally
    /// when `None`). Returns `None` when the commit was stale.
    fn commit(&self, expected_epoch: Option<u64>, bump: bool, event: Event) -> Option<Committed> {
        let committed = {
            let mut inner = self.inner.lock();
            if let Some(e) = expected_epoch {
                if inner.epoch != e {
                    return None;
                }
            }
            let step = machine::apply(&inner.state, event);
            if bump {
                inner.epoch += 1;
            }
            let mut dropped = None;
            if step.changed {
                debug!(target: "session", from = ?inner.state.status(), to = ?step.next.status(), "transition");
                let kept = step.next.session().map(|s| s.session_id.as_str());
                dropped = inner.state.session().filter(|s| Some(s.session_id.as_str()) != kept).cloned();
                inner.state = step.next;
            }
            Committed { effects: step.effects, dropped }
        };
        self.sink.dispatch(&committed.effects);
        Some(committed)
    }

    fn outcome(&self, effects: Vec<Effect>) -> Outcome {
        Outcome { status: self.status(), effects }
    }

    fn report(&self, note: Notification) {
        self.sink.notify(&note);
    }

    /// Resolve the persisted session, if any. Degrades to `Unauthenticated` on
    /// error or after `session_check_timeout`.
    pub async fn initialize(&self) -> AuthStatus {
        let epoch = self.epoch();
        if !matches!(self.status(), AuthStatus::Initializing) {
            return self.status();
        }
        let check = async {
            let Some(session) = self.identity.current_session().await? else { return Ok(None) };
            let profile = self.profiles.get_profile(&session.identity_id).await?;
            Ok::<_, SessionError>(Some((session, profile)))
        };
        let resolved = match tokio::time::timeout(self.config.session_check_timeout, check).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(target: "session", "initial session check failed: {}", e);
                None
            }
            Err(_) => {
                warn!(target: "session", timeout_ms = self.config.session_check_timeout.as_millis() as u64, "initial session check timed out");
                None
            }
        };
        if self.commit(Some(epoch), false, Event::Resolved(resolved)).is_none() {
            // A newer intent owns the outcome, but it may have failed without
            // leaving Initializing. `Resolved` only applies from Initializing.
            debug!(target: "session", "initial session check superseded");
            self.commit(None, false, Event::Resolved(None));
        }
        self.status()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Outcome, SessionError> {
        self.sign_in_returning(email, password, None).await
    }

    /// Sign in and navigate to `return_to` (the path the guard bounced from)
    /// instead of the role home.
    pub async fn sign_in_returning(
        &self,
        email: &str,
        password: &str,
        return_to: Option<String>,
    ) -> Result<Outcome, SessionError> {
        let _busy = InFlight::enter(&self.in_flight);
        let epoch = self.begin_intent();
        let session = match self.identity.sign_in(email, password).await {
            Ok(s) => s,
            Err(e) => {
                info!(target: "session", code = e.code(), "sign-in failed");
                self.report(Notification::error("Sign in failed").describe(e.to_string()));
                return Err(e.into());
            }
        };
        if self.epoch() != epoch {
            self.discard(&session).await;
            return Err(SessionError::Superseded);
        }
        let profile = match self.profiles.get_profile(&session.identity_id).await {
            Ok(p) => p,
            Err(e) => {
                // Roll back: the identity is valid but unusable without its profile.
                self.identity.sign_out(&session.token).await;
                self.report(Notification::error("Could not load your profile").describe(e.to_string()));
                return Err(e.into());
            }
        };
        let event = Event::SignedIn { session: session.clone(), profile, return_to };
        match self.commit(Some(epoch), false, event) {
            Some(c) => {
                info!(target: "session", identity = %session.identity_id, "signed in");
                if let Some(old) = c.dropped {
                    self.identity.sign_out(&old.token).await;
                }
                Ok(self.outcome(c.effects))
            }
            None => {
                self.discard(&session).await;
                Err(SessionError::Superseded)
            }
        }
    }

    async fn discard(&self, session: &Session) {
        debug!(target: "session", identity = %session.identity_id, "discarding superseded sign-in");
        self.identity.sign_out(&session.token).await;
    }

    /// Register a new identity and its profile row. Does not sign in.
    pub async fn sign_up(&self, email: &str, password: &str, metadata: SignUpMetadata) -> Result<SignUpReceipt, SessionError> {
        let _busy = InFlight::enter(&self.in_flight);
        let receipt = match self.identity.sign_up(email, password, &metadata).await {
            Ok(r) => r,
            Err(e) => {
                self.report(Notification::error("Sign up failed").describe(e.to_string()));
                return Err(e.into());
            }
        };
        let profile = Profile::new(
            receipt.identity_id.clone(),
            metadata.user_type,
            Some(metadata.full_name.clone()),
            Some(receipt.email.clone()),
        );
        if let Err(e) = self.profiles.insert_profile(profile).await {
            self.report(Notification::error("Sign up failed").describe(e.to_string()));
            return Err(e.into());
        }
        let note = Notification::success("Account created");
        self.report(if receipt.requires_verification {
            note.describe("Check your email to verify your account before signing in.")
        } else {
            note
        });
        Ok(receipt)
    }

    /// Clear session, profile and demo flag. A no-op when already signed out,
    /// but still cancels any sign-in in flight.
    pub async fn sign_out(&self) -> Outcome {
        let Some(c) = self.commit(None, true, Event::SignOut) else { return self.outcome(Vec::new()) };
        if let Some(session) = c.dropped {
            self.identity.sign_out(&session.token).await;
        }
        self.outcome(c.effects)
    }

    /// Enter demo mode as `role`, dropping any real session first.
    pub async fn set_demo_mode(&self, role: Role) -> Outcome {
        let Some(c) = self.commit(None, true, Event::Demo(role)) else { return self.outcome(Vec::new()) };
        if let Some(session) = c.dropped {
            self.identity.sign_out(&session.token).await;
        }
        info!(target: "session", role = %role, "demo mode");
        self.outcome(c.effects)
    }

    /// Persist a partial profile update, then refresh the cached profile.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Outcome, SessionError> {
        let (epoch, identity_id) = {
            let inner = self.inner.lock();
            match &inner.state {
                AuthState::Authenticated { profile, .. } => (inner.epoch, profile.id().to_string()),
                AuthState::DemoActive { .. } => return Err(SessionError::DemoMode),
                _ => return Err(SessionError::NotAuthenticated),
            }
        };
        let _busy = InFlight::enter(&self.in_flight);
        let saved = match self.profiles.update_profile(&identity_id, &patch).await {
            Ok(p) => p,
            Err(e) => {
                self.report(Notification::error("Profile update failed").describe(e.to_string()));
                return Err(e.into());
            }
        };
        match self.commit(Some(epoch), false, Event::ProfileSaved(saved)) {
            Some(c) => Ok(self.outcome(c.effects)),
            None => Err(SessionError::Superseded),
        }
    }

    /// Sign out locally if the session has lapsed without an expiry event.
    fn expire_if_due(&self) {
        let token = match self.session() {
            Some(s) if s.is_expired() => s.token,
            _ => return,
        };
        self.commit(None, true, Event::ProviderEnded { token, reason: EndReason::Expired });
    }

    /// Evaluate the route guard for a navigation to `path`.
    pub fn guard(&self, path: &str, requirement: &RouteRequirement) -> GuardDecision {
        self.expire_if_due();
        match guard::decide(self.status(), requirement, path) {
            Verdict::Decide(decision) => decision,
            Verdict::SwitchDemo(role) => {
                self.commit(None, true, Event::SwitchDemoRole(role));
                debug!(target: "guard", path = %path, role = %role, "demo persona switched");
                GuardDecision::Allow
            }
        }
    }

    async fn on_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedOut { token } => {
                self.commit_if_holds(&token, EndReason::SignedOut);
            }
            SessionEvent::Expired { token } => {
                self.commit_if_holds(&token, EndReason::Expired);
            }
            SessionEvent::TokenRefreshed { previous_token, session } => {
                self.commit(None, false, Event::TokenRefreshed { previous_token, session });
            }
            SessionEvent::SignedIn(session) => self.adopt(session).await,
        }
    }

    fn commit_if_holds(&self, token: &str, reason: EndReason) {
        let holds = self.session().map(|s| s.token == token).unwrap_or(false);
        if holds {
            self.commit(None, true, Event::ProviderEnded { token: token.to_string(), reason });
        }
    }

    /// Take over a sign-in completed elsewhere for this client.
    async fn adopt(&self, session: Session) {
        if self.in_flight.load(Ordering::SeqCst) > 0 || !matches!(self.status(), AuthStatus::Unauthenticated) {
            return;
        }
        let epoch = self.epoch();
        let Ok(Some(current)) = self.identity.current_session().await else { return };
        if current.token != session.token {
            return;
        }
        let profile = match self.profiles.get_profile(&session.identity_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "session", "could not load profile for external sign-in: {}", e);
                return;
            }
        };
        self.commit(Some(epoch), false, Event::Adopted { session, profile });
    }

    /// Re-derive state from the provider after missing events.
    async fn resync(&self) {
        let Some(held) = self.session() else { return };
        let epoch = self.epoch();
        match self.identity.current_session().await {
            Ok(Some(s)) if s.token == held.token => {}
            Ok(Some(s)) if s.identity_id == held.identity_id => {
                self.commit(Some(epoch), false, Event::TokenRefreshed { previous_token: held.token, session: s });
            }
            Ok(_) => {
                self.commit(Some(epoch), true, Event::ProviderEnded { token: held.token, reason: EndReason::SignedOut });
            }
            Err(e) => warn!(target: "session", "resync failed: {}", e),
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.get_mut().take() {
            sub.unsubscribe();
        }
    }
}

async fn listen(store: Weak<SessionStore>, mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        let received = rx.recv().await;
        let Some(store) = store.upgrade() else { break };
        match received {
            Ok(ev) => store.on_session_event(ev).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "session", skipped = skipped, "session events lagged; resyncing");
                store.resync().await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}
