//! Pure session state machine: `(state, event) -> (next state, effects)`.
//! Nothing in here performs I/O; the session store feeds it events once the
//! provider/profile calls have settled and commits the result atomically.

use serde::{Deserialize, Serialize};

use super::effects::{Effect, Navigation, Notification};
use super::profile::Profile;
use super::role::Role;
use super::session::{Session, SessionToken};
use crate::routes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Initializing,
    Unauthenticated,
    Authenticated { session: Session, profile: Profile },
    DemoActive { profile: Profile },
}

impl AuthState {
    pub fn status(&self) -> AuthStatus {
        match self {
            AuthState::Initializing => AuthStatus::Initializing,
            AuthState::Unauthenticated => AuthStatus::Unauthenticated,
            AuthState::Authenticated { profile, .. } => AuthStatus::Authenticated(profile.role()),
            AuthState::DemoActive { profile } => AuthStatus::DemoActive(profile.role()),
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            AuthState::Authenticated { profile, .. } | AuthState::DemoActive { profile } => Some(profile),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn is_demo(&self) -> bool { matches!(self, AuthState::DemoActive { .. }) }

    fn holds_token(&self, token: &str) -> bool {
        self.session().map(|s| s.token == token).unwrap_or(false)
    }
}

/// Externally visible summary of the store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "role", rename_all = "snake_case")]
pub enum AuthStatus {
    Initializing,
    Unauthenticated,
    Authenticated(Role),
    DemoActive(Role),
}

impl AuthStatus {
    pub fn role(&self) -> Option<Role> {
        match self {
            AuthStatus::Authenticated(r) | AuthStatus::DemoActive(r) => Some(*r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    SignedOut,
    Expired,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Outcome of the initial session check.
    Resolved(Option<(Session, Profile)>),
    SignedIn { session: Session, profile: Profile, return_to: Option<String> },
    /// A sign-in performed elsewhere for this client (another tab).
    Adopted { session: Session, profile: Profile },
    SignOut,
    ProviderEnded { token: SessionToken, reason: EndReason },
    TokenRefreshed { previous_token: SessionToken, session: Session },
    Demo(Role),
    SwitchDemoRole(Role),
    ProfileSaved(Profile),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub next: AuthState,
    pub effects: Vec<Effect>,
    pub changed: bool,
}

impl Step {
    fn stay(state: &AuthState) -> Self {
        Step { next: state.clone(), effects: Vec::new(), changed: false }
    }

    fn to(next: AuthState, effects: Vec<Effect>) -> Self {
        Step { next, effects, changed: true }
    }
}

fn demo_notice(role: Role) -> Effect {
    Effect::Notify(
        Notification::success(format!("Demo Mode: {}", role))
            .describe(format!("You are viewing the app as a {} in demo mode.", role)),
    )
}

pub fn apply(state: &AuthState, event: Event) -> Step {
    match event {
        Event::Resolved(found) => {
            if !matches!(state, AuthState::Initializing) {
                return Step::stay(state);
            }
            match found {
                Some((session, profile)) => Step::to(AuthState::Authenticated { session, profile }, vec![]),
                None => Step::to(AuthState::Unauthenticated, vec![]),
            }
        }
        Event::SignedIn { session, profile, return_to } => {
            let target = return_to
                .filter(|p| routes::is_return_target(p))
                .unwrap_or_else(|| profile.role().home_route().to_string());
            let effects = vec![
                Effect::Navigate(Navigation::replace(target)),
                Effect::Notify(Notification::success("Signed in").describe(format!("Welcome back, {}", profile.display_name()))),
            ];
            Step::to(AuthState::Authenticated { session, profile }, effects)
        }
        Event::Adopted { session, profile } => {
            if !matches!(state, AuthState::Unauthenticated) {
                return Step::stay(state);
            }
            let note = Notification::info("Signed in").describe(format!("Signed in as {}", profile.display_name()));
            Step::to(AuthState::Authenticated { session, profile }, vec![Effect::Notify(note)])
        }
        Event::SignOut => match state {
            AuthState::Unauthenticated => Step::stay(state),
            AuthState::Initializing => Step::to(AuthState::Unauthenticated, vec![]),
            AuthState::Authenticated { .. } | AuthState::DemoActive { .. } => Step::to(
                AuthState::Unauthenticated,
                vec![
                    Effect::Navigate(Navigation::push(routes::LANDING)),
                    Effect::Notify(Notification::success("Signed out successfully")),
                ],
            ),
        },
        Event::ProviderEnded { token, reason } => {
            if !state.holds_token(&token) {
                return Step::stay(state);
            }
            let note = match reason {
                EndReason::SignedOut => Notification::info("Signed out").describe("Your session was ended."),
                EndReason::Expired => Notification::info("Session expired").describe("Please sign in again."),
            };
            Step::to(
                AuthState::Unauthenticated,
                vec![Effect::Navigate(Navigation::replace(routes::LANDING)), Effect::Notify(note)],
            )
        }
        Event::TokenRefreshed { previous_token, session } => match state {
            AuthState::Authenticated { session: current, profile }
                if current.token == previous_token && current.identity_id == session.identity_id =>
            {
                Step::to(AuthState::Authenticated { session, profile: profile.clone() }, vec![])
            }
            _ => Step::stay(state),
        },
        Event::Demo(role) => {
            // A real session is dropped without its own sign-out navigation.
            Step::to(
                AuthState::DemoActive { profile: Profile::demo(role) },
                vec![Effect::Navigate(Navigation::push(role.home_route())), demo_notice(role)],
            )
        }
        Event::SwitchDemoRole(role) => match state {
            AuthState::DemoActive { profile } if profile.role() != role => {
                Step::to(AuthState::DemoActive { profile: Profile::demo(role) }, vec![demo_notice(role)])
            }
            _ => Step::stay(state),
        },
        Event::ProfileSaved(saved) => match state {
            AuthState::Authenticated { session, profile } if profile.id() == saved.id() => Step::to(
                AuthState::Authenticated { session: session.clone(), profile: saved },
                vec![Effect::Notify(Notification::success("Profile updated"))],
            ),
            _ => Step::stay(state),
        },
    }
}
