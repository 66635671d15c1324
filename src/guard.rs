//! Route guard: decides whether a navigation target may be shown for the
//! current session status. Stateless; the session store applies the one
//! mutation it can ask for (switching the demo persona).

use serde::{Deserialize, Serialize};

use crate::identity::{AuthStatus, Role};
use crate::routes;

/// Access requirement declared by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequirement {
    pub required_auth: bool,
    #[serde(default)]
    pub required_role: Option<Role>,
}

impl RouteRequirement {
    pub const PUBLIC: RouteRequirement = RouteRequirement { required_auth: false, required_role: None };
    pub const SIGNED_IN: RouteRequirement = RouteRequirement { required_auth: true, required_role: None };

    pub const fn role(role: Role) -> Self {
        RouteRequirement { required_auth: true, required_role: Some(role) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub path: String,
    /// Requested path, carried to the login flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    RedirectTo(Redirect),
    ShowLoading,
}

impl GuardDecision {
    pub fn is_allow(&self) -> bool { matches!(self, GuardDecision::Allow) }

    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            GuardDecision::RedirectTo(r) => Some(r.path.as_str()),
            _ => None,
        }
    }
}

/// Raw guard output before the store has applied any demo switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Decide(GuardDecision),
    /// Demo session on a route for the other role: switch persona, then allow.
    SwitchDemo(Role),
}

pub fn decide(status: AuthStatus, requirement: &RouteRequirement, path: &str) -> Verdict {
    let role = match status {
        AuthStatus::Initializing => return Verdict::Decide(GuardDecision::ShowLoading),
        AuthStatus::Unauthenticated => {
            if requirement.required_auth {
                return Verdict::Decide(GuardDecision::RedirectTo(Redirect {
                    path: routes::LOGIN.to_string(),
                    from: Some(path.to_string()),
                    replace: true,
                }));
            }
            return Verdict::Decide(GuardDecision::Allow);
        }
        AuthStatus::Authenticated(r) | AuthStatus::DemoActive(r) => r,
    };
    match requirement.required_role {
        Some(required) if required != role => {
            if matches!(status, AuthStatus::DemoActive(_)) {
                Verdict::SwitchDemo(required)
            } else {
                Verdict::Decide(GuardDecision::RedirectTo(Redirect {
                    path: role.home_route().to_string(),
                    from: None,
                    replace: true,
                }))
            }
        }
        _ => Verdict::Decide(GuardDecision::Allow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_ONLY: RouteRequirement = RouteRequirement::role(Role::Provider);

    #[test]
    fn initializing_shows_loading_everywhere() {
        for req in [RouteRequirement::PUBLIC, RouteRequirement::SIGNED_IN, PROVIDER_ONLY] {
            assert_eq!(decide(AuthStatus::Initializing, &req, "/x"), Verdict::Decide(GuardDecision::ShowLoading));
        }
    }

    #[test]
    fn unauthenticated_goes_to_login_with_origin() {
        let v = decide(AuthStatus::Unauthenticated, &RouteRequirement::SIGNED_IN, "/records");
        assert_eq!(
            v,
            Verdict::Decide(GuardDecision::RedirectTo(Redirect {
                path: "/login".into(),
                from: Some("/records".into()),
                replace: true,
            }))
        );
        assert_eq!(decide(AuthStatus::Unauthenticated, &RouteRequirement::PUBLIC, "/"), Verdict::Decide(GuardDecision::Allow));
    }

    #[test]
    fn authenticated_role_mismatch_redirects_home() {
        let v = decide(AuthStatus::Authenticated(Role::Patient), &PROVIDER_ONLY, "/schedule");
        match v {
            Verdict::Decide(d) => assert_eq!(d.redirect_path(), Some("/dashboard")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn demo_role_mismatch_switches_persona() {
        assert_eq!(decide(AuthStatus::DemoActive(Role::Patient), &PROVIDER_ONLY, "/provider"), Verdict::SwitchDemo(Role::Provider));
        assert_eq!(
            decide(AuthStatus::DemoActive(Role::Provider), &PROVIDER_ONLY, "/provider"),
            Verdict::Decide(GuardDecision::Allow)
        );
    }

    #[test]
    fn role_routes_allow_matching_role() {
        let v = decide(AuthStatus::Authenticated(Role::Provider), &PROVIDER_ONLY, "/patients");
        assert_eq!(v, Verdict::Decide(GuardDecision::Allow));
        let v = decide(AuthStatus::Authenticated(Role::Provider), &RouteRequirement::SIGNED_IN, "/messages");
        assert_eq!(v, Verdict::Decide(GuardDecision::Allow));
    }
}
