//! Route declarations and the role-specific bottom navigation.

use serde::Serialize;

use crate::guard::RouteRequirement;
use crate::identity::Role;

pub const LANDING: &str = "/";
pub const LOGIN: &str = "/login";
pub const PATIENT_HOME: &str = "/dashboard";
pub const PROVIDER_HOME: &str = "/provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecl {
    /// Path pattern; `{name}` segments match any single segment.
    pub pattern: &'static str,
    pub title: &'static str,
    pub requirement: RouteRequirement,
}

static ROUTES: &[RouteDecl] = &[
    RouteDecl { pattern: LANDING, title: "Home", requirement: RouteRequirement::PUBLIC },
    RouteDecl { pattern: LOGIN, title: "Login", requirement: RouteRequirement::PUBLIC },
    RouteDecl { pattern: PATIENT_HOME, title: "Dashboard", requirement: RouteRequirement::role(Role::Patient) },
    RouteDecl { pattern: PROVIDER_HOME, title: "Provider Dashboard", requirement: RouteRequirement::role(Role::Provider) },
    RouteDecl { pattern: "/provider/patient/{id}", title: "Patient Details", requirement: RouteRequirement::role(Role::Provider) },
    RouteDecl { pattern: "/records", title: "Medical Records", requirement: RouteRequirement::SIGNED_IN },
    RouteDecl { pattern: "/messages", title: "Messages", requirement: RouteRequirement::SIGNED_IN },
    RouteDecl { pattern: "/appointments", title: "Appointments", requirement: RouteRequirement::SIGNED_IN },
    RouteDecl { pattern: "/schedule", title: "Schedule", requirement: RouteRequirement::role(Role::Provider) },
    RouteDecl { pattern: "/patients", title: "Patients", requirement: RouteRequirement::role(Role::Provider) },
    RouteDecl { pattern: "/more", title: "More", requirement: RouteRequirement::SIGNED_IN },
];

pub fn route_table() -> &'static [RouteDecl] { ROUTES }

/// Strip the query string and any trailing slash (except for the root).
pub fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { LANDING } else { trimmed }
}

fn matches(pattern: &str, path: &str) -> bool {
    let mut pat = pattern.split('/');
    let mut segs = path.split('/');
    loop {
        match (pat.next(), segs.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) => {
                let wildcard = p.starts_with('{') && p.ends_with('}');
                if wildcard { if s.is_empty() { return false; } } else if p != s { return false; }
            }
            _ => return false,
        }
    }
}

pub fn lookup(path: &str) -> Option<&'static RouteDecl> {
    let path = normalize(path);
    ROUTES.iter().find(|r| matches(r.pattern, path))
}

/// Whether `path` may be used as a post-sign-in destination: an in-app path
/// naming a declared route other than the login page itself.
pub fn is_return_target(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && lookup(path).is_some_and(|r| r.pattern != LOGIN)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
    pub active: bool,
}

/// Bottom navigation for a role, with the entry for `current` marked active.
pub fn nav_items(role: Role, current: &str) -> Vec<NavItem> {
    let entries: [(&'static str, &'static str); 5] = match role {
        Role::Patient => [
            ("Home", LANDING),
            ("Calendar", "/appointments"),
            ("Records", "/records"),
            ("Messages", "/messages"),
            ("More", "/more"),
        ],
        Role::Provider => [
            ("Dashboard", LANDING),
            ("Schedule", "/schedule"),
            ("Patients", "/patients"),
            ("Messages", "/messages"),
            ("More", "/more"),
        ],
    };
    let current = normalize(current);
    entries
        .into_iter()
        .map(|(label, path)| NavItem { label, path, active: path == current })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_normalizes_paths() {
        assert_eq!(lookup("/records/").map(|r| r.pattern), Some("/records"));
        assert_eq!(lookup("/messages?tab=unread").map(|r| r.pattern), Some("/messages"));
        assert_eq!(lookup("").map(|r| r.pattern), Some("/"));
        assert!(lookup("/nope").is_none());
    }

    #[test]
    fn lookup_matches_parameter_segments() {
        let r = lookup("/provider/patient/p1").expect("route");
        assert_eq!(r.requirement.required_role, Some(Role::Provider));
        assert!(lookup("/provider/patient/").map(|r| r.pattern) != Some("/provider/patient/{id}"));
        assert!(lookup("/provider/patient/p1/extra").is_none());
    }

    #[test]
    fn return_targets_must_be_declared_in_app_paths() {
        assert!(is_return_target("/records"));
        assert!(is_return_target("/messages?tab=unread"));
        assert!(is_return_target("/provider/patient/p2"));
        assert!(!is_return_target("/login"));
        assert!(!is_return_target("/nowhere"));
        assert!(!is_return_target("//evil.example"));
        assert!(!is_return_target("https://evil.example/"));
    }

    #[test]
    fn every_role_home_is_declared_for_that_role() {
        for role in Role::ALL {
            let r = lookup(role.home_route()).expect("home route declared");
            assert_eq!(r.requirement.required_role, Some(role));
        }
    }

    #[test]
    fn nav_marks_current_entry() {
        let items = nav_items(Role::Provider, "/schedule");
        assert_eq!(items.len(), 5);
        assert_eq!(items.iter().filter(|i| i.active).count(), 1);
        assert!(items.iter().any(|i| i.label == "Patients"));
        let items = nav_items(Role::Patient, "/appointments/");
        assert!(items.iter().find(|i| i.label == "Calendar").unwrap().active);
    }
}
