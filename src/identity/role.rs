use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::routes;

/// Portal role. Determines the home route, permitted routes, and navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Provider,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Patient, Role::Provider];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Provider => "provider",
        }
    }

    /// Landing route after sign-in, demo activation, or a role-mismatch redirect.
    pub fn home_route(&self) -> &'static str {
        match self {
            Role::Patient => routes::PATIENT_HOME,
            Role::Provider => routes::PROVIDER_HOME,
        }
    }

    /// Fixed id of the synthesized demo profile for this role.
    pub fn demo_id(&self) -> &'static str {
        match self {
            Role::Patient => "demo-patient",
            Role::Provider => "demo-provider",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "provider" => Ok(Role::Provider),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}
