//! User/access DTOs, including the context-carried `Principal` (§4.6, §9).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed role set (§3/§4.6). Order matters for `Principal::highest_role`-style checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Support,
    Manager,
    Api,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Support => "support",
            Self::Manager => "manager",
            Self::Api => "api",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "support" => Some(Self::Support),
            "manager" => Some(Self::Manager),
            "api" => Some(Self::Api),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local (bcrypt) vs external (LDAP) authentication source (§3/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    Local,
    Ldap,
}

/// The context-carried caller identity, threaded as an explicit parameter to every
/// query/tag/stats method in this crate (§4.6.1's "preferred" Design Notes resolution —
/// see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub roles: Vec<Role>,
    pub projects: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin_or_support(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Support)
    }

    pub fn is_sole_role_api(&self) -> bool {
        self.roles.len() == 1 && self.roles[0] == Role::Api
    }

    pub fn is_manager(&self) -> bool {
        self.has_role(Role::Manager)
    }
}

/// A stored user row, decoded (§3/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub auth_source: AuthSource,
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub projects: Vec<String>,
}
