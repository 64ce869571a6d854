//! Tag DTOs (§3/§4.5).

use serde::{Deserialize, Serialize};

/// A tag's scope class: process-wide, admin/support-only, or a specific owning username
/// (GLOSSARY: "Scope (tag)").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagScope {
    Global,
    Admin,
    Private(String),
}

impl TagScope {
    pub const GLOBAL_STR: &'static str = "global";
    pub const ADMIN_STR: &'static str = "admin";

    pub fn from_raw(raw: &str) -> Self {
        match raw {
            Self::GLOBAL_STR => Self::Global,
            Self::ADMIN_STR => Self::Admin,
            other => Self::Private(other.to_string()),
        }
    }

    pub fn as_raw(&self) -> &str {
        match self {
            Self::Global => Self::GLOBAL_STR,
            Self::Admin => Self::ADMIN_STR,
            Self::Private(username) => username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub tag_type: String,
    pub tag_name: String,
    pub scope: TagScope,
}

/// Row returned by `TagService::count_tags`: tag plus the job count visible to the
/// requesting principal (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: Tag,
    pub job_count: i64,
}
