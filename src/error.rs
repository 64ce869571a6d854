//! Domain error taxonomy for the job repository core.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! This crate has no HTTP layer, so unlike a host application built on top of it there is
//! no status-code mapping here — callers translate `RepoError` into whatever
//! transport-facing representation their surface needs.

/// Errors produced by the job repository core.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Tag absent (distinguished from a generic not-found since callers branch on it).
    #[error("tag not found")]
    TagNotFound,

    /// Role or scope check denied the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller does not own the job they are trying to mutate.
    #[error("job is not owned by the calling user")]
    JobNotOwned,

    /// Caller may not read or write a tag of this scope.
    #[error("tag scope does not permit this access")]
    TagNoAccess,

    /// Private-scoped tag accessed by someone other than its owner.
    #[error("tag has private scope")]
    TagPrivateScope,

    /// Admin-scoped tag accessed by a non-admin/support caller.
    #[error("tag has admin scope")]
    TagAdminScope,

    /// A batch of tags mixes scopes that cannot be applied together.
    #[error("tags have incompatible scopes")]
    TagsIncompatibleScopes,

    /// Uniqueness violation (duplicate tag, duplicate cached job, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input: invalid sort direction, invalid stat type, invalid scope name,
    /// an `OrderByInput` field that fails the injection sanitizer, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient/driver error from the underlying store. Not retried by this crate.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored JSON sub-document failed to decode.
    #[error("integrity error: {0}")]
    Integrity(String),
}

/// Convenience type alias for Results with `RepoError`.
pub type RepoResult<T> = Result<T, RepoError>;

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Integrity(format!("JSON decode error: {err}"))
    }
}
