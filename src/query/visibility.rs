//! Role-based row visibility (§4.3), applied before any `JobFilter` predicate.

use sea_orm::{ColumnTrait, Condition};

use crate::entity::job;
use crate::error::{RepoError, RepoResult};
use crate::models::user::{Principal, Role};

/// Builds the visibility `Condition` for `principal` against the `job`/`job_cache`
/// column set (both entities share the same `hpc_user`/`project` columns).
///
/// - sole role `api`, or `admin`/`support`: unrestricted (`Condition::all()`, no clauses).
/// - `manager` with a non-empty project list: `project IN managed_projects OR hpc_user = self`.
/// - `manager` with an empty project list, or plain `user`: `hpc_user = self`.
/// - no recognized role: denied.
pub fn job_visibility(principal: &Principal) -> RepoResult<Condition> {
    if principal.is_sole_role_api() || principal.is_admin_or_support() {
        return Ok(Condition::all());
    }

    if principal.is_manager() && !principal.projects.is_empty() {
        return Ok(Condition::any()
            .add(job::Column::Project.is_in(principal.projects.clone()))
            .add(job::Column::HpcUser.eq(principal.username.clone())));
    }

    if principal.is_manager() || principal.has_role(Role::User) {
        return Ok(Condition::all().add(job::Column::HpcUser.eq(principal.username.clone())));
    }

    Err(RepoError::Forbidden(format!(
        "principal '{}' has no recognized role",
        principal.username
    )))
}
