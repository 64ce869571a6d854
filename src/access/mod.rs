//! User & Access (§4.6): local/external authentication, the closed role set, managed
//! projects, and the `Principal` context carrier.
//!
//! Grounded on `entity::hpc_user`'s row shape and `services/auth_admin.rs`'s role-gated
//! service shape (check, then mutate). Local password hashing is new relative to the
//! teacher (GitHub OAuth only, never a local password) — `bcrypt` is the standard crate
//! the rest of the ecosystem reaches for here.

use bcrypt::{hash, verify, DEFAULT_COST};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::entity::hpc_user;
use crate::error::{RepoError, RepoResult};
use crate::models::user::{AuthSource, Principal, Role, User};
use crate::store::Store;

fn decode_user(m: hpc_user::Model) -> RepoResult<User> {
    let roles: Vec<String> = serde_json::from_value(m.roles)?;
    let roles: Vec<Role> = roles
        .iter()
        .map(|r| Role::parse(r).ok_or_else(|| RepoError::Integrity(format!("unknown role '{r}'"))))
        .collect::<RepoResult<_>>()?;
    let projects: Vec<String> = serde_json::from_value(m.projects)?;
    Ok(User {
        username: m.username,
        auth_source: if m.ldap != 0 { AuthSource::Ldap } else { AuthSource::Local },
        name: m.name,
        email: m.email,
        roles,
        projects,
    })
}

pub struct AccessService {
    store: Store,
}

impl AccessService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    async fn find_row(&self, username: &str) -> RepoResult<hpc_user::Model> {
        hpc_user::Entity::find_by_id(username)
            .one(self.store.conn())
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("user '{username}'")))
    }

    pub async fn find_user(&self, username: &str) -> RepoResult<User> {
        decode_user(self.find_row(username).await?)
    }

    /// Creates a locally-authenticated user, hashing `password` with bcrypt at
    /// `DEFAULT_COST` (§4.6.1).
    pub async fn create_local_user(
        &self,
        username: &str,
        password: &str,
        name: &str,
        email: &str,
        roles: Vec<Role>,
    ) -> RepoResult<User> {
        let hashed = hash(password, DEFAULT_COST)
            .map_err(|e| RepoError::Validation(format!("password hashing failed: {e}")))?;
        self.insert_row(username, Some(hashed), false, name, email, roles, vec![])
            .await
    }

    /// Creates an externally (LDAP) authenticated user; there is no local password to
    /// store.
    pub async fn create_ldap_user(
        &self,
        username: &str,
        name: &str,
        email: &str,
        roles: Vec<Role>,
    ) -> RepoResult<User> {
        self.insert_row(username, None, true, name, email, roles, vec![])
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_row(
        &self,
        username: &str,
        password: Option<String>,
        ldap: bool,
        name: &str,
        email: &str,
        roles: Vec<Role>,
        projects: Vec<String>,
    ) -> RepoResult<User> {
        let active = hpc_user::ActiveModel {
            username: Set(username.to_string()),
            password: Set(password),
            ldap: Set(if ldap { 1 } else { 0 }),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            roles: Set(serde_json::to_value(
                roles.iter().map(Role::as_str).collect::<Vec<_>>(),
            )?),
            projects: Set(serde_json::to_value(&projects)?),
        };
        let inserted = active.insert(self.store.conn()).await.map_err(|e| {
            if e.to_string().to_lowercase().contains("unique") {
                RepoError::Conflict(format!("user '{username}' already exists"))
            } else {
                RepoError::Database(e)
            }
        })?;
        decode_user(inserted)
    }

    /// Verifies `password` against the stored bcrypt hash for a locally-authenticated
    /// user. Returns `Ok(false)` (not an error) for a wrong password; `Err` only for
    /// structural problems (no row, LDAP account, corrupt hash).
    pub async fn verify_local_password(&self, username: &str, password: &str) -> RepoResult<bool> {
        let row = self.find_row(username).await?;
        let Some(hashed) = row.password else {
            return Err(RepoError::Validation(format!(
                "user '{username}' has no local password set"
            )));
        };
        verify(password, &hashed).map_err(|e| RepoError::Validation(format!("bcrypt verify failed: {e}")))
    }

    async fn save_roles_and_projects(
        &self,
        username: &str,
        roles: &[Role],
        projects: &[String],
    ) -> RepoResult<()> {
        let active = hpc_user::ActiveModel {
            username: Set(username.to_string()),
            roles: Set(serde_json::to_value(
                roles.iter().map(Role::as_str).collect::<Vec<_>>(),
            )?),
            projects: Set(serde_json::to_value(projects)?),
            ..Default::default()
        };
        hpc_user::Entity::update(active).exec(self.store.conn()).await?;
        Ok(())
    }

    /// **AddRole(username, role)** (§4.6): validates against the closed role set (already
    /// enforced by `Role` being an enum — an unparseable string never reaches here) and is
    /// a no-op if the role is already present.
    pub async fn add_role(&self, username: &str, role: Role) -> RepoResult<User> {
        let user = self.find_user(username).await?;
        let mut roles = user.roles.clone();
        if !roles.contains(&role) {
            roles.push(role);
        }
        self.save_roles_and_projects(username, &roles, &user.projects).await?;
        self.find_user(username).await
    }

    /// **RemoveRole(username, role)** (§4.6): refuses to drop `manager` while the user
    /// still has projects.
    pub async fn remove_role(&self, username: &str, role: Role) -> RepoResult<User> {
        let user = self.find_user(username).await?;
        if role == Role::Manager && !user.projects.is_empty() {
            return Err(RepoError::Validation(
                "cannot remove the manager role while the user has managed projects".into(),
            ));
        }
        let roles: Vec<Role> = user.roles.iter().copied().filter(|r| *r != role).collect();
        self.save_roles_and_projects(username, &roles, &user.projects).await?;
        self.find_user(username).await
    }

    /// **AddProject(username, project)** (§4.6): requires the manager role, no-op if
    /// already a member.
    pub async fn add_project(&self, username: &str, project: &str) -> RepoResult<User> {
        let user = self.find_user(username).await?;
        if !user.roles.contains(&Role::Manager) {
            return Err(RepoError::Validation(format!(
                "user '{username}' does not have the manager role"
            )));
        }
        let mut projects = user.projects.clone();
        if !projects.iter().any(|p| p == project) {
            projects.push(project.to_string());
        }
        self.save_roles_and_projects(username, &user.roles, &projects).await?;
        self.find_user(username).await
    }

    /// **RemoveProject(username, project)** (§4.6): requires the manager role, errors if
    /// the user does not manage it.
    pub async fn remove_project(&self, username: &str, project: &str) -> RepoResult<User> {
        let user = self.find_user(username).await?;
        if !user.roles.contains(&Role::Manager) {
            return Err(RepoError::Validation(format!(
                "user '{username}' does not have the manager role"
            )));
        }
        if !user.projects.iter().any(|p| p == project) {
            return Err(RepoError::Validation(format!(
                "user '{username}' does not manage project '{project}'"
            )));
        }
        let projects: Vec<String> = user.projects.iter().filter(|p| p.as_str() != project).cloned().collect();
        self.save_roles_and_projects(username, &user.roles, &projects).await?;
        self.find_user(username).await
    }

    /// **UpdateUser(username, name?, email?, roles?, projects?)** (§4.6): diff-applies only
    /// the fields supplied.
    pub async fn update_user(
        &self,
        username: &str,
        name: Option<&str>,
        email: Option<&str>,
        roles: Option<Vec<Role>>,
        projects: Option<Vec<String>>,
    ) -> RepoResult<User> {
        let current = self.find_user(username).await?;
        let mut active = hpc_user::ActiveModel {
            username: Set(username.to_string()),
            ..Default::default()
        };
        if let Some(name) = name {
            active.name = Set(name.to_string());
        }
        if let Some(email) = email {
            active.email = Set(email.to_string());
        }
        let roles = roles.unwrap_or(current.roles);
        let projects = projects.unwrap_or(current.projects);
        active.roles = Set(serde_json::to_value(roles.iter().map(Role::as_str).collect::<Vec<_>>())?);
        active.projects = Set(serde_json::to_value(&projects)?);

        hpc_user::Entity::update(active).exec(self.store.conn()).await?;
        self.find_user(username).await
    }

    /// Builds the context-carried `Principal` for a stored user (§4.6/§4.6.1).
    pub fn principal_for(user: &User) -> Principal {
        Principal {
            username: user.username.clone(),
            roles: user.roles.clone(),
            projects: user.projects.clone(),
        }
    }
}
