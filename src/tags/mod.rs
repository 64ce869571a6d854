//! Tag Service (§4.5): scoped tags (global/admin/private), the job↔tag junction, and the
//! archive-side mirror.
//!
//! Grounded on `services/auth_admin.rs`'s role-gated service shape (check permission
//! first, then touch the database) and `entity::job`/`entity::tag`'s has-many/junction
//! relation for the job↔tag link.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::entity::{job_tag, tag};
use crate::error::{RepoError, RepoResult};
use crate::external::ArchiveBackend;
use crate::models::tag::{Tag, TagCount, TagScope};
use crate::models::user::Principal;
use crate::query::QueryEngine;
use crate::store::Store;

fn decode_tag(m: tag::Model) -> Tag {
    Tag {
        id: m.id,
        tag_type: m.tag_type,
        tag_name: m.tag_name,
        scope: TagScope::from_raw(&m.tag_scope),
    }
}

/// Read-gate for a tag's scope (§4.5 table): global is open to anyone, admin scope is
/// admin/support only, private scope is the owning user only.
fn check_read_access(principal: &Principal, scope: &TagScope) -> RepoResult<()> {
    match scope {
        TagScope::Global => Ok(()),
        TagScope::Admin => {
            if principal.is_admin_or_support() {
                Ok(())
            } else {
                Err(RepoError::TagAdminScope)
            }
        }
        TagScope::Private(owner) => {
            if &principal.username == owner {
                Ok(())
            } else {
                Err(RepoError::TagPrivateScope)
            }
        }
    }
}

/// Write-gate for a tag's scope (§4.5 table): global accepts admin/support/sole-role api,
/// admin accepts admin or sole-role api, private accepts only the owning user.
fn check_write_access(principal: &Principal, scope: &TagScope) -> RepoResult<()> {
    match scope {
        TagScope::Global => {
            if principal.is_admin_or_support() || principal.is_sole_role_api() {
                Ok(())
            } else {
                Err(RepoError::TagNoAccess)
            }
        }
        TagScope::Admin => {
            if principal.has_role(crate::models::user::Role::Admin) || principal.is_sole_role_api()
            {
                Ok(())
            } else {
                Err(RepoError::TagAdminScope)
            }
        }
        TagScope::Private(owner) => {
            if &principal.username == owner {
                Ok(())
            } else {
                Err(RepoError::TagPrivateScope)
            }
        }
    }
}

pub struct TagService {
    store: Store,
    archive: Arc<dyn ArchiveBackend>,
}

impl TagService {
    pub fn new(store: Store, archive: Arc<dyn ArchiveBackend>) -> Self {
        Self { store, archive }
    }

    async fn find_tag_row(&self, tag_id: i64) -> RepoResult<tag::Model> {
        tag::Entity::find_by_id(tag_id)
            .one(self.store.conn())
            .await?
            .ok_or(RepoError::TagNotFound)
    }

    /// All tags attached to `job_id`, regardless of scope — used only for the archive
    /// mirror and ingest, never returned on a principal-facing path (§4.5:
    /// "getArchiveTags ... never exposed on user paths").
    async fn archive_tags_for_job(&self, job_id: i64) -> RepoResult<Vec<Tag>> {
        let rows = tag::Entity::find()
            .inner_join(job_tag::Entity)
            .filter(job_tag::Column::JobId.eq(job_id))
            .all(self.store.conn())
            .await?;
        Ok(rows.into_iter().map(decode_tag).collect())
    }

    async fn mirror(&self, job_id: i64) -> RepoResult<()> {
        let tags = self.archive_tags_for_job(job_id).await?;
        let encoded: Vec<String> = tags
            .iter()
            .map(|t| format!("{}:{}", t.tag_type, t.tag_name))
            .collect();
        self.archive.update_tags(job_id, &encoded).await
    }

    /// **CreateTag(type, name, scope)** (§4.5): defaults scope to "global".
    pub async fn create_tag(
        &self,
        principal: &Principal,
        tag_type: &str,
        tag_name: &str,
        scope: Option<TagScope>,
    ) -> RepoResult<Tag> {
        let scope = scope.unwrap_or(TagScope::Global);
        check_write_access(principal, &scope)?;
        self.insert_tag(tag_type, tag_name, &scope).await
    }

    async fn insert_tag(&self, tag_type: &str, tag_name: &str, scope: &TagScope) -> RepoResult<Tag> {
        let active = tag::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            tag_type: Set(tag_type.to_string()),
            tag_name: Set(tag_name.to_string()),
            tag_scope: Set(scope.as_raw().to_string()),
        };
        let inserted = active.insert(self.store.conn()).await.map_err(|e| {
            if e.to_string().to_lowercase().contains("unique") {
                RepoError::Conflict(format!(
                    "tag ({tag_type}, {tag_name}, {}) already exists",
                    scope.as_raw()
                ))
            } else {
                RepoError::Database(e)
            }
        })?;
        Ok(decode_tag(inserted))
    }

    async fn find_existing(
        &self,
        tag_type: &str,
        tag_name: &str,
        scope: &TagScope,
    ) -> RepoResult<Option<tag::Model>> {
        tag::Entity::find()
            .filter(tag::Column::TagType.eq(tag_type))
            .filter(tag::Column::TagName.eq(tag_name))
            .filter(tag::Column::TagScope.eq(scope.as_raw()))
            .one(self.store.conn())
            .await
            .map_err(RepoError::from)
    }

    /// **ImportTag** (§4.5): bypasses user checks, find-or-create, for archive ingest only.
    pub async fn import_tag(&self, tag_type: &str, tag_name: &str, scope: &TagScope) -> RepoResult<Tag> {
        if let Some(existing) = self.find_existing(tag_type, tag_name, scope).await? {
            return Ok(decode_tag(existing));
        }
        self.insert_tag(tag_type, tag_name, scope).await
    }

    async fn check_job_visible(&self, principal: &Principal, job_id: i64) -> RepoResult<()> {
        let query = QueryEngine::new(self.store.clone());
        query.find_by_id(principal, job_id).await.map(|_| ())
    }

    /// **AddTag(user, jobID, tagID)** (§4.5): verifies job access, checks the tag's write
    /// gate, rejects attaching a private tag to a job it would not logically belong to,
    /// inserts into the junction, mirrors into the archive.
    pub async fn add_tag(&self, principal: &Principal, job_id: i64, tag_id: i64) -> RepoResult<()> {
        self.check_job_visible(principal, job_id).await?;
        let row = self.find_tag_row(tag_id).await?;
        let scope = TagScope::from_raw(&row.tag_scope);
        check_write_access(principal, &scope)?;

        if let TagScope::Private(owner) = &scope {
            let query = QueryEngine::new(self.store.clone());
            let job = query.find_by_id_direct(job_id).await?;
            if &job.hpc_user != owner {
                return Err(RepoError::TagsIncompatibleScopes);
            }
        }

        let active = job_tag::ActiveModel {
            job_id: Set(job_id),
            tag_id: Set(tag_id),
        };
        active.insert(self.store.conn()).await.map_err(|e| {
            if e.to_string().to_lowercase().contains("unique") {
                RepoError::Conflict(format!("tag {tag_id} already attached to job {job_id}"))
            } else {
                RepoError::Database(e)
            }
        })?;

        self.mirror(job_id).await
    }

    /// **AddTagOrCreate(user, jobID, type, name, scope)** (§4.5).
    pub async fn add_tag_or_create(
        &self,
        principal: &Principal,
        job_id: i64,
        tag_type: &str,
        tag_name: &str,
        scope: Option<TagScope>,
    ) -> RepoResult<Tag> {
        let scope = scope.unwrap_or(TagScope::Global);
        let tag = match self.find_existing(tag_type, tag_name, &scope).await? {
            Some(existing) => decode_tag(existing),
            None => self.create_tag(principal, tag_type, tag_name, Some(scope)).await?,
        };
        self.add_tag(principal, job_id, tag.id).await?;
        Ok(tag)
    }

    /// **RemoveTag(user, jobID, tagID)** (§4.5).
    pub async fn remove_tag(&self, principal: &Principal, job_id: i64, tag_id: i64) -> RepoResult<()> {
        self.check_job_visible(principal, job_id).await?;
        let row = self.find_tag_row(tag_id).await?;
        let scope = TagScope::from_raw(&row.tag_scope);
        check_write_access(principal, &scope)?;

        job_tag::Entity::delete_many()
            .filter(job_tag::Column::JobId.eq(job_id))
            .filter(job_tag::Column::TagId.eq(tag_id))
            .exec(self.store.conn())
            .await?;

        self.mirror(job_id).await
    }

    /// **RemoveJobTagByRequest(user, jobID, type, name, scope)** (§4.5).
    pub async fn remove_job_tag_by_request(
        &self,
        principal: &Principal,
        job_id: i64,
        tag_type: &str,
        tag_name: &str,
        scope: &TagScope,
    ) -> RepoResult<()> {
        let row = self
            .find_existing(tag_type, tag_name, scope)
            .await?
            .ok_or(RepoError::TagNotFound)?;
        self.remove_tag(principal, job_id, row.id).await
    }

    /// **RemoveTagByID(tagID)** (§4.5): admin/support-only; deletes the junction rows then
    /// the tag, then fires an asynchronous pass updating archive metadata for every
    /// affected job.
    pub async fn remove_tag_by_id(&self, principal: &Principal, tag_id: i64) -> RepoResult<()> {
        if !principal.is_admin_or_support() {
            return Err(RepoError::Forbidden(
                "admin or support role required to remove a tag by id".into(),
            ));
        }

        let affected_job_ids: Vec<i64> = job_tag::Entity::find()
            .filter(job_tag::Column::TagId.eq(tag_id))
            .all(self.store.conn())
            .await?
            .into_iter()
            .map(|row| row.job_id)
            .collect();

        job_tag::Entity::delete_many()
            .filter(job_tag::Column::TagId.eq(tag_id))
            .exec(self.store.conn())
            .await?;

        tag::Entity::delete_by_id(tag_id)
            .exec(self.store.conn())
            .await?;

        let store = self.store.clone();
        let archive = self.archive.clone();
        tokio::spawn(async move {
            let service = TagService { store, archive };
            for job_id in affected_job_ids {
                if let Err(e) = service.mirror(job_id).await {
                    tracing::error!(job_id, error = %e, "failed to update archive tags after RemoveTagByID");
                }
            }
        });

        Ok(())
    }

    /// **GetTags(user, jobID)**: tags attached to a job, filtered to what `principal` may
    /// read (§4.5).
    pub async fn get_tags(&self, principal: &Principal, job_id: i64) -> RepoResult<Vec<Tag>> {
        self.check_job_visible(principal, job_id).await?;
        let all = self.archive_tags_for_job(job_id).await?;
        Ok(all
            .into_iter()
            .filter(|t| check_read_access(principal, &t.scope).is_ok())
            .collect())
    }

    /// **CountTags(user)** (§4.5): every tag readable by `principal`, with a job count
    /// further constrained to jobs visible to that principal.
    pub async fn count_tags(&self, principal: &Principal) -> RepoResult<Vec<TagCount>> {
        let all_tags = tag::Entity::find().all(self.store.conn()).await?;
        let query = QueryEngine::new(self.store.clone());

        let mut out = Vec::new();
        for row in all_tags {
            let scope = TagScope::from_raw(&row.tag_scope);
            if check_read_access(principal, &scope).is_err() {
                continue;
            }

            let job_ids: Vec<i64> = job_tag::Entity::find()
                .filter(job_tag::Column::TagId.eq(row.id))
                .all(self.store.conn())
                .await?
                .into_iter()
                .map(|jt| jt.job_id)
                .collect();

            let mut job_count = 0i64;
            for job_id in job_ids {
                if query.find_by_id(principal, job_id).await.is_ok() {
                    job_count += 1;
                }
            }

            out.push(TagCount {
                tag: decode_tag(row),
                job_count,
            });
        }
        Ok(out)
    }
}
