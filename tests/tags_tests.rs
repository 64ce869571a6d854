//! Tag Service end-to-end scenarios (spec §8: S4).

mod common;

use jobrepo_core::error::RepoError;
use jobrepo_core::external::ArchiveBackend;
use jobrepo_core::lifecycle::Engine;
use jobrepo_core::models::tag::TagScope;
use jobrepo_core::models::user::{Principal, Role};
use jobrepo_core::tags::TagService;
use std::sync::Arc;

fn principal(username: &str, roles: Vec<Role>) -> Principal {
    Principal {
        username: username.to_string(),
        roles,
        projects: vec![],
    }
}

/// S4 — Tag scope enforcement: a plain user cannot attach an admin-scoped tag; an admin
/// can, and the plain user's `count_tags` excludes it.
#[tokio::test]
async fn s4_admin_scoped_tag_is_write_protected_and_hidden_from_plain_users() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let archive: Arc<dyn ArchiveBackend> = Arc::new(common::FakeArchive::default());
    let tags = TagService::new(store.clone(), archive);

    let job = common::sample_job(1, "fritz", "alice", 1700000000);
    engine.start(&job).await.unwrap();
    let synced = engine.sync_jobs().await.unwrap();
    let job_id = synced[0].id;

    let admin = principal("admin", vec![Role::Admin]);
    let created = tags
        .create_tag(&admin, "perf", "slow", Some(TagScope::Admin))
        .await
        .unwrap();

    let plain_user = principal("alice", vec![Role::User]);
    let err = tags.add_tag(&plain_user, job_id, created.id).await.unwrap_err();
    assert!(matches!(err, RepoError::TagAdminScope));

    tags.add_tag(&admin, job_id, created.id).await.unwrap();

    let plain_counts = tags.count_tags(&plain_user).await.unwrap();
    assert!(
        plain_counts.iter().all(|tc| tc.tag.id != created.id),
        "admin-scoped tag must not appear in a plain user's CountTags"
    );

    let admin_counts = tags.count_tags(&admin).await.unwrap();
    let entry = admin_counts.iter().find(|tc| tc.tag.id == created.id).unwrap();
    assert_eq!(entry.job_count, 1);
}

/// A private-scoped tag can only be written by its owning user.
#[tokio::test]
async fn private_scope_tag_write_is_owner_only() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let archive: Arc<dyn ArchiveBackend> = Arc::new(common::FakeArchive::default());
    let tags = TagService::new(store.clone(), archive);

    let job = common::sample_job(1, "fritz", "alice", 1700000000);
    engine.start(&job).await.unwrap();
    let synced = engine.sync_jobs().await.unwrap();
    let job_id = synced[0].id;

    let alice = principal("alice", vec![Role::User]);
    let created = tags
        .create_tag(&alice, "note", "mine", Some(TagScope::Private("alice".to_string())))
        .await
        .unwrap();

    // `admin` can see the job (unrestricted visibility) but is still refused write access
    // to a tag privately scoped to someone else.
    let admin = principal("admin", vec![Role::Admin]);
    let err = tags.add_tag(&admin, job_id, created.id).await.unwrap_err();
    assert!(matches!(err, RepoError::TagPrivateScope));

    tags.add_tag(&alice, job_id, created.id).await.unwrap();
    let alice_tags = tags.get_tags(&alice, job_id).await.unwrap();
    assert_eq!(alice_tags.len(), 1);

    // Private scope hides the tag from reads by anyone other than its owner, admin
    // included (§4.5 table: "Read: Private scope -> that user only").
    let admin_tags = tags.get_tags(&admin, job_id).await.unwrap();
    assert!(admin_tags.is_empty(), "only alice may read her own private tag");
}

/// Creating the same (type, name, scope) tag twice is a conflict, not a silent duplicate.
#[tokio::test]
async fn duplicate_tag_is_a_conflict() {
    let store = common::test_store().await;
    let archive: Arc<dyn ArchiveBackend> = Arc::new(common::FakeArchive::default());
    let tags = TagService::new(store.clone(), archive);
    let admin = principal("admin", vec![Role::Admin]);

    tags.create_tag(&admin, "perf", "slow", None).await.unwrap();
    let err = tags.create_tag(&admin, "perf", "slow", None).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

/// `RemoveTagByID` detaches the tag from every job and deletes the tag row itself.
#[tokio::test]
async fn remove_tag_by_id_detaches_and_deletes() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let archive: Arc<dyn ArchiveBackend> = Arc::new(common::FakeArchive::default());
    let tags = TagService::new(store.clone(), archive);

    let job = common::sample_job(1, "fritz", "alice", 1700000000);
    engine.start(&job).await.unwrap();
    let synced = engine.sync_jobs().await.unwrap();
    let job_id = synced[0].id;

    let admin = principal("admin", vec![Role::Admin]);
    let created = tags.create_tag(&admin, "global", "ci", None).await.unwrap();
    tags.add_tag(&admin, job_id, created.id).await.unwrap();

    tags.remove_tag_by_id(&admin, created.id).await.unwrap();

    let err = tags.get_tags(&admin, job_id).await.unwrap();
    assert!(err.is_empty());
}
