//! SeaORM database migrations. The schema version this crate's schema guard (§4.1)
//! compares against is `migrations().len()`.

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_jobs;
mod m20260101_000002_create_job_cache;
mod m20260101_000003_create_tags;
mod m20260101_000004_create_jobtags;
mod m20260101_000005_create_users;
mod m20260101_000006_create_configuration;
mod m20260101_000007_create_nodes;
mod m20260101_000008_create_node_states;
mod m20260101_000009_create_schema_migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_jobs::Migration),
            Box::new(m20260101_000002_create_job_cache::Migration),
            Box::new(m20260101_000003_create_tags::Migration),
            Box::new(m20260101_000004_create_jobtags::Migration),
            Box::new(m20260101_000005_create_users::Migration),
            Box::new(m20260101_000006_create_configuration::Migration),
            Box::new(m20260101_000007_create_nodes::Migration),
            Box::new(m20260101_000008_create_node_states::Migration),
            Box::new(m20260101_000009_create_schema_migrations::Migration),
        ]
    }
}
