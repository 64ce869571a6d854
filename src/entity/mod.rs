//! SeaORM entity definitions. JSON sub-documents use `column_type = "Json"` text storage
//! (SQLite/MySQL dialect), per SPEC_FULL.md §3.1.

pub mod configuration;
pub mod hpc_user;
pub mod job;
pub mod job_cache;
pub mod job_tag;
pub mod node;
pub mod node_state;
pub mod schema_migrations;
pub mod tag;
