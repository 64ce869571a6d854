//! Durable job table (`job`). See `entity::job_cache` for the hot-tier mirror.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub job_id: i64,
    pub hpc_user: String,
    pub project: String,
    pub cluster: String,
    pub subcluster: String,
    pub cluster_partition: String,
    pub array_job_id: i64,
    pub num_nodes: i32,
    pub num_hwthreads: i32,
    pub num_acc: i32,
    pub shared: String,
    pub monitoring_status: i32,
    pub smt: i32,
    pub job_state: String,
    pub start_time: i64,
    pub duration: i64,
    pub walltime: i64,
    #[sea_orm(column_type = "Json")]
    pub resources: Json,
    #[sea_orm(column_type = "Json")]
    pub footprint: Json,
    pub energy: f64,
    #[sea_orm(column_type = "Json")]
    pub energy_footprint: Json,
    #[sea_orm(column_type = "Json")]
    pub meta_data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    JobTag,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::JobTag => Entity::has_many(super::job_tag::Entity).into(),
        }
    }
}

impl Related<super::job_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobTag.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
