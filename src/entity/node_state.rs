//! Append-only per-node state/health sample (§4.8). "Current" = max `time_stamp` per node.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "node_state")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub node_id: i64,
    pub time_stamp: i64,
    pub node_state: String,
    pub health_state: String,
    pub cpus_allocated: i32,
    pub memory_allocated: i64,
    pub gpus_allocated: i32,
    pub jobs_running: i32,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Node,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Node => Entity::belongs_to(super::node::Entity)
                .from(Column::NodeId)
                .to(super::node::Column::Id)
                .into(),
        }
    }
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Node.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
