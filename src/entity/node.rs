//! Cluster node identity. Referenced by `entity::node_state` samples.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "node")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub hostname: String,
    pub cluster: String,
    pub subcluster: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    NodeState,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::NodeState => Entity::has_many(super::node_state::Entity).into(),
        }
    }
}

impl Related<super::node_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NodeState.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
