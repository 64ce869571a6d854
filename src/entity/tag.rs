//! Scoped tag table. Unique on (tag_type, tag_name, tag_scope).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tag")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tag_type: String,
    pub tag_name: String,
    pub tag_scope: String,
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
