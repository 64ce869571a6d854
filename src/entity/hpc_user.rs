//! User/access row. Roles and managed projects are stored as JSON arrays (§3/§4.6).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hpc_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    /// bcrypt hash, present only for locally-authenticated users.
    pub password: Option<String>,
    /// Non-zero when this account is LDAP/externally authenticated.
    pub ldap: i32,
    pub name: String,
    pub email: String,
    #[sea_orm(column_type = "Json")]
    pub roles: Json,
    #[sea_orm(column_type = "Json")]
    pub projects: Json,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        panic!("hpc_user has no relations")
    }
}

impl ActiveModelBehavior for ActiveModel {}
