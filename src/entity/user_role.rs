//! UserRole entity - 用户和角色关联表
//!
//! 表名: sys_user_role

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_user_role")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub user_id: String,

    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub role_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn new_link(user_id: &str, role_id: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        user_id: Set(user_id.to_string()),
        role_id: Set(role_id.to_string()),
    }
}
