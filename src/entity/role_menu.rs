//! RoleMenu entity - 角色和菜单关联表
//!
//! 表名: sys_role_menu

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_role_menu")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub role_id: String,

    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub menu_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn new_link(role_id: &str, menu_id: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        role_id: Set(role_id.to_string()),
        menu_id: Set(menu_id.to_string()),
    }
}
