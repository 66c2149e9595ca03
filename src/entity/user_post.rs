//! UserPost entity - 用户与岗位关联表
//!
//! 表名: sys_user_post

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_user_post")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub user_id: String,

    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub post_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn new_link(user_id: &str, post_id: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        user_id: Set(user_id.to_string()),
        post_id: Set(post_id.to_string()),
    }
}
