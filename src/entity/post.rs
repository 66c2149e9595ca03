//! Post entity - 岗位信息表
//!
//! 表名: sys_post

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_post")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 岗位编码 (唯一)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub post_code: String,

    /// 岗位名称
    #[sea_orm(column_type = "String(Some(50))")]
    pub post_name: String,

    /// 显示顺序
    pub post_sort: i32,

    /// 状态: "0"=正常, "1"=停用
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub create_by: Option<String>,
    pub create_time: i64,
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub update_by: Option<String>,
    pub update_time: i64,

    #[sea_orm(column_type = "String(Some(500))", nullable)]
    pub remark: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
