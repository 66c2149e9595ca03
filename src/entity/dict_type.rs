//! DictType entity - 字典类型表
//!
//! 表名: sys_dict_type

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_dict_type")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 字典名称
    #[sea_orm(column_type = "String(Some(100))")]
    pub dict_name: String,

    /// 字典类型 (唯一, 如 sys_normal_disable)
    #[sea_orm(column_type = "String(Some(100))", unique)]
    pub dict_type: String,

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
