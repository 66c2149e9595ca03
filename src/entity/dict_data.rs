//! DictData entity - 字典数据表
//!
//! 表名: sys_dict_data
//! (dict_type, dict_value) 唯一, 由 db 模块建立唯一索引

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_dict_data")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 字典排序
    pub dict_sort: i32,

    /// 字典标签
    #[sea_orm(column_type = "String(Some(100))")]
    pub dict_label: String,

    /// 字典键值
    #[sea_orm(column_type = "String(Some(100))")]
    pub dict_value: String,

    /// 所属字典类型
    #[sea_orm(column_type = "String(Some(100))")]
    pub dict_type: String,

    /// 样式属性
    #[sea_orm(column_type = "String(Some(100))", nullable)]
    pub css_class: Option<String>,

    /// 表格回显样式
    #[sea_orm(column_type = "String(Some(100))", nullable)]
    pub list_class: Option<String>,

    /// 是否默认: Y=是, N=否
    #[sea_orm(column_type = "String(Some(1))")]
    pub is_default: String,

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
