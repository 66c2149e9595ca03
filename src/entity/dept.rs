//! Dept entity - 部门表
//!
//! 表名: sys_dept

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tree::{ParentLink, TreeNode};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_dept")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 父部门ID ("0" 表示顶级部门)
    #[sea_orm(column_type = "String(Some(64))")]
    pub parent_id: String,

    /// 祖级列表 (逗号分隔, 如 "0,dept-001")
    #[sea_orm(column_type = "String(Some(1024))")]
    pub ancestors: String,

    /// 部门名称
    #[sea_orm(column_type = "String(Some(64))")]
    pub dept_name: String,

    /// 显示顺序
    pub order_num: i32,

    /// 负责人
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub leader: Option<String>,

    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub email: Option<String>,

    /// 部门状态: "0"=正常, "1"=停用
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    /// 删除标志: "0"=存在, "2"=删除
    #[sea_orm(column_type = "String(Some(1))")]
    pub del_flag: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub create_by: Option<String>,
    pub create_time: i64,
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub update_by: Option<String>,
    pub update_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 自引用关系通过 tree 模块在内存中构建

impl ActiveModelBehavior for ActiveModel {}

/// 部门树节点 (用于API响应)
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeptTree {
    #[serde(flatten)]
    pub dept: Model,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeptTree>,
}

impl From<Model> for DeptTree {
    fn from(dept: Model) -> Self {
        Self {
            dept,
            children: Vec::new(),
        }
    }
}

impl ParentLink for Model {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> &str {
        &self.parent_id
    }
}

impl ParentLink for DeptTree {
    fn node_id(&self) -> &str {
        &self.dept.id
    }

    fn parent_id(&self) -> &str {
        &self.dept.parent_id
    }
}

impl TreeNode for DeptTree {
    fn order_num(&self) -> i32 {
        self.dept.order_num
    }

    fn set_children(&mut self, children: Vec<Self>) {
        self.children = children;
    }

    fn take_children(&mut self) -> Vec<Self> {
        std::mem::take(&mut self.children)
    }
}
