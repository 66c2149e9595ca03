//! Menu entity - 菜单权限表
//!
//! 表名: sys_menu

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{STATUS_NORMAL, VISIBLE_SHOW};
use crate::error::AccessError;
use crate::tree::{ParentLink, TreeNode};

/// 菜单类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuType {
    /// 目录
    Directory,
    /// 菜单页面
    Page,
    /// 按钮
    Button,
}

impl MenuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuType::Directory => "M",
            MenuType::Page => "C",
            MenuType::Button => "F",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AccessError> {
        match s {
            "M" => Ok(MenuType::Directory),
            "C" => Ok(MenuType::Page),
            "F" => Ok(MenuType::Button),
            other => Err(AccessError::Malformed(format!("unknown menu type '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_menu")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 菜单名称
    #[sea_orm(column_type = "String(Some(50))")]
    pub menu_name: String,

    /// 父菜单ID ("0" 表示顶级)
    #[sea_orm(column_type = "String(Some(64))")]
    pub parent_id: String,

    /// 显示顺序
    pub order_num: i32,

    /// 路由地址
    #[sea_orm(column_type = "String(Some(200))", nullable)]
    pub path: Option<String>,

    /// 组件路径
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub component: Option<String>,

    /// 路由参数
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub query: Option<String>,

    /// 是否为外链: "0"=是, "1"=否
    #[sea_orm(column_type = "String(Some(1))")]
    pub is_frame: String,

    /// 是否缓存: "0"=缓存, "1"=不缓存
    #[sea_orm(column_type = "String(Some(1))")]
    pub is_cache: String,

    /// 菜单类型: M=目录, C=菜单, F=按钮
    #[sea_orm(column_type = "String(Some(1))")]
    pub menu_type: String,

    /// 显示状态: "0"=显示, "1"=隐藏
    #[sea_orm(column_type = "String(Some(1))")]
    pub visible: String,

    /// 菜单状态: "0"=正常, "1"=停用
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    /// 权限标识 (如 system:user:list)
    #[sea_orm(column_type = "String(Some(100))", nullable)]
    pub perms: Option<String>,

    /// 菜单图标
    #[sea_orm(column_type = "String(Some(100))", nullable)]
    pub icon: Option<String>,

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

impl Model {
    /// Enabled and not hidden
    pub fn is_visible(&self) -> bool {
        self.status == STATUS_NORMAL && self.visible == VISIBLE_SHOW
    }

    /// Permission string, if the menu carries a non-empty one
    pub fn permission(&self) -> Option<&str> {
        self.perms.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// 菜单树节点 (用于API响应)
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Model,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuTree>,
}

impl From<Model> for MenuTree {
    fn from(menu: Model) -> Self {
        Self {
            menu,
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

impl ParentLink for MenuTree {
    fn node_id(&self) -> &str {
        &self.menu.id
    }

    fn parent_id(&self) -> &str {
        &self.menu.parent_id
    }
}

impl TreeNode for MenuTree {
    fn order_num(&self) -> i32 {
        self.menu.order_num
    }

    fn set_children(&mut self, children: Vec<Self>) {
        self.children = children;
    }

    fn take_children(&mut self) -> Vec<Self> {
        std::mem::take(&mut self.children)
    }
}
