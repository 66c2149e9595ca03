//! Role entity - 角色表
//!
//! 表名: sys_role

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{DEL_FLAG_PRESENT, STATUS_NORMAL};
use crate::error::AccessError;

/// 超级管理员角色标识
pub const ADMIN_ROLE_KEY: &str = "admin";

/// 数据权限范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataScope {
    /// 全部数据权限
    All,
    /// 自定数据权限
    Custom,
    /// 本部门数据权限
    Dept,
    /// 本部门及以下数据权限
    DeptAndBelow,
    /// 仅本人数据权限
    SelfOnly,
}

impl DataScope {
    pub fn as_code(&self) -> &'static str {
        match self {
            DataScope::All => "1",
            DataScope::Custom => "2",
            DataScope::Dept => "3",
            DataScope::DeptAndBelow => "4",
            DataScope::SelfOnly => "5",
        }
    }

    pub fn parse(code: &str) -> Result<Self, AccessError> {
        match code {
            "1" => Ok(DataScope::All),
            "2" => Ok(DataScope::Custom),
            "3" => Ok(DataScope::Dept),
            "4" => Ok(DataScope::DeptAndBelow),
            "5" => Ok(DataScope::SelfOnly),
            other => Err(AccessError::Malformed(format!("unknown data scope '{}'", other))),
        }
    }

    /// 中文显示
    pub fn label(&self) -> &'static str {
        match self {
            DataScope::All => "全部数据权限",
            DataScope::Custom => "自定数据权限",
            DataScope::Dept => "本部门数据权限",
            DataScope::DeptAndBelow => "本部门及以下数据权限",
            DataScope::SelfOnly => "仅本人数据权限",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_role")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 角色名称
    #[sea_orm(column_type = "String(Some(64))")]
    pub role_name: String,

    /// 角色权限字符串 (唯一)
    #[sea_orm(column_type = "String(Some(100))", unique)]
    pub role_key: String,

    /// 显示顺序
    pub role_sort: i32,

    /// 数据范围: 1=全部, 2=自定, 3=本部门, 4=本部门及以下, 5=仅本人
    #[sea_orm(column_type = "String(Some(1))")]
    pub data_scope: String,

    /// 菜单树选择项是否关联显示
    pub menu_check_strictly: bool,

    /// 部门树选择项是否关联显示
    pub dept_check_strictly: bool,

    /// 角色状态: "0"=正常, "1"=停用
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

    #[sea_orm(column_type = "String(Some(500))", nullable)]
    pub remark: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A role contributes permissions only while enabled and not soft-deleted
    pub fn is_effective(&self) -> bool {
        self.status == STATUS_NORMAL && self.del_flag == DEL_FLAG_PRESENT
    }
}

/// 角色详情响应 (含菜单ID)
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Model,
    pub menu_ids: Vec<String>,
    pub user_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_scope_codes() {
        for code in ["1", "2", "3", "4", "5"] {
            assert_eq!(DataScope::parse(code).unwrap().as_code(), code);
        }
        assert!(matches!(DataScope::parse("9"), Err(AccessError::Malformed(_))));
        assert_eq!(DataScope::DeptAndBelow.label(), "本部门及以下数据权限");
    }
}
