//! LoginLog entity - 系统访问记录
//!
//! 表名: sys_login_log
//! 只追加, 仅支持整体清空

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_login_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 登录账号
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub user_name: Option<String>,

    /// 登录IP地址
    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub ipaddr: Option<String>,

    /// 登录地点
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub login_location: Option<String>,

    /// 浏览器类型 (User-Agent)
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub browser: Option<String>,

    /// 操作系统
    #[sea_orm(column_type = "String(Some(50))", nullable)]
    pub os: Option<String>,

    /// 登录状态: "0"=成功, "1"=失败
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    /// 提示消息
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub msg: Option<String>,

    /// 访问时间 (Unix 时间戳)
    pub login_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
