//! User entity - 用户表
//!
//! 表名: sys_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::STATUS_NORMAL;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_user")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(64))")]
    pub id: String,

    /// 用户名 (唯一)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub username: String,

    /// 密码 (bcrypt 哈希)
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing, default)]
    pub password: String,

    /// 昵称
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub nickname: Option<String>,

    /// 邮箱
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub email: Option<String>,

    /// 电话
    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub phone: Option<String>,

    /// 头像地址
    #[sea_orm(column_type = "String(Some(256))", nullable)]
    pub avatar: Option<String>,

    /// 所属部门ID
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub dept_id: Option<String>,

    /// 用户状态: "0"=正常, "1"=停用
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    /// 最后登录IP
    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub login_ip: Option<String>,

    /// 最后登录时间 (Unix 时间戳)
    pub login_date: Option<i64>,

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

// 角色、岗位关系通过 user_role / user_post 手动查询

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the account may log in
    pub fn is_active(&self) -> bool {
        self.status == STATUS_NORMAL
    }
}

/// 用户详情响应 (含角色、岗位ID)
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: Model,
    pub role_ids: Vec<String>,
    pub post_ids: Vec<String>,
}

impl From<Model> for UserDetail {
    fn from(user: Model) -> Self {
        Self {
            user,
            role_ids: Vec::new(),
            post_ids: Vec::new(),
        }
    }
}

impl UserDetail {
    pub fn with_assignments(mut self, role_ids: Vec<String>, post_ids: Vec<String>) -> Self {
        self.role_ids = role_ids;
        self.post_ids = post_ids;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_never_serialized() {
        let user = Model {
            id: "u1".to_string(),
            username: "admin".to_string(),
            password: "$2b$10$secret".to_string(),
            nickname: None,
            email: None,
            phone: None,
            avatar: None,
            dept_id: None,
            status: "0".to_string(),
            login_ip: None,
            login_date: None,
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        };
        let json = serde_json::to_value(UserDetail::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "admin");
        assert_eq!(json["roleIds"], serde_json::json!([]));
    }
}
