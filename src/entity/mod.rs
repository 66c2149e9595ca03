//! Entity module - SeaORM 实体定义
//!
//! 包含所有数据库表对应的实体模型

pub mod dept;
pub mod dict_data;
pub mod dict_type;
pub mod login_log;
pub mod menu;
pub mod oper_log;
pub mod post;
pub mod role;
pub mod role_menu;
pub mod user;
pub mod user_post;
pub mod user_role;

/// 状态: 正常
pub const STATUS_NORMAL: &str = "0";
/// 状态: 停用
pub const STATUS_DISABLED: &str = "1";

/// 删除标志: 存在
pub const DEL_FLAG_PRESENT: &str = "0";
/// 删除标志: 已删除
pub const DEL_FLAG_DELETED: &str = "2";

/// 显示标志: 显示
pub const VISIBLE_SHOW: &str = "0";
/// 显示标志: 隐藏
pub const VISIBLE_HIDE: &str = "1";

/// Generate a new opaque record id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time as a Unix timestamp
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
