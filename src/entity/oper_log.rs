//! OperLog entity - 操作日志记录
//!
//! 表名: sys_oper_log
//! 只追加, 仅支持整体清空

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 业务类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessType {
    /// 其它
    Other,
    /// 新增
    Insert,
    /// 修改
    Update,
    /// 删除
    Delete,
    /// 授权
    Grant,
    /// 导出
    Export,
    /// 导入
    Import,
    /// 强退
    ForceLogout,
    /// 生成代码
    GenCode,
    /// 清空数据
    Clean,
}

impl BusinessType {
    pub fn as_code(&self) -> &'static str {
        match self {
            BusinessType::Other => "0",
            BusinessType::Insert => "1",
            BusinessType::Update => "2",
            BusinessType::Delete => "3",
            BusinessType::Grant => "4",
            BusinessType::Export => "5",
            BusinessType::Import => "6",
            BusinessType::ForceLogout => "7",
            BusinessType::GenCode => "8",
            BusinessType::Clean => "9",
        }
    }

    /// 转换为中文显示
    pub fn to_chinese(&self) -> &'static str {
        match self {
            BusinessType::Other => "其它",
            BusinessType::Insert => "新增",
            BusinessType::Update => "修改",
            BusinessType::Delete => "删除",
            BusinessType::Grant => "授权",
            BusinessType::Export => "导出",
            BusinessType::Import => "导入",
            BusinessType::ForceLogout => "强退",
            BusinessType::GenCode => "生成代码",
            BusinessType::Clean => "清空数据",
        }
    }
}

/// 操作人类别
pub const OPERATOR_BACKEND: &str = "1";

/// 操作状态
pub const OPER_SUCCESS: &str = "0";
pub const OPER_FAILED: &str = "1";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sys_oper_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 模块标题
    #[sea_orm(column_type = "String(Some(50))")]
    pub title: String,

    /// 业务类型: 0=其它 1=新增 2=修改 3=删除 ...
    #[sea_orm(column_type = "String(Some(2))")]
    pub business_type: String,

    /// 方法名称
    #[sea_orm(column_type = "String(Some(100))", nullable)]
    pub method: Option<String>,

    /// 请求方式
    #[sea_orm(column_type = "String(Some(10))", nullable)]
    pub request_method: Option<String>,

    /// 操作类别: 0=其它 1=后台用户 2=手机端用户
    #[sea_orm(column_type = "String(Some(1))")]
    pub operator_type: String,

    /// 操作人员
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub oper_name: Option<String>,

    /// 请求URL
    #[sea_orm(column_type = "String(Some(255))", nullable)]
    pub oper_url: Option<String>,

    /// 主机地址
    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub oper_ip: Option<String>,

    /// 请求参数
    #[sea_orm(column_type = "Text", nullable)]
    pub oper_param: Option<String>,

    /// 返回参数
    #[sea_orm(column_type = "Text", nullable)]
    pub json_result: Option<String>,

    /// 操作状态: "0"=正常, "1"=异常
    #[sea_orm(column_type = "String(Some(1))")]
    pub status: String,

    /// 错误消息
    #[sea_orm(column_type = "Text", nullable)]
    pub error_msg: Option<String>,

    /// 操作时间 (Unix 时间戳)
    pub oper_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 创建日志记录的辅助结构
#[derive(Clone, Debug)]
pub struct NewOperLog {
    pub title: String,
    pub business_type: BusinessType,
    pub oper_name: String,
    pub request_method: Option<String>,
    pub oper_url: Option<String>,
    pub oper_ip: Option<String>,
    pub oper_param: Option<String>,
    pub error_msg: Option<String>,
}

impl NewOperLog {
    pub fn new(title: impl Into<String>, business_type: BusinessType, oper_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            business_type,
            oper_name: oper_name.into(),
            request_method: None,
            oper_url: None,
            oper_ip: None,
            oper_param: None,
            error_msg: None,
        }
    }

    pub fn with_request(mut self, method: impl Into<String>, url: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.oper_url = Some(url.into());
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.oper_ip = ip;
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.oper_param = Some(param.into());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error_msg = Some(error.into());
        self
    }

    pub fn status(&self) -> &'static str {
        if self.error_msg.is_some() {
            OPER_FAILED
        } else {
            OPER_SUCCESS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_oper_log_builder() {
        let entry = NewOperLog::new("用户管理", BusinessType::Insert, "admin")
            .with_request("POST", "/api/system/user")
            .with_param("username=alice");
        assert_eq!(entry.business_type.as_code(), "1");
        assert_eq!(entry.status(), OPER_SUCCESS);

        let failed = entry.failed("用户名已存在");
        assert_eq!(failed.status(), OPER_FAILED);
        assert_eq!(BusinessType::Clean.to_chinese(), "清空数据");
    }
}
