//! Audit log handlers
//!
//! Implements login / operation log queries and bulk clearing

use axum::{
    extract::Query,
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Deserialize;

use crate::entity::oper_log::{BusinessType, NewOperLog};
use crate::entity::{login_log, oper_log};
use crate::error::AppResult;
use crate::handlers::{client_ip, filter_value, Page, PageResult};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const TITLE_LOGIN_LOG: &str = "登录日志";
const TITLE_OPER_LOG: &str = "操作日志";

/// Query parameters for the login log
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginLogQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub user_name: Option<String>,
    pub ipaddr: Option<String>,
    pub status: Option<String>,
}

/// Query parameters for the operation log
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperLogQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub title: Option<String>,
    pub oper_name: Option<String>,
    pub business_type: Option<String>,
    pub status: Option<String>,
}

/// GET /api/monitor/log/login
pub async fn list_login_logs(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<LoginLogQuery>,
) -> AppResult<Json<ApiResponse<PageResult<login_log::Model>>>> {
    current_user.require(perm::LOGIN_LOG_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = login_log::Entity::find();
    if let Some(name) = filter_value(&query.user_name) {
        select = select.filter(login_log::Column::UserName.contains(name));
    }
    if let Some(ip) = filter_value(&query.ipaddr) {
        select = select.filter(login_log::Column::Ipaddr.contains(ip));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(login_log::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_desc(login_log::Column::LoginTime)
        .order_by_desc(login_log::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// DELETE /api/monitor/log/login
pub async fn clear_login_logs(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::LOGIN_LOG_REMOVE)?;

    let result = login_log::Entity::delete_many().exec(&*db).await;
    service::record(
        NewOperLog::new(TITLE_LOGIN_LOG, BusinessType::Clean, &current_user.username)
            .with_request("DELETE", "/api/monitor/log/login")
            .with_ip(client_ip(&headers)),
        &result,
    );
    let res = result?;

    tracing::info!("{} cleared {} login log rows", current_user.username, res.rows_affected);
    Ok(Json(ApiResponse::success_msg(format!("成功清空{}条日志", res.rows_affected))))
}

/// GET /api/monitor/log/oper
pub async fn list_oper_logs(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<OperLogQuery>,
) -> AppResult<Json<ApiResponse<PageResult<oper_log::Model>>>> {
    current_user.require(perm::OPER_LOG_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = oper_log::Entity::find();
    if let Some(title) = filter_value(&query.title) {
        select = select.filter(oper_log::Column::Title.contains(title));
    }
    if let Some(name) = filter_value(&query.oper_name) {
        select = select.filter(oper_log::Column::OperName.contains(name));
    }
    if let Some(bt) = filter_value(&query.business_type) {
        select = select.filter(oper_log::Column::BusinessType.eq(bt));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(oper_log::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_desc(oper_log::Column::OperTime)
        .order_by_desc(oper_log::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// DELETE /api/monitor/log/oper
pub async fn clear_oper_logs(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::OPER_LOG_REMOVE)?;

    let res = oper_log::Entity::delete_many().exec(&*db).await?;
    // Logged after the clear so the record survives it
    service::add_log(service::AuditEntry::Oper(
        NewOperLog::new(TITLE_OPER_LOG, BusinessType::Clean, &current_user.username)
            .with_request("DELETE", "/api/monitor/log/oper")
            .with_ip(client_ip(&headers)),
    ));

    tracing::info!("{} cleared {} operation log rows", current_user.username, res.rows_affected);
    Ok(Json(ApiResponse::success_msg(format!("成功清空{}条日志", res.rows_affected))))
}

/// Background writer for login and operation logs
pub mod service {
    use sea_orm::{ActiveModelTrait, NotSet, Set};
    use std::fmt::Display;
    use tokio::sync::mpsc;

    use crate::entity::oper_log::{NewOperLog, OPERATOR_BACKEND};
    use crate::entity::{login_log, now_ts, oper_log, STATUS_DISABLED, STATUS_NORMAL};

    const CHANNEL_CAPACITY: usize = 200;

    /// One login attempt
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LoginRecord {
        pub user_name: String,
        pub ipaddr: Option<String>,
        pub browser: Option<String>,
        pub os: Option<String>,
        pub success: bool,
        pub msg: String,
    }

    /// Log entry to be written
    #[derive(Debug, Clone)]
    pub enum AuditEntry {
        Login(LoginRecord),
        Oper(NewOperLog),
    }

    /// Global log channel
    static LOG_TX: std::sync::OnceLock<mpsc::Sender<AuditEntry>> = std::sync::OnceLock::new();

    /// Initialize the audit log service
    /// This function is idempotent - calling it multiple times is safe
    pub fn init(db: std::sync::Arc<sea_orm::DatabaseConnection>) {
        if LOG_TX.get().is_some() {
            tracing::debug!("Audit log service already initialized, skipping");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<AuditEntry>(CHANNEL_CAPACITY);
        if LOG_TX.set(tx).is_err() {
            tracing::debug!("Audit log service initialized by another thread");
            return;
        }

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let now = now_ts();
                let result = match entry {
                    AuditEntry::Login(record) => login_model(record, now).insert(&*db).await.map(|_| ()),
                    AuditEntry::Oper(record) => oper_model(record, now).insert(&*db).await.map(|_| ()),
                };
                if let Err(e) = result {
                    tracing::error!("Failed to write audit log: {}", e);
                }
            }
        });
    }

    /// Queue an entry; never blocks the caller
    pub fn add_log(entry: AuditEntry) {
        if let Some(tx) = LOG_TX.get() {
            if tx.try_send(entry).is_err() {
                tracing::warn!("Log channel is full, audit log dropped");
            }
        } else {
            tracing::warn!("Audit log service not initialized, log dropped: {:?}", entry);
        }
    }

    pub fn log_login(record: LoginRecord) {
        add_log(AuditEntry::Login(record));
    }

    /// Queue an operation record, marked failed when `result` is an error
    pub fn record<T, E: Display>(entry: NewOperLog, result: &Result<T, E>) {
        let entry = match result {
            Ok(_) => entry,
            Err(e) => entry.failed(e.to_string()),
        };
        add_log(AuditEntry::Oper(entry));
    }

    pub(crate) fn login_model(record: LoginRecord, now: i64) -> login_log::ActiveModel {
        login_log::ActiveModel {
            id: NotSet,
            user_name: Set(Some(record.user_name)),
            ipaddr: Set(record.ipaddr),
            login_location: Set(None),
            browser: Set(record.browser),
            os: Set(record.os),
            status: Set(if record.success { STATUS_NORMAL } else { STATUS_DISABLED }.to_string()),
            msg: Set(Some(record.msg)),
            login_time: Set(now),
        }
    }

    pub(crate) fn oper_model(record: NewOperLog, now: i64) -> oper_log::ActiveModel {
        let status = record.status().to_string();
        oper_log::ActiveModel {
            id: NotSet,
            title: Set(record.title),
            business_type: Set(record.business_type.as_code().to_string()),
            method: Set(None),
            request_method: Set(record.request_method),
            operator_type: Set(OPERATOR_BACKEND.to_string()),
            oper_name: Set(Some(record.oper_name)),
            oper_url: Set(record.oper_url),
            oper_ip: Set(record.oper_ip),
            oper_param: Set(record.oper_param),
            json_result: Set(None),
            status: Set(status),
            error_msg: Set(record.error_msg),
            oper_time: Set(now),
        }
    }
}
