//! User handlers
//!
//! Implements user CRUD, role/post assignment and password reset

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::entity::oper_log::BusinessType;
use crate::entity::{
    dept, new_id, now_ts, post, role, user, user_post, user_role, DEL_FLAG_PRESENT,
    STATUS_DISABLED, STATUS_NORMAL,
};
use crate::entity::user::UserDetail;
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{dedup, filter_value, oper_entry, required, validate_status, Page, PageResult};
use crate::identity::hash_password;
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::state::AppState;

const TITLE: &str = "用户管理";

/// Query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub dept_id: Option<String>,
}

/// Add user request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub username: String,
    pub password: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub dept_id: Option<String>,
    pub status: Option<String>,
    pub remark: Option<String>,
    #[serde(default)]
    pub role_ids: Vec<String>,
    #[serde(default)]
    pub post_ids: Vec<String>,
}

/// Update user request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub dept_id: Option<String>,
    pub status: Option<String>,
    pub remark: Option<String>,
    pub role_ids: Option<Vec<String>>,
    pub post_ids: Option<Vec<String>>,
}

/// Reset password request (admin resets user password)
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Role and post ids per user
async fn load_assignments(
    db: &DatabaseConnection,
    user_ids: &[String],
) -> AppResult<(HashMap<String, Vec<String>>, HashMap<String, Vec<String>>)> {
    let mut roles: HashMap<String, Vec<String>> = HashMap::new();
    let mut posts: HashMap<String, Vec<String>> = HashMap::new();
    if user_ids.is_empty() {
        return Ok((roles, posts));
    }

    for link in user_role::Entity::find()
        .filter(user_role::Column::UserId.is_in(user_ids.iter().cloned()))
        .all(db)
        .await?
    {
        roles.entry(link.user_id).or_default().push(link.role_id);
    }
    for link in user_post::Entity::find()
        .filter(user_post::Column::UserId.is_in(user_ids.iter().cloned()))
        .all(db)
        .await?
    {
        posts.entry(link.user_id).or_default().push(link.post_id);
    }

    Ok((roles, posts))
}

/// Referenced roles must exist and not be soft-deleted; posts must exist
async fn check_references<C: ConnectionTrait>(
    db: &C,
    dept_id: Option<&str>,
    role_ids: &[String],
    post_ids: &[String],
) -> AppResult<()> {
    if let Some(dept_id) = dept_id {
        let found = dept::Entity::find_by_id(dept_id.to_string())
            .filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT))
            .count(db)
            .await?;
        if found == 0 {
            return Err(AppError::BadRequest(format!("部门不存在: {}", dept_id)));
        }
    }
    if !role_ids.is_empty() {
        let found = role::Entity::find()
            .filter(role::Column::Id.is_in(role_ids.iter().cloned()))
            .filter(role::Column::DelFlag.eq(DEL_FLAG_PRESENT))
            .count(db)
            .await?;
        if found != role_ids.len() as u64 {
            return Err(AppError::BadRequest("包含不存在的角色".to_string()));
        }
    }
    if !post_ids.is_empty() {
        let found = post::Entity::find()
            .filter(post::Column::Id.is_in(post_ids.iter().cloned()))
            .count(db)
            .await?;
        if found != post_ids.len() as u64 {
            return Err(AppError::BadRequest("包含不存在的岗位".to_string()));
        }
    }
    Ok(())
}

async fn replace_roles<C: ConnectionTrait>(db: &C, user_id: &str, role_ids: &[String]) -> AppResult<()> {
    user_role::Entity::delete_many()
        .filter(user_role::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    if !role_ids.is_empty() {
        user_role::Entity::insert_many(role_ids.iter().map(|r| user_role::new_link(user_id, r)))
            .exec(db)
            .await?;
    }
    Ok(())
}

async fn replace_posts<C: ConnectionTrait>(db: &C, user_id: &str, post_ids: &[String]) -> AppResult<()> {
    user_post::Entity::delete_many()
        .filter(user_post::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    if !post_ids.is_empty() {
        user_post::Entity::insert_many(post_ids.iter().map(|p| user_post::new_link(user_id, p)))
            .exec(db)
            .await?;
    }
    Ok(())
}

/// GET /api/system/user
pub async fn list_users(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<PageResult<UserDetail>>>> {
    current_user.require(perm::USER_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = user::Entity::find();
    if let Some(username) = filter_value(&query.username) {
        select = select.filter(user::Column::Username.contains(username));
    }
    if let Some(phone) = filter_value(&query.phone) {
        select = select.filter(user::Column::Phone.contains(phone));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(user::Column::Status.eq(status));
    }
    if let Some(dept_id) = filter_value(&query.dept_id) {
        select = select.filter(user::Column::DeptId.eq(dept_id));
    }

    let total = select.clone().count(&*db).await?;
    let users = select
        .order_by_desc(user::Column::CreateTime)
        .order_by_asc(user::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
    let (mut roles, mut posts) = load_assignments(&db, &ids).await?;
    let rows = users
        .into_iter()
        .map(|u| {
            let role_ids = roles.remove(&u.id).unwrap_or_default();
            let post_ids = posts.remove(&u.id).unwrap_or_default();
            UserDetail::from(u).with_assignments(role_ids, post_ids)
        })
        .collect();

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// GET /api/system/user/:id
pub async fn get_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<UserDetail>>> {
    current_user.require(perm::USER_QUERY)?;

    let found = user::Entity::find_by_id(id.clone())
        .one(&*db)
        .await?
        .ok_or_not_found("用户不存在")?;
    let (mut roles, mut posts) = load_assignments(&db, &[id.clone()]).await?;

    let detail = UserDetail::from(found).with_assignments(
        roles.remove(&id).unwrap_or_default(),
        posts.remove(&id).unwrap_or_default(),
    );
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/system/user
pub async fn add_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddUserRequest>,
) -> AppResult<Json<ApiResponse<UserDetail>>> {
    current_user.require(perm::USER_ADD)?;

    let result = create_user(&state, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Insert, "POST", "/api/system/user", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_user(
    state: &AppState,
    current_user: &CurrentUser,
    req: AddUserRequest,
) -> AppResult<UserDetail> {
    let username = required(&req.username, "username")?;
    if req.password.is_empty() {
        return Err(AppError::Validation("password is required".to_string()));
    }
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;
    let role_ids = dedup(&req.role_ids);
    let post_ids = dedup(&req.post_ids);
    let dept_id = req.dept_id.filter(|d| !d.trim().is_empty());

    let db: &DatabaseConnection = &state.db;
    let exists = user::Entity::find()
        .filter(user::Column::Username.eq(username.as_str()))
        .count(db)
        .await?;
    if exists > 0 {
        return Err(AppError::Conflict(format!("用户名已存在: {}", username)));
    }
    check_references(db, dept_id.as_deref(), &role_ids, &post_ids).await?;

    let password = hash_password(&req.password, state.config.auth.bcrypt_cost)?;
    let now = now_ts();
    let id = new_id();

    let txn = db.begin().await?;
    let created = user::ActiveModel {
        id: Set(id.clone()),
        username: Set(username),
        password: Set(password),
        nickname: Set(req.nickname),
        email: Set(req.email),
        phone: Set(req.phone),
        avatar: Set(req.avatar),
        dept_id: Set(dept_id),
        status: Set(status),
        login_ip: Set(None),
        login_date: Set(None),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(&txn)
    .await?;
    replace_roles(&txn, &id, &role_ids).await?;
    replace_posts(&txn, &id, &post_ids).await?;
    txn.commit().await?;

    tracing::info!("User created: {} by {}", created.username, current_user.username);
    Ok(UserDetail::from(created).with_assignments(role_ids, post_ids))
}

/// PUT /api/system/user/:id
pub async fn update_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserDetail>>> {
    current_user.require(perm::USER_EDIT)?;

    let url = format!("/api/system/user/{}", id);
    let result = modify_user(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_user(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateUserRequest,
) -> AppResult<UserDetail> {
    let existing = user::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("用户不存在")?;

    if let Some(status) = &req.status {
        validate_status(status)?;
        if status == STATUS_DISABLED && existing.id == current_user.id {
            return Err(AppError::BadRequest("不能停用当前登录用户".to_string()));
        }
    }
    let dept_id = req.dept_id.map(|d| Some(d).filter(|d| !d.trim().is_empty()));
    let role_ids = req.role_ids.as_deref().map(dedup);
    let post_ids = req.post_ids.as_deref().map(dedup);
    check_references(
        db,
        dept_id.clone().flatten().as_deref(),
        role_ids.as_deref().unwrap_or_default(),
        post_ids.as_deref().unwrap_or_default(),
    )
    .await?;

    let txn = db.begin().await?;
    let mut active: user::ActiveModel = existing.into();
    if let Some(nickname) = req.nickname {
        active.nickname = Set(Some(nickname));
    }
    if let Some(email) = req.email {
        active.email = Set(Some(email));
    }
    if let Some(phone) = req.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(avatar) = req.avatar {
        active.avatar = Set(Some(avatar));
    }
    if let Some(dept_id) = dept_id {
        active.dept_id = Set(dept_id);
    }
    if let Some(status) = req.status {
        active.status = Set(status);
    }
    if let Some(remark) = req.remark {
        active.remark = Set(Some(remark));
    }
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());
    let updated = active.update(&txn).await?;

    if let Some(role_ids) = &role_ids {
        replace_roles(&txn, id, role_ids).await?;
    }
    if let Some(post_ids) = &post_ids {
        replace_posts(&txn, id, post_ids).await?;
    }
    txn.commit().await?;

    let (mut roles, mut posts) = load_assignments(db, &[id.to_string()]).await?;
    Ok(UserDetail::from(updated).with_assignments(
        roles.remove(id).unwrap_or_default(),
        posts.remove(id).unwrap_or_default(),
    ))
}

/// DELETE /api/system/user/:id
/// Soft delete: the account is disabled, never erased
pub async fn delete_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::USER_REMOVE)?;

    let url = format!("/api/system/user/{}", id);
    let result = disable_user(&db, &current_user, &id).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn disable_user(db: &DatabaseConnection, current_user: &CurrentUser, id: &str) -> AppResult<()> {
    if id == current_user.id {
        return Err(AppError::BadRequest("不能删除当前登录用户".to_string()));
    }

    let existing = user::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("用户不存在")?;

    let mut active: user::ActiveModel = existing.into();
    active.status = Set(STATUS_DISABLED.to_string());
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());
    active.update(db).await?;

    tracing::info!("User disabled: {} by {}", id, current_user.username);
    Ok(())
}

/// PUT /api/system/user/:id/password
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::USER_RESET_PWD)?;

    let url = format!("/api/system/user/{}/password", id);
    let result = set_password(&state, &current_user, &id, &req.password).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("密码重置成功")))
}

async fn set_password(
    state: &AppState,
    current_user: &CurrentUser,
    id: &str,
    password: &str,
) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::Validation("password is required".to_string()));
    }

    let existing = user::Entity::find_by_id(id.to_string())
        .one(&*state.db)
        .await?
        .ok_or_not_found("用户不存在")?;

    let mut active: user::ActiveModel = existing.into();
    active.password = Set(hash_password(password, state.config.auth.bcrypt_cost)?);
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());
    active.update(&*state.db).await?;

    tracing::info!("Password reset for {} by {}", id, current_user.username);
    Ok(())
}
