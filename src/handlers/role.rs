//! Role handlers
//!
//! Implements role CRUD and role-menu assignment

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::entity::oper_log::BusinessType;
use crate::entity::role::{DataScope, RoleDetail, ADMIN_ROLE_KEY};
use crate::entity::{
    menu, new_id, now_ts, role, role_menu, user_role, DEL_FLAG_DELETED, DEL_FLAG_PRESENT,
    STATUS_NORMAL,
};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{dedup, filter_value, oper_entry, required, validate_status, Page, PageResult};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const TITLE: &str = "角色管理";

/// Query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub role_name: Option<String>,
    pub role_key: Option<String>,
    pub status: Option<String>,
}

/// Add role request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRoleRequest {
    pub role_name: String,
    pub role_key: String,
    #[serde(default)]
    pub role_sort: i32,
    pub data_scope: Option<String>,
    #[serde(default)]
    pub menu_check_strictly: bool,
    #[serde(default)]
    pub dept_check_strictly: bool,
    pub status: Option<String>,
    pub remark: Option<String>,
    #[serde(default)]
    pub menu_ids: Vec<String>,
}

/// Update role request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role_name: Option<String>,
    pub role_key: Option<String>,
    pub role_sort: Option<i32>,
    pub data_scope: Option<String>,
    pub menu_check_strictly: Option<bool>,
    pub dept_check_strictly: Option<bool>,
    pub status: Option<String>,
    pub remark: Option<String>,
    pub menu_ids: Option<Vec<String>>,
}

async fn menu_ids_of<C: ConnectionTrait>(db: &C, role_id: &str) -> AppResult<Vec<String>> {
    Ok(role_menu::Entity::find()
        .filter(role_menu::Column::RoleId.eq(role_id))
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.menu_id)
        .collect())
}

async fn check_menus<C: ConnectionTrait>(db: &C, menu_ids: &[String]) -> AppResult<()> {
    if menu_ids.is_empty() {
        return Ok(());
    }
    let found = menu::Entity::find()
        .filter(menu::Column::Id.is_in(menu_ids.iter().cloned()))
        .count(db)
        .await?;
    if found != menu_ids.len() as u64 {
        return Err(AppError::BadRequest("包含不存在的菜单".to_string()));
    }
    Ok(())
}

async fn replace_menus<C: ConnectionTrait>(db: &C, role_id: &str, menu_ids: &[String]) -> AppResult<()> {
    role_menu::Entity::delete_many()
        .filter(role_menu::Column::RoleId.eq(role_id))
        .exec(db)
        .await?;
    if !menu_ids.is_empty() {
        role_menu::Entity::insert_many(menu_ids.iter().map(|m| role_menu::new_link(role_id, m)))
            .exec(db)
            .await?;
    }
    Ok(())
}

async fn key_taken<C: ConnectionTrait>(db: &C, role_key: &str, except_id: Option<&str>) -> AppResult<bool> {
    let mut select = role::Entity::find().filter(role::Column::RoleKey.eq(role_key));
    if let Some(id) = except_id {
        select = select.filter(role::Column::Id.ne(id));
    }
    Ok(select.count(db).await? > 0)
}

async fn find_role(db: &DatabaseConnection, id: &str) -> AppResult<role::Model> {
    role::Entity::find_by_id(id.to_string())
        .filter(role::Column::DelFlag.eq(DEL_FLAG_PRESENT))
        .one(db)
        .await?
        .ok_or_not_found("角色不存在")
}

/// GET /api/system/role
pub async fn list_roles(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<RoleQuery>,
) -> AppResult<Json<ApiResponse<PageResult<role::Model>>>> {
    current_user.require(perm::ROLE_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = role::Entity::find().filter(role::Column::DelFlag.eq(DEL_FLAG_PRESENT));
    if let Some(name) = filter_value(&query.role_name) {
        select = select.filter(role::Column::RoleName.contains(name));
    }
    if let Some(key) = filter_value(&query.role_key) {
        select = select.filter(role::Column::RoleKey.contains(key));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(role::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_asc(role::Column::RoleSort)
        .order_by_asc(role::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// GET /api/system/role/:id
pub async fn get_role(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    current_user.require(perm::ROLE_QUERY)?;

    let found = find_role(&db, &id).await?;
    let menu_ids = menu_ids_of(&*db, &id).await?;
    let user_count = user_role::Entity::find()
        .filter(user_role::Column::RoleId.eq(id.as_str()))
        .count(&*db)
        .await?;

    Ok(Json(ApiResponse::success(RoleDetail {
        role: found,
        menu_ids,
        user_count,
    })))
}

/// POST /api/system/role
pub async fn add_role(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddRoleRequest>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    current_user.require(perm::ROLE_ADD)?;

    let result = create_role(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Insert, "POST", "/api/system/role", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_role(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddRoleRequest,
) -> AppResult<RoleDetail> {
    let role_name = required(&req.role_name, "roleName")?;
    let role_key = required(&req.role_key, "roleKey")?;
    let data_scope = match req.data_scope.as_deref() {
        Some(code) => DataScope::parse(code)?,
        None => DataScope::All,
    };
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;
    let menu_ids = dedup(&req.menu_ids);

    if key_taken(db, &role_key, None).await? {
        return Err(AppError::Conflict(format!("角色权限字符已存在: {}", role_key)));
    }
    check_menus(db, &menu_ids).await?;

    let now = now_ts();
    let id = new_id();
    let txn = db.begin().await?;
    let created = role::ActiveModel {
        id: Set(id.clone()),
        role_name: Set(role_name),
        role_key: Set(role_key),
        role_sort: Set(req.role_sort),
        data_scope: Set(data_scope.as_code().to_string()),
        menu_check_strictly: Set(req.menu_check_strictly),
        dept_check_strictly: Set(req.dept_check_strictly),
        status: Set(status),
        del_flag: Set(DEL_FLAG_PRESENT.to_string()),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(&txn)
    .await?;
    replace_menus(&txn, &id, &menu_ids).await?;
    txn.commit().await?;

    tracing::info!("Role created: {} by {}", created.role_key, current_user.username);
    Ok(RoleDetail {
        role: created,
        menu_ids,
        user_count: 0,
    })
}

/// PUT /api/system/role/:id
pub async fn update_role(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    current_user.require(perm::ROLE_EDIT)?;

    let url = format!("/api/system/role/{}", id);
    let result = modify_role(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_role(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateRoleRequest,
) -> AppResult<RoleDetail> {
    let existing = find_role(db, id).await?;
    let is_admin_role = existing.role_key == ADMIN_ROLE_KEY;

    let role_key = match &req.role_key {
        Some(key) => Some(required(key, "roleKey")?),
        None => None,
    };
    if let Some(key) = &role_key {
        if is_admin_role && key != ADMIN_ROLE_KEY {
            return Err(AppError::BadRequest("不允许修改超级管理员角色标识".to_string()));
        }
        if key_taken(db, key, Some(id)).await? {
            return Err(AppError::Conflict(format!("角色权限字符已存在: {}", key)));
        }
    }
    if let Some(status) = &req.status {
        validate_status(status)?;
        if is_admin_role && status != STATUS_NORMAL {
            return Err(AppError::BadRequest("不允许停用超级管理员角色".to_string()));
        }
    }
    let data_scope = req.data_scope.as_deref().map(DataScope::parse).transpose()?;
    let menu_ids = req.menu_ids.as_deref().map(dedup);
    if let Some(menu_ids) = &menu_ids {
        check_menus(db, menu_ids).await?;
    }

    let txn = db.begin().await?;
    let mut active: role::ActiveModel = existing.into();
    if let Some(name) = req.role_name {
        active.role_name = Set(required(&name, "roleName")?);
    }
    if let Some(key) = role_key {
        active.role_key = Set(key);
    }
    if let Some(sort) = req.role_sort {
        active.role_sort = Set(sort);
    }
    if let Some(scope) = data_scope {
        active.data_scope = Set(scope.as_code().to_string());
    }
    if let Some(strict) = req.menu_check_strictly {
        active.menu_check_strictly = Set(strict);
    }
    if let Some(strict) = req.dept_check_strictly {
        active.dept_check_strictly = Set(strict);
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

    if let Some(menu_ids) = &menu_ids {
        replace_menus(&txn, id, menu_ids).await?;
    }
    txn.commit().await?;

    let menu_ids = menu_ids_of(db, id).await?;
    let user_count = user_role::Entity::find()
        .filter(user_role::Column::RoleId.eq(id))
        .count(db)
        .await?;
    Ok(RoleDetail {
        role: updated,
        menu_ids,
        user_count,
    })
}

/// DELETE /api/system/role/:id
/// Soft delete; assignments stay but the role stops contributing permissions
pub async fn delete_role(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ROLE_REMOVE)?;

    let url = format!("/api/system/role/{}", id);
    let result = remove_role(&db, &current_user, &id).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn remove_role(db: &DatabaseConnection, current_user: &CurrentUser, id: &str) -> AppResult<()> {
    let existing = find_role(db, id).await?;
    if existing.role_key == ADMIN_ROLE_KEY {
        return Err(AppError::BadRequest("不允许删除超级管理员角色".to_string()));
    }

    let mut active: role::ActiveModel = existing.into();
    active.del_flag = Set(DEL_FLAG_DELETED.to_string());
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());
    active.update(db).await?;

    tracing::info!("Role deleted: {} by {}", id, current_user.username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn admin() -> CurrentUser {
        CurrentUser {
            id: "u-admin".to_string(),
            username: "admin".to_string(),
            roles: vec![ADMIN_ROLE_KEY.to_string()],
            permissions: vec![],
        }
    }

    fn role_row(key: &str) -> role::Model {
        role::Model {
            id: format!("r-{}", key),
            role_name: key.to_string(),
            role_key: key.to_string(),
            role_sort: 1,
            data_scope: "1".to_string(),
            menu_check_strictly: false,
            dept_check_strictly: false,
            status: "0".to_string(),
            del_flag: "0".to_string(),
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        }
    }

    #[tokio::test]
    async fn test_admin_role_cannot_be_deleted() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![role_row(ADMIN_ROLE_KEY)]])
            .into_connection();
        let err = remove_role(&db, &admin(), "r-admin").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_admin_role_cannot_be_disabled() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![role_row(ADMIN_ROLE_KEY)]])
            .into_connection();
        let req = UpdateRoleRequest {
            status: Some("1".to_string()),
            ..Default::default()
        };
        let err = modify_role(&db, &admin(), "r-admin", req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_data_scope_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let req = AddRoleRequest {
            role_name: "Editor".to_string(),
            role_key: "editor".to_string(),
            data_scope: Some("9".to_string()),
            ..Default::default()
        };
        let err = create_role(&db, &admin(), req).await.unwrap_err();
        assert!(matches!(err, AppError::Access(crate::error::AccessError::Malformed(_))));
    }
}
