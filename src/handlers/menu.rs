//! Menu handlers
//!
//! Menus are stored flat and returned as a tree

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::entity::menu::{MenuTree, MenuType};
use crate::entity::oper_log::BusinessType;
use crate::entity::{menu, new_id, now_ts, role_menu, STATUS_NORMAL, VISIBLE_SHOW};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{filter_value, oper_entry, required, validate_status};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::tree::{build_tree, would_create_cycle, ROOT_PARENT_ID};

const TITLE: &str = "菜单管理";

/// Query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuQuery {
    pub menu_name: Option<String>,
    pub status: Option<String>,
}

/// Add menu request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMenuRequest {
    pub menu_name: String,
    pub parent_id: Option<String>,
    pub order_num: Option<i32>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub query: Option<String>,
    pub is_frame: Option<String>,
    pub is_cache: Option<String>,
    pub menu_type: Option<String>,
    pub visible: Option<String>,
    pub status: Option<String>,
    pub perms: Option<String>,
    pub icon: Option<String>,
    pub remark: Option<String>,
}

/// Update menu request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuRequest {
    pub menu_name: Option<String>,
    pub parent_id: Option<String>,
    pub order_num: Option<i32>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub query: Option<String>,
    pub is_frame: Option<String>,
    pub is_cache: Option<String>,
    pub menu_type: Option<String>,
    pub visible: Option<String>,
    pub status: Option<String>,
    pub perms: Option<String>,
    pub icon: Option<String>,
    pub remark: Option<String>,
}

/// A parent must exist (or be the root) and must not sit below `id`
fn check_parent(all: &[menu::Model], id: Option<&str>, parent_id: &str) -> AppResult<()> {
    if parent_id != ROOT_PARENT_ID && !all.iter().any(|m| m.id == parent_id) {
        return Err(AppError::BadRequest(format!("上级菜单不存在: {}", parent_id)));
    }
    if let Some(id) = id {
        if would_create_cycle(all, id, parent_id) {
            return Err(AppError::BadRequest("上级菜单不能是自己或下级菜单".to_string()));
        }
    }
    Ok(())
}

/// Visibility flags share the "0" / "1" encoding with status
fn validate_visible(visible: &str) -> AppResult<()> {
    validate_status(visible).map_err(|_| AppError::Validation(format!("invalid visible '{}'", visible)))
}

/// GET /api/system/menu
pub async fn list_menus(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<MenuQuery>,
) -> AppResult<Json<ApiResponse<Vec<MenuTree>>>> {
    current_user.require(perm::MENU_LIST)?;

    let mut select = menu::Entity::find();
    if let Some(name) = filter_value(&query.menu_name) {
        select = select.filter(menu::Column::MenuName.contains(name));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(menu::Column::Status.eq(status));
    }
    let menus = select
        .order_by_asc(menu::Column::OrderNum)
        .order_by_asc(menu::Column::Id)
        .all(&*db)
        .await?;

    let forest = build_tree(menus.into_iter().map(MenuTree::from).collect(), ROOT_PARENT_ID);
    // Filtered-out parents leave matches unreachable; list them at the top
    let mut roots = forest.roots;
    roots.extend(forest.orphans);

    Ok(Json(ApiResponse::success(roots)))
}

/// GET /api/system/menu/:id
pub async fn get_menu(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<menu::Model>>> {
    current_user.require(perm::MENU_QUERY)?;

    let found = menu::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("菜单不存在")?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/system/menu
pub async fn add_menu(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddMenuRequest>,
) -> AppResult<Json<ApiResponse<menu::Model>>> {
    current_user.require(perm::MENU_ADD)?;

    let result = create_menu(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Insert, "POST", "/api/system/menu", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_menu(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddMenuRequest,
) -> AppResult<menu::Model> {
    let menu_name = required(&req.menu_name, "menuName")?;
    let menu_type = MenuType::parse(req.menu_type.as_deref().unwrap_or("M"))?;
    let visible = req.visible.unwrap_or_else(|| VISIBLE_SHOW.to_string());
    validate_visible(&visible)?;
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;
    let parent_id = req
        .parent_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| ROOT_PARENT_ID.to_string());

    if parent_id != ROOT_PARENT_ID {
        let parent_exists = menu::Entity::find_by_id(parent_id.clone()).count(db).await? > 0;
        if !parent_exists {
            return Err(AppError::BadRequest(format!("上级菜单不存在: {}", parent_id)));
        }
    }

    let now = now_ts();
    let created = menu::ActiveModel {
        id: Set(new_id()),
        menu_name: Set(menu_name),
        parent_id: Set(parent_id),
        order_num: Set(req.order_num.unwrap_or(0)),
        path: Set(req.path),
        component: Set(req.component),
        query: Set(req.query),
        is_frame: Set(req.is_frame.unwrap_or_else(|| "1".to_string())),
        is_cache: Set(req.is_cache.unwrap_or_else(|| "0".to_string())),
        menu_type: Set(menu_type.as_str().to_string()),
        visible: Set(visible),
        status: Set(status),
        perms: Set(req.perms.filter(|p| !p.trim().is_empty())),
        icon: Set(req.icon),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(db)
    .await?;

    tracing::info!("Menu created: {} by {}", created.menu_name, current_user.username);
    Ok(created)
}

/// PUT /api/system/menu/:id
pub async fn update_menu(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateMenuRequest>,
) -> AppResult<Json<ApiResponse<menu::Model>>> {
    current_user.require(perm::MENU_EDIT)?;

    let url = format!("/api/system/menu/{}", id);
    let result = modify_menu(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_menu(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateMenuRequest,
) -> AppResult<menu::Model> {
    let existing = menu::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("菜单不存在")?;

    if let Some(parent_id) = &req.parent_id {
        if parent_id != &existing.parent_id {
            let all = menu::Entity::find().all(db).await?;
            check_parent(&all, Some(id), parent_id)?;
        }
    }
    let menu_type = req.menu_type.as_deref().map(MenuType::parse).transpose()?;
    if let Some(visible) = &req.visible {
        validate_visible(visible)?;
    }
    if let Some(status) = &req.status {
        validate_status(status)?;
    }

    let mut active: menu::ActiveModel = existing.into();
    if let Some(name) = req.menu_name {
        active.menu_name = Set(required(&name, "menuName")?);
    }
    if let Some(parent_id) = req.parent_id {
        active.parent_id = Set(parent_id);
    }
    if let Some(order_num) = req.order_num {
        active.order_num = Set(order_num);
    }
    if let Some(path) = req.path {
        active.path = Set(Some(path));
    }
    if let Some(component) = req.component {
        active.component = Set(Some(component));
    }
    if let Some(query) = req.query {
        active.query = Set(Some(query));
    }
    if let Some(is_frame) = req.is_frame {
        active.is_frame = Set(is_frame);
    }
    if let Some(is_cache) = req.is_cache {
        active.is_cache = Set(is_cache);
    }
    if let Some(menu_type) = menu_type {
        active.menu_type = Set(menu_type.as_str().to_string());
    }
    if let Some(visible) = req.visible {
        active.visible = Set(visible);
    }
    if let Some(status) = req.status {
        active.status = Set(status);
    }
    if let Some(perms) = req.perms {
        active.perms = Set(Some(perms).filter(|p| !p.trim().is_empty()));
    }
    if let Some(icon) = req.icon {
        active.icon = Set(Some(icon));
    }
    if let Some(remark) = req.remark {
        active.remark = Set(Some(remark));
    }
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());

    Ok(active.update(db).await?)
}

/// DELETE /api/system/menu/:id
pub async fn delete_menu(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::MENU_REMOVE)?;

    let url = format!("/api/system/menu/{}", id);
    let result = remove_menu(&db, &current_user, &id).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn remove_menu(db: &DatabaseConnection, current_user: &CurrentUser, id: &str) -> AppResult<()> {
    let children = menu::Entity::find()
        .filter(menu::Column::ParentId.eq(id))
        .count(db)
        .await?;
    if children > 0 {
        return Err(AppError::BadRequest("存在子菜单，无法删除".to_string()));
    }

    let txn = db.begin().await?;
    role_menu::Entity::delete_many()
        .filter(role_menu::Column::MenuId.eq(id))
        .exec(&txn)
        .await?;
    let res = menu::Entity::delete_by_id(id.to_string()).exec(&txn).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("菜单不存在".to_string()));
    }
    txn.commit().await?;

    tracing::info!("Menu deleted: {} by {}", id, current_user.username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn menu_row(id: &str, parent_id: &str) -> menu::Model {
        menu::Model {
            id: id.to_string(),
            menu_name: id.to_string(),
            parent_id: parent_id.to_string(),
            order_num: 1,
            path: None,
            component: None,
            query: None,
            is_frame: "1".to_string(),
            is_cache: "0".to_string(),
            menu_type: "M".to_string(),
            visible: "0".to_string(),
            status: "0".to_string(),
            perms: None,
            icon: None,
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        }
    }

    #[test]
    fn test_check_parent() {
        let all = vec![
            menu_row("system", "0"),
            menu_row("system-user", "system"),
            menu_row("system-user-add", "system-user"),
        ];
        assert!(check_parent(&all, Some("system-user"), "0").is_ok());
        assert!(check_parent(&all, None, "system").is_ok());
        assert!(check_parent(&all, None, "ghost").is_err());
        assert!(check_parent(&all, Some("system"), "system-user-add").is_err());
        assert!(check_parent(&all, Some("system"), "system").is_err());
    }

    #[tokio::test]
    async fn test_menu_with_children_not_deleted() {
        let count = BTreeMap::from([("num_items".to_string(), Value::BigInt(Some(2)))]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count]])
            .into_connection();
        let user = CurrentUser::default();
        let err = remove_menu(&db, &user, "system").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_menu_type_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let req = AddMenuRequest {
            menu_name: "Reports".to_string(),
            menu_type: Some("X".to_string()),
            ..Default::default()
        };
        let err = create_menu(&db, &CurrentUser::default(), req).await.unwrap_err();
        assert!(matches!(err, AppError::Access(crate::error::AccessError::Malformed(_))));
    }
}
