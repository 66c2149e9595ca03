//! Post handlers

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;

use crate::entity::oper_log::BusinessType;
use crate::entity::{new_id, now_ts, post, user_post, STATUS_NORMAL};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{filter_value, oper_entry, required, validate_status, Page, PageResult};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const TITLE: &str = "岗位管理";

/// Query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub post_code: Option<String>,
    pub post_name: Option<String>,
    pub status: Option<String>,
}

/// Add post request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPostRequest {
    pub post_code: String,
    pub post_name: String,
    #[serde(default)]
    pub post_sort: i32,
    pub status: Option<String>,
    pub remark: Option<String>,
}

/// Update post request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub post_code: Option<String>,
    pub post_name: Option<String>,
    pub post_sort: Option<i32>,
    pub status: Option<String>,
    pub remark: Option<String>,
}

async fn code_taken(db: &DatabaseConnection, post_code: &str, except_id: Option<&str>) -> AppResult<bool> {
    let mut select = post::Entity::find().filter(post::Column::PostCode.eq(post_code));
    if let Some(id) = except_id {
        select = select.filter(post::Column::Id.ne(id));
    }
    Ok(select.count(db).await? > 0)
}

/// GET /api/system/post
pub async fn list_posts(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<PostQuery>,
) -> AppResult<Json<ApiResponse<PageResult<post::Model>>>> {
    current_user.require(perm::POST_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = post::Entity::find();
    if let Some(code) = filter_value(&query.post_code) {
        select = select.filter(post::Column::PostCode.contains(code));
    }
    if let Some(name) = filter_value(&query.post_name) {
        select = select.filter(post::Column::PostName.contains(name));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(post::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_asc(post::Column::PostSort)
        .order_by_asc(post::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// GET /api/system/post/:id
pub async fn get_post(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<post::Model>>> {
    current_user.require(perm::POST_QUERY)?;

    let found = post::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("岗位不存在")?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/system/post
pub async fn add_post(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddPostRequest>,
) -> AppResult<Json<ApiResponse<post::Model>>> {
    current_user.require(perm::POST_ADD)?;

    let result = create_post(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Insert, "POST", "/api/system/post", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_post(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddPostRequest,
) -> AppResult<post::Model> {
    let post_code = required(&req.post_code, "postCode")?;
    let post_name = required(&req.post_name, "postName")?;
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;

    if code_taken(db, &post_code, None).await? {
        return Err(AppError::Conflict(format!("岗位编码已存在: {}", post_code)));
    }

    let now = now_ts();
    let created = post::ActiveModel {
        id: Set(new_id()),
        post_code: Set(post_code),
        post_name: Set(post_name),
        post_sort: Set(req.post_sort),
        status: Set(status),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(db)
    .await?;

    tracing::info!("Post created: {} by {}", created.post_code, current_user.username);
    Ok(created)
}

/// PUT /api/system/post/:id
pub async fn update_post(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<post::Model>>> {
    current_user.require(perm::POST_EDIT)?;

    let url = format!("/api/system/post/{}", id);
    let result = modify_post(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_post(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdatePostRequest,
) -> AppResult<post::Model> {
    let existing = post::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("岗位不存在")?;

    let mut active: post::ActiveModel = existing.into();
    if let Some(code) = req.post_code {
        let code = required(&code, "postCode")?;
        if code_taken(db, &code, Some(id)).await? {
            return Err(AppError::Conflict(format!("岗位编码已存在: {}", code)));
        }
        active.post_code = Set(code);
    }
    if let Some(name) = req.post_name {
        active.post_name = Set(required(&name, "postName")?);
    }
    if let Some(sort) = req.post_sort {
        active.post_sort = Set(sort);
    }
    if let Some(status) = req.status {
        validate_status(&status)?;
        active.status = Set(status);
    }
    if let Some(remark) = req.remark {
        active.remark = Set(Some(remark));
    }
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());

    Ok(active.update(db).await?)
}

/// DELETE /api/system/post/:id
pub async fn delete_post(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::POST_REMOVE)?;

    let url = format!("/api/system/post/{}", id);
    let result = remove_post(&db, &current_user, &id).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn remove_post(db: &DatabaseConnection, current_user: &CurrentUser, id: &str) -> AppResult<()> {
    let assigned = user_post::Entity::find()
        .filter(user_post::Column::PostId.eq(id))
        .count(db)
        .await?;
    if assigned > 0 {
        return Err(AppError::BadRequest("岗位已分配，不能删除".to_string()));
    }

    let res = post::Entity::delete_by_id(id.to_string()).exec(db).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("岗位不存在".to_string()));
    }

    tracing::info!("Post deleted: {} by {}", id, current_user.username);
    Ok(())
}
