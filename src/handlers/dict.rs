//! Dictionary handlers
//!
//! A dictionary type names a set of data rows; rows reference their type by
//! its `dict_type` string, so renaming a type rewrites its rows too.

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::entity::oper_log::BusinessType;
use crate::entity::{dict_data, dict_type, new_id, now_ts, STATUS_NORMAL};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{filter_value, oper_entry, required, validate_status, Page, PageResult};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const TITLE_TYPE: &str = "字典类型";
const TITLE_DATA: &str = "字典数据";

/// Type query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictTypeQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub dict_name: Option<String>,
    pub dict_type: Option<String>,
    pub status: Option<String>,
}

/// Data query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictDataQuery {
    pub page_num: Option<u64>,
    pub page_size: Option<u64>,
    pub dict_type: Option<String>,
    pub dict_label: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTypeRequest {
    pub dict_name: String,
    pub dict_type: String,
    pub status: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTypeRequest {
    pub dict_name: Option<String>,
    pub dict_type: Option<String>,
    pub status: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDataRequest {
    pub dict_type: String,
    pub dict_label: String,
    pub dict_value: String,
    #[serde(default)]
    pub dict_sort: i32,
    pub css_class: Option<String>,
    pub list_class: Option<String>,
    pub is_default: Option<String>,
    pub status: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataRequest {
    pub dict_type: Option<String>,
    pub dict_label: Option<String>,
    pub dict_value: Option<String>,
    pub dict_sort: Option<i32>,
    pub css_class: Option<String>,
    pub list_class: Option<String>,
    pub is_default: Option<String>,
    pub status: Option<String>,
    pub remark: Option<String>,
}

fn validate_is_default(flag: &str) -> AppResult<()> {
    match flag {
        "Y" | "N" => Ok(()),
        other => Err(AppError::Validation(format!("invalid isDefault '{}'", other))),
    }
}

async fn type_taken<C: ConnectionTrait>(db: &C, name: &str, except_id: Option<&str>) -> AppResult<bool> {
    let mut select = dict_type::Entity::find().filter(dict_type::Column::DictType.eq(name));
    if let Some(id) = except_id {
        select = select.filter(dict_type::Column::Id.ne(id));
    }
    Ok(select.count(db).await? > 0)
}

/// `(dict_type, dict_value)` is unique across data rows
async fn value_taken<C: ConnectionTrait>(
    db: &C,
    type_name: &str,
    value: &str,
    except_id: Option<&str>,
) -> AppResult<bool> {
    let mut select = dict_data::Entity::find()
        .filter(dict_data::Column::DictType.eq(type_name))
        .filter(dict_data::Column::DictValue.eq(value));
    if let Some(id) = except_id {
        select = select.filter(dict_data::Column::Id.ne(id));
    }
    Ok(select.count(db).await? > 0)
}

async fn require_type<C: ConnectionTrait>(db: &C, type_name: &str) -> AppResult<()> {
    if type_taken(db, type_name, None).await? {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("字典类型不存在: {}", type_name)))
    }
}

// ---- types ----

/// GET /api/system/dict/type
pub async fn list_types(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DictTypeQuery>,
) -> AppResult<Json<ApiResponse<PageResult<dict_type::Model>>>> {
    current_user.require(perm::DICT_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = dict_type::Entity::find();
    if let Some(name) = filter_value(&query.dict_name) {
        select = select.filter(dict_type::Column::DictName.contains(name));
    }
    if let Some(type_name) = filter_value(&query.dict_type) {
        select = select.filter(dict_type::Column::DictType.contains(type_name));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(dict_type::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_desc(dict_type::Column::CreateTime)
        .order_by_asc(dict_type::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// GET /api/system/dict/type/:id
pub async fn get_type(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<dict_type::Model>>> {
    current_user.require(perm::DICT_QUERY)?;

    let found = dict_type::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("字典类型不存在")?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/system/dict/type
pub async fn add_type(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddTypeRequest>,
) -> AppResult<Json<ApiResponse<dict_type::Model>>> {
    current_user.require(perm::DICT_ADD)?;

    let result = create_type(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE_TYPE, BusinessType::Insert, "POST", "/api/system/dict/type", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_type(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddTypeRequest,
) -> AppResult<dict_type::Model> {
    let dict_name = required(&req.dict_name, "dictName")?;
    let type_name = required(&req.dict_type, "dictType")?;
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;

    if type_taken(db, &type_name, None).await? {
        return Err(AppError::Conflict(format!("字典类型已存在: {}", type_name)));
    }

    let now = now_ts();
    let created = dict_type::ActiveModel {
        id: Set(new_id()),
        dict_name: Set(dict_name),
        dict_type: Set(type_name),
        status: Set(status),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(db)
    .await?;

    Ok(created)
}

/// PUT /api/system/dict/type/:id
pub async fn update_type(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateTypeRequest>,
) -> AppResult<Json<ApiResponse<dict_type::Model>>> {
    current_user.require(perm::DICT_EDIT)?;

    let url = format!("/api/system/dict/type/{}", id);
    let result = modify_type(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE_TYPE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_type(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateTypeRequest,
) -> AppResult<dict_type::Model> {
    let existing = dict_type::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("字典类型不存在")?;
    let old_name = existing.dict_type.clone();

    let renamed = match &req.dict_type {
        Some(name) => {
            let name = required(name, "dictType")?;
            (name != old_name).then_some(name)
        }
        None => None,
    };
    if let Some(name) = &renamed {
        if type_taken(db, name, Some(id)).await? {
            return Err(AppError::Conflict(format!("字典类型已存在: {}", name)));
        }
    }

    let txn = db.begin().await?;
    let mut active: dict_type::ActiveModel = existing.into();
    if let Some(name) = req.dict_name {
        active.dict_name = Set(required(&name, "dictName")?);
    }
    if let Some(name) = &renamed {
        active.dict_type = Set(name.clone());
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
    let updated = active.update(&txn).await?;

    if let Some(name) = &renamed {
        let res = dict_data::Entity::update_many()
            .col_expr(dict_data::Column::DictType, Expr::value(name.as_str()))
            .filter(dict_data::Column::DictType.eq(old_name.as_str()))
            .exec(&txn)
            .await?;
        tracing::info!(
            "Dict type renamed {} -> {}, {} data rows moved",
            old_name,
            name,
            res.rows_affected
        );
    }
    txn.commit().await?;

    Ok(updated)
}

/// DELETE /api/system/dict/type/:id
pub async fn delete_type(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::DICT_REMOVE)?;

    let url = format!("/api/system/dict/type/{}", id);
    let result = remove_type(&db, &id).await;
    service::record(
        oper_entry(&current_user, TITLE_TYPE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn remove_type(db: &DatabaseConnection, id: &str) -> AppResult<()> {
    let existing = dict_type::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("字典类型不存在")?;

    let in_use = dict_data::Entity::find()
        .filter(dict_data::Column::DictType.eq(existing.dict_type.as_str()))
        .count(db)
        .await?;
    if in_use > 0 {
        return Err(AppError::BadRequest(format!(
            "{} 已分配字典数据，不能删除",
            existing.dict_name
        )));
    }

    dict_type::Entity::delete_by_id(id.to_string()).exec(db).await?;
    Ok(())
}

// ---- data ----

/// GET /api/system/dict/data
pub async fn list_data(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DictDataQuery>,
) -> AppResult<Json<ApiResponse<PageResult<dict_data::Model>>>> {
    current_user.require(perm::DICT_LIST)?;

    let page = Page::new(query.page_num, query.page_size);
    let mut select = dict_data::Entity::find();
    if let Some(type_name) = filter_value(&query.dict_type) {
        select = select.filter(dict_data::Column::DictType.eq(type_name));
    }
    if let Some(label) = filter_value(&query.dict_label) {
        select = select.filter(dict_data::Column::DictLabel.contains(label));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(dict_data::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let rows = select
        .order_by_asc(dict_data::Column::DictSort)
        .order_by_asc(dict_data::Column::Id)
        .offset(page.offset())
        .limit(page.size)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(PageResult { rows, total })))
}

/// GET /api/system/dict/data/:id
pub async fn get_data(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<dict_data::Model>>> {
    current_user.require(perm::DICT_QUERY)?;

    let found = dict_data::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("字典数据不存在")?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/system/dict/data
pub async fn add_data(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddDataRequest>,
) -> AppResult<Json<ApiResponse<dict_data::Model>>> {
    current_user.require(perm::DICT_ADD)?;

    let result = create_data(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE_DATA, BusinessType::Insert, "POST", "/api/system/dict/data", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_data(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddDataRequest,
) -> AppResult<dict_data::Model> {
    let type_name = required(&req.dict_type, "dictType")?;
    let label = required(&req.dict_label, "dictLabel")?;
    let value = required(&req.dict_value, "dictValue")?;
    let is_default = req.is_default.unwrap_or_else(|| "N".to_string());
    validate_is_default(&is_default)?;
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;

    require_type(db, &type_name).await?;
    if value_taken(db, &type_name, &value, None).await? {
        return Err(AppError::Conflict(format!("字典键值已存在: {}", value)));
    }

    let now = now_ts();
    let created = dict_data::ActiveModel {
        id: Set(new_id()),
        dict_sort: Set(req.dict_sort),
        dict_label: Set(label),
        dict_value: Set(value),
        dict_type: Set(type_name),
        css_class: Set(req.css_class),
        list_class: Set(req.list_class),
        is_default: Set(is_default),
        status: Set(status),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
        remark: Set(req.remark),
    }
    .insert(db)
    .await?;

    Ok(created)
}

/// PUT /api/system/dict/data/:id
pub async fn update_data(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateDataRequest>,
) -> AppResult<Json<ApiResponse<dict_data::Model>>> {
    current_user.require(perm::DICT_EDIT)?;

    let url = format!("/api/system/dict/data/{}", id);
    let result = modify_data(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE_DATA, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_data(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateDataRequest,
) -> AppResult<dict_data::Model> {
    let existing = dict_data::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_not_found("字典数据不存在")?;

    let type_name = match &req.dict_type {
        Some(name) => required(name, "dictType")?,
        None => existing.dict_type.clone(),
    };
    let value = match &req.dict_value {
        Some(value) => required(value, "dictValue")?,
        None => existing.dict_value.clone(),
    };
    if type_name != existing.dict_type {
        require_type(db, &type_name).await?;
    }
    if (type_name != existing.dict_type || value != existing.dict_value)
        && value_taken(db, &type_name, &value, Some(id)).await?
    {
        return Err(AppError::Conflict(format!("字典键值已存在: {}", value)));
    }

    let mut active: dict_data::ActiveModel = existing.into();
    active.dict_type = Set(type_name);
    active.dict_value = Set(value);
    if let Some(label) = req.dict_label {
        active.dict_label = Set(required(&label, "dictLabel")?);
    }
    if let Some(sort) = req.dict_sort {
        active.dict_sort = Set(sort);
    }
    if let Some(css_class) = req.css_class {
        active.css_class = Set(Some(css_class));
    }
    if let Some(list_class) = req.list_class {
        active.list_class = Set(Some(list_class));
    }
    if let Some(flag) = req.is_default {
        validate_is_default(&flag)?;
        active.is_default = Set(flag);
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

/// DELETE /api/system/dict/data/:id
pub async fn delete_data(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::DICT_REMOVE)?;

    let url = format!("/api/system/dict/data/{}", id);
    let result = async {
        let res = dict_data::Entity::delete_by_id(id.clone()).exec(&*db).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("字典数据不存在".to_string()));
        }
        Ok::<(), AppError>(())
    }
    .await;
    service::record(
        oper_entry(&current_user, TITLE_DATA, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn count_row(n: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("num_items".to_string(), Value::BigInt(Some(n)))])
    }

    fn data_request(value: &str) -> AddDataRequest {
        AddDataRequest {
            dict_type: "sys_normal_disable".to_string(),
            dict_label: "正常".to_string(),
            dict_value: value.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_value_rejected_before_insert() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(1)], vec![count_row(1)]])
            .into_connection();
        let err = create_data(&db, &CurrentUser::default(), data_request("0"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Only the two existence checks ran; nothing was inserted
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        assert!(!format!("{:?}", log).contains("INSERT"));
    }

    #[tokio::test]
    async fn test_data_requires_existing_type() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(0)]])
            .into_connection();
        let err = create_data(&db, &CurrentUser::default(), data_request("0"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_is_default_flag_validated() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let req = AddDataRequest {
            is_default: Some("maybe".to_string()),
            ..data_request("0")
        };
        let err = create_data(&db, &CurrentUser::default(), req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_type_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(1)]])
            .into_connection();
        let req = AddTypeRequest {
            dict_name: "系统开关".to_string(),
            dict_type: "sys_normal_disable".to_string(),
            ..Default::default()
        };
        let err = create_type(&db, &CurrentUser::default(), req).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_type_in_use_not_deleted() {
        let now = now_ts();
        let existing = dict_type::Model {
            id: "t1".to_string(),
            dict_name: "系统开关".to_string(),
            dict_type: "sys_normal_disable".to_string(),
            status: "0".to_string(),
            create_by: None,
            create_time: now,
            update_by: None,
            update_time: now,
            remark: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .append_query_results([vec![count_row(2)]])
            .into_connection();
        let err = remove_type(&db, "t1").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
