//! Department handlers
//!
//! Departments form a tree; each row caches its `ancestors` path so that
//! subtree queries need no recursion.

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Json,
    Extension,
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;

use crate::entity::dept::DeptTree;
use crate::entity::oper_log::BusinessType;
use crate::entity::{dept, new_id, now_ts, user, DEL_FLAG_DELETED, DEL_FLAG_PRESENT, STATUS_NORMAL};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service;
use crate::handlers::{filter_value, oper_entry, required, validate_status};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::tree::{ancestors_path, build_tree, would_create_cycle, ROOT_PARENT_ID};

const TITLE: &str = "部门管理";

/// Query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeptQuery {
    pub parent_id: Option<String>,
    pub dept_name: Option<String>,
    pub status: Option<String>,
}

/// Add department request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDeptRequest {
    pub dept_name: String,
    pub parent_id: Option<String>,
    pub order_num: Option<i32>,
    pub leader: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

/// Update department request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeptRequest {
    pub dept_name: Option<String>,
    pub parent_id: Option<String>,
    pub order_num: Option<i32>,
    pub leader: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

/// New `ancestors` for every descendant of a department whose own path
/// changes from `old_path` to `new_path` (both ending in its id).
fn rebase_descendants(depts: &[dept::Model], old_path: &str, new_path: &str) -> Vec<(String, String)> {
    let nested = format!("{},", old_path);
    depts
        .iter()
        .filter_map(|d| {
            if d.ancestors == old_path {
                Some((d.id.clone(), new_path.to_string()))
            } else {
                d.ancestors
                    .strip_prefix(&nested)
                    .map(|rest| (d.id.clone(), format!("{},{}", new_path, rest)))
            }
        })
        .collect()
}

async fn find_present(db: &DatabaseConnection, id: &str) -> AppResult<dept::Model> {
    dept::Entity::find_by_id(id.to_string())
        .filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT))
        .one(db)
        .await?
        .ok_or_not_found("部门不存在")
}

/// Department names are unique among live siblings
async fn check_unique_name(
    db: &DatabaseConnection,
    parent_id: &str,
    dept_name: &str,
    exclude_id: Option<&str>,
) -> AppResult<()> {
    let mut select = dept::Entity::find()
        .filter(dept::Column::ParentId.eq(parent_id))
        .filter(dept::Column::DeptName.eq(dept_name))
        .filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT));
    if let Some(id) = exclude_id {
        select = select.filter(dept::Column::Id.ne(id));
    }
    if select.count(db).await? > 0 {
        return Err(AppError::Conflict(format!("部门名称已存在: {}", dept_name)));
    }
    Ok(())
}

/// GET /api/system/dept
pub async fn list_depts(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DeptQuery>,
) -> AppResult<Json<ApiResponse<Vec<DeptTree>>>> {
    current_user.require(perm::DEPT_LIST)?;

    let mut select = dept::Entity::find().filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT));
    if let Some(parent_id) = filter_value(&query.parent_id) {
        select = select.filter(dept::Column::ParentId.eq(parent_id));
    }
    if let Some(name) = filter_value(&query.dept_name) {
        select = select.filter(dept::Column::DeptName.contains(name));
    }
    if let Some(status) = filter_value(&query.status) {
        select = select.filter(dept::Column::Status.eq(status));
    }
    let depts = select
        .order_by_asc(dept::Column::OrderNum)
        .order_by_asc(dept::Column::Id)
        .all(&*db)
        .await?;

    let nodes: Vec<DeptTree> = depts.into_iter().map(DeptTree::from).collect();
    if filter_value(&query.parent_id).is_some() {
        return Ok(Json(ApiResponse::success(nodes)));
    }

    let forest = build_tree(nodes, ROOT_PARENT_ID);
    let mut roots = forest.roots;
    roots.extend(forest.orphans);
    Ok(Json(ApiResponse::success(roots)))
}

/// GET /api/system/dept/:id
pub async fn get_dept(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<dept::Model>>> {
    current_user.require(perm::DEPT_QUERY)?;
    Ok(Json(ApiResponse::success(find_present(&db, &id).await?)))
}

/// POST /api/system/dept
pub async fn add_dept(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AddDeptRequest>,
) -> AppResult<Json<ApiResponse<dept::Model>>> {
    current_user.require(perm::DEPT_ADD)?;

    let result = create_dept(&db, &current_user, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Insert, "POST", "/api/system/dept", &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn create_dept(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    req: AddDeptRequest,
) -> AppResult<dept::Model> {
    let dept_name = required(&req.dept_name, "deptName")?;
    let status = req.status.unwrap_or_else(|| STATUS_NORMAL.to_string());
    validate_status(&status)?;
    let parent_id = req
        .parent_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| ROOT_PARENT_ID.to_string());

    let ancestors = if parent_id == ROOT_PARENT_ID {
        ancestors_path(&parent_id, None)
    } else {
        let parent = find_present(db, &parent_id).await?;
        if parent.status != STATUS_NORMAL {
            return Err(AppError::BadRequest("上级部门已停用，不允许新增".to_string()));
        }
        ancestors_path(&parent_id, Some(&parent.ancestors))
    };
    check_unique_name(db, &parent_id, &dept_name, None).await?;

    let now = now_ts();
    let created = dept::ActiveModel {
        id: Set(new_id()),
        parent_id: Set(parent_id),
        ancestors: Set(ancestors),
        dept_name: Set(dept_name),
        order_num: Set(req.order_num.unwrap_or(0)),
        leader: Set(req.leader),
        phone: Set(req.phone),
        email: Set(req.email),
        status: Set(status),
        del_flag: Set(DEL_FLAG_PRESENT.to_string()),
        create_by: Set(Some(current_user.username.clone())),
        create_time: Set(now),
        update_by: Set(None),
        update_time: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!("Dept created: {} by {}", created.dept_name, current_user.username);
    Ok(created)
}

/// PUT /api/system/dept/:id
pub async fn update_dept(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateDeptRequest>,
) -> AppResult<Json<ApiResponse<dept::Model>>> {
    current_user.require(perm::DEPT_EDIT)?;

    let url = format!("/api/system/dept/{}", id);
    let result = modify_dept(&db, &current_user, &id, req).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Update, "PUT", &url, &headers),
        &result,
    );
    Ok(Json(ApiResponse::success(result?)))
}

async fn modify_dept(
    db: &DatabaseConnection,
    current_user: &CurrentUser,
    id: &str,
    req: UpdateDeptRequest,
) -> AppResult<dept::Model> {
    let existing = find_present(db, id).await?;
    if let Some(status) = &req.status {
        validate_status(status)?;
    }

    let parent_id = req
        .parent_id
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| existing.parent_id.clone());
    let dept_name = match &req.dept_name {
        Some(name) => required(name, "deptName")?,
        None => existing.dept_name.clone(),
    };
    if dept_name != existing.dept_name || parent_id != existing.parent_id {
        check_unique_name(db, &parent_id, &dept_name, Some(id)).await?;
    }

    // Re-parenting moves the whole subtree, soft-deleted rows included
    let mut rebased = Vec::new();
    let mut ancestors = existing.ancestors.clone();
    if parent_id != existing.parent_id {
        let all = dept::Entity::find().all(db).await?;
        if would_create_cycle(&all, id, &parent_id) {
            return Err(AppError::BadRequest("上级部门不能是自己或下级部门".to_string()));
        }
        ancestors = if parent_id == ROOT_PARENT_ID {
            ancestors_path(&parent_id, None)
        } else {
            let parent = all
                .iter()
                .find(|d| d.id == parent_id && d.del_flag == DEL_FLAG_PRESENT)
                .ok_or_not_found(format!("上级部门不存在: {}", parent_id))?;
            if parent.status != STATUS_NORMAL {
                return Err(AppError::BadRequest("上级部门已停用，不允许移入".to_string()));
            }
            ancestors_path(&parent_id, Some(&parent.ancestors))
        };
        let old_path = format!("{},{}", existing.ancestors, id);
        let new_path = format!("{},{}", ancestors, id);
        rebased = rebase_descendants(&all, &old_path, &new_path);
    }

    let txn = db.begin().await?;
    let mut active: dept::ActiveModel = existing.into();
    active.dept_name = Set(dept_name);
    active.parent_id = Set(parent_id);
    active.ancestors = Set(ancestors);
    if let Some(order_num) = req.order_num {
        active.order_num = Set(order_num);
    }
    if let Some(leader) = req.leader {
        active.leader = Set(Some(leader));
    }
    if let Some(phone) = req.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(email) = req.email {
        active.email = Set(Some(email));
    }
    if let Some(status) = req.status {
        active.status = Set(status);
    }
    active.update_by = Set(Some(current_user.username.clone()));
    active.update_time = Set(now_ts());
    let updated = active.update(&txn).await?;

    for (child_id, child_ancestors) in &rebased {
        dept::Entity::update_many()
            .col_expr(dept::Column::Ancestors, Expr::value(child_ancestors.as_str()))
            .filter(dept::Column::Id.eq(child_id.as_str()))
            .exec(&txn)
            .await?;
    }
    txn.commit().await?;

    if !rebased.is_empty() {
        tracing::info!("Dept {} moved with {} descendants", id, rebased.len());
    }
    Ok(updated)
}

/// DELETE /api/system/dept/:id
pub async fn delete_dept(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::DEPT_REMOVE)?;

    let url = format!("/api/system/dept/{}", id);
    let result = remove_dept(&db, &current_user, &id).await;
    service::record(
        oper_entry(&current_user, TITLE, BusinessType::Delete, "DELETE", &url, &headers),
        &result,
    );
    result?;
    Ok(Json(ApiResponse::success_msg("删除成功")))
}

async fn remove_dept(db: &DatabaseConnection, current_user: &CurrentUser, id: &str) -> AppResult<()> {
    let children = dept::Entity::find()
        .filter(dept::Column::ParentId.eq(id))
        .filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT))
        .count(db)
        .await?;
    if children > 0 {
        return Err(AppError::BadRequest("存在下级部门，不允许删除".to_string()));
    }
    let members = user::Entity::find()
        .filter(user::Column::DeptId.eq(id))
        .count(db)
        .await?;
    if members > 0 {
        return Err(AppError::BadRequest("部门存在用户，不允许删除".to_string()));
    }

    let res = dept::Entity::update_many()
        .col_expr(dept::Column::DelFlag, Expr::value(DEL_FLAG_DELETED))
        .col_expr(dept::Column::UpdateTime, Expr::value(now_ts()))
        .filter(dept::Column::Id.eq(id))
        .filter(dept::Column::DelFlag.eq(DEL_FLAG_PRESENT))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("部门不存在".to_string()));
    }

    tracing::info!("Dept deleted: {} by {}", id, current_user.username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn dept_row(id: &str, parent_id: &str, ancestors: &str) -> dept::Model {
        dept::Model {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            ancestors: ancestors.to_string(),
            dept_name: id.to_string(),
            order_num: 0,
            leader: None,
            phone: None,
            email: None,
            status: "0".to_string(),
            del_flag: "0".to_string(),
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
        }
    }

    fn count_row(n: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("num_items".to_string(), Value::BigInt(Some(n)))])
    }

    #[test]
    fn test_rebase_descendants() {
        let all = vec![
            dept_row("hq", "0", "0"),
            dept_row("rd", "hq", "0,hq"),
            dept_row("rd-web", "rd", "0,hq,rd"),
            dept_row("rd-web-ui", "rd-web", "0,hq,rd,rd-web"),
            dept_row("rdx", "hq", "0,hq"),
            dept_row("rdx-ops", "rdx", "0,hq,rdx"),
        ];
        // Move rd under rdx
        let mut moved = rebase_descendants(&all, "0,hq,rd", "0,hq,rdx,rd");
        moved.sort();
        assert_eq!(
            moved,
            vec![
                ("rd-web".to_string(), "0,hq,rdx,rd".to_string()),
                ("rd-web-ui".to_string(), "0,hq,rdx,rd,rd-web".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_dept_with_children_not_deleted() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(1)]])
            .into_connection();
        let err = remove_dept(&db, &CurrentUser::default(), "hq").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_dept_with_users_not_deleted() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(0)], vec![count_row(3)]])
            .into_connection();
        let err = remove_dept(&db, &CurrentUser::default(), "hq").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_dept_soft_deleted() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(0)], vec![count_row(0)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        assert!(remove_dept(&db, &CurrentUser::default(), "rd").await.is_ok());
    }

    #[test]
    fn test_rebase_includes_deleted_descendants() {
        let mut gone = dept_row("rd-old", "rd", "0,hq,rd");
        gone.del_flag = "2".to_string();
        let all = vec![dept_row("rd", "hq", "0,hq"), gone];
        let moved = rebase_descendants(&all, "0,hq,rd", "0,rd");
        assert_eq!(moved, vec![("rd-old".to_string(), "0,rd".to_string())]);
    }

    #[tokio::test]
    async fn test_move_under_disabled_parent_refused() {
        let mut frozen = dept_row("ops", "hq", "0,hq");
        frozen.status = "1".to_string();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![dept_row("rd", "hq", "0,hq")]])
            .append_query_results([vec![count_row(0)]])
            .append_query_results([vec![dept_row("hq", "0", "0"), dept_row("rd", "hq", "0,hq"), frozen]])
            .into_connection();
        let req = UpdateDeptRequest {
            parent_id: Some("ops".to_string()),
            ..Default::default()
        };
        let err = modify_dept(&db, &CurrentUser::default(), "rd", req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("停用")));
    }

    #[tokio::test]
    async fn test_move_under_own_descendant_refused() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![dept_row("rd", "hq", "0,hq")]])
            .append_query_results([vec![count_row(0)]])
            .append_query_results([vec![
                dept_row("hq", "0", "0"),
                dept_row("rd", "hq", "0,hq"),
                dept_row("rd-web", "rd", "0,hq,rd"),
            ]])
            .into_connection();
        let req = UpdateDeptRequest {
            parent_id: Some("rd-web".to_string()),
            ..Default::default()
        };
        let err = modify_dept(&db, &CurrentUser::default(), "rd", req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
