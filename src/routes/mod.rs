use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            msg: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(msg: impl Into<String>) -> Self {
        Self {
            code: 200,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/info", get(handlers::auth::info))
        .route("/auth/routers", get(handlers::auth::routers))
        // User routes
        .route("/system/user", get(handlers::user::list_users).post(handlers::user::add_user))
        .route(
            "/system/user/:id",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        .route("/system/user/:id/password", put(handlers::user::reset_password))
        // Role routes
        .route("/system/role", get(handlers::role::list_roles).post(handlers::role::add_role))
        .route(
            "/system/role/:id",
            get(handlers::role::get_role)
                .put(handlers::role::update_role)
                .delete(handlers::role::delete_role),
        )
        // Menu routes
        .route("/system/menu", get(handlers::menu::list_menus).post(handlers::menu::add_menu))
        .route(
            "/system/menu/:id",
            get(handlers::menu::get_menu)
                .put(handlers::menu::update_menu)
                .delete(handlers::menu::delete_menu),
        )
        // Department routes
        .route("/system/dept", get(handlers::dept::list_depts).post(handlers::dept::add_dept))
        .route(
            "/system/dept/:id",
            get(handlers::dept::get_dept)
                .put(handlers::dept::update_dept)
                .delete(handlers::dept::delete_dept),
        )
        // Post routes
        .route("/system/post", get(handlers::post::list_posts).post(handlers::post::add_post))
        .route(
            "/system/post/:id",
            get(handlers::post::get_post)
                .put(handlers::post::update_post)
                .delete(handlers::post::delete_post),
        )
        // Dictionary routes
        .route(
            "/system/dict/type",
            get(handlers::dict::list_types).post(handlers::dict::add_type),
        )
        .route(
            "/system/dict/type/:id",
            get(handlers::dict::get_type)
                .put(handlers::dict::update_type)
                .delete(handlers::dict::delete_type),
        )
        .route(
            "/system/dict/data",
            get(handlers::dict::list_data).post(handlers::dict::add_data),
        )
        .route(
            "/system/dict/data/:id",
            get(handlers::dict::get_data)
                .put(handlers::dict::update_data)
                .delete(handlers::dict::delete_data),
        )
        // Audit log routes
        .route(
            "/monitor/log/login",
            get(handlers::audit::list_login_logs).delete(handlers::audit::clear_login_logs),
        )
        .route(
            "/monitor/log/oper",
            get(handlers::audit::list_oper_logs).delete(handlers::audit::clear_oper_logs),
        )
        .fallback(fallback);

    // Static admin UI; unknown paths fall back to index.html for SPA routing
    let static_dir = state.config.static_dir.clone();
    let index_file = static_dir.join("index.html");
    let serve_dir = ServeDir::new(&static_dir).not_found_service(ServeFile::new(index_file));

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(404, "Not Found")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(ok, serde_json::json!({"code": 200, "msg": "操作成功", "data": [1, 2]}));

        let err = serde_json::to_value(ApiResponse::<()>::error(400, "bad")).unwrap();
        assert_eq!(err, serde_json::json!({"code": 400, "msg": "bad"}));
    }
}
