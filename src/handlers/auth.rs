//! Authentication handlers
//!
//! Implements login, logout, current user info and the sidebar menu tree

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};

use crate::entity::{menu, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service::{log_login, LoginRecord};
use crate::handlers::{client_ip, user_agent_parts};
use crate::identity::{authenticate, AuthError};
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

const MSG_LOGIN_SUCCESS: &str = "登录成功";
const MSG_LOGOUT_SUCCESS: &str = "退出成功";
const MSG_USER_NOT_FOUND: &str = "用户不存在";
const MSG_BAD_PASSWORD: &str = "密码错误";
const MSG_USER_DISABLED: &str = "用户已停用";

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: user::Model,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Current user info
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub user: user::Model,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

fn login_failure_msg(err: &AuthError) -> &'static str {
    match err {
        AuthError::UserNotFound => MSG_USER_NOT_FOUND,
        AuthError::BadPassword => MSG_BAD_PASSWORD,
        AuthError::UserDisabled => MSG_USER_DISABLED,
        AuthError::Internal(_) => "系统错误",
    }
}

/// Set-Cookie value carrying the token
fn token_cookie(name: &str, token: &str, max_age_secs: i64) -> AppResult<Cookie<'static>> {
    Cookie::parse(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, token, max_age_secs
    ))
    .map_err(|e| AppError::Internal(format!("invalid cookie: {}", e)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<LoginResponse>>)> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("username and password are required".to_string()));
    }

    let ip = client_ip(&headers);
    let (browser, os) = user_agent_parts(&headers);
    let mut record = LoginRecord {
        user_name: req.username.clone(),
        ipaddr: ip.clone(),
        browser,
        os,
        success: false,
        msg: String::new(),
    };

    let session = match authenticate(&state.db, &state.keys, &req.username, &req.password, ip).await {
        Ok(session) => session,
        Err(e) => {
            record.msg = login_failure_msg(&e).to_string();
            log_login(record);
            return Err(e.into());
        }
    };

    record.success = true;
    record.msg = MSG_LOGIN_SUCCESS.to_string();
    log_login(record);

    let cookie = token_cookie(
        &state.config.auth.cookie_name,
        &session.token,
        state.keys.ttl_secs(),
    )?;

    let response = LoginResponse {
        token: session.token,
        expires_in: state.keys.ttl_secs(),
        user: session.user,
        roles: session.claims.roles,
        permissions: session.claims.permissions,
    };

    Ok((jar.add(cookie), Json(ApiResponse::success(response))))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<()>>) {
    let (browser, os) = user_agent_parts(&headers);
    log_login(LoginRecord {
        user_name: current_user.username.clone(),
        ipaddr: client_ip(&headers),
        browser,
        os,
        success: true,
        msg: MSG_LOGOUT_SUCCESS.to_string(),
    });
    tracing::info!("User logged out: {}", current_user.username);

    let jar = jar.remove(Cookie::build((state.config.auth.cookie_name.clone(), "")).path("/"));
    (jar, Json(ApiResponse::success_msg(MSG_LOGOUT_SUCCESS)))
}

/// GET /api/auth/info
pub async fn info(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<InfoResponse>>> {
    let user = user::Entity::find_by_id(current_user.id.clone())
        .one(&*state.db)
        .await?
        .ok_or_not_found("用户不存在")?;

    Ok(Json(ApiResponse::success(InfoResponse {
        user,
        roles: current_user.roles,
        permissions: current_user.permissions,
    })))
}

/// GET /api/auth/routers
pub async fn routers(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<menu::MenuTree>>>> {
    let tree = state.resolver().menu_tree(&current_user.id).await?;
    Ok(Json(ApiResponse::success(tree)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cookie_attributes() {
        let cookie = token_cookie("token", "abc.def.ghi", 3600).unwrap();
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.value(), "abc.def.ghi");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(3600));
    }

    #[test]
    fn test_failure_messages_are_distinct_in_log() {
        assert_eq!(login_failure_msg(&AuthError::BadPassword), MSG_BAD_PASSWORD);
        assert_eq!(login_failure_msg(&AuthError::UserDisabled), MSG_USER_DISABLED);
        assert_ne!(
            login_failure_msg(&AuthError::UserNotFound),
            login_failure_msg(&AuthError::BadPassword)
        );
    }
}
