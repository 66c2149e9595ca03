//! Authentication middleware
//!
//! Validates the login token on every API request and attaches the caller's
//! freshly resolved roles and permissions.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::DatabaseConnection;
use std::ops::Deref;
use std::sync::Arc;

use crate::entity::role::ADMIN_ROLE_KEY;
use crate::error::{AppError, AppResult};
use crate::identity::{validate_token, TokenError};
use crate::permission::{has_permission, has_role};
use crate::state::AppState;

/// Database connection wrapper for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub Arc<DatabaseConnection>);

impl DbConn {
    pub fn new(db: DatabaseConnection) -> Self {
        Self(Arc::new(db))
    }
}

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub use crate::permission::perm;

/// Extension to store current user in request
#[derive(Clone, Debug, Default)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    /// Keys of the effective roles
    pub roles: Vec<String>,
    /// Resolved permission strings
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        has_role(&self.roles, ADMIN_ROLE_KEY)
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, perm: &str) -> bool {
        self.is_admin() || has_permission(&self.permissions, perm)
    }

    /// Fail with 403 unless the user holds `perm`
    pub fn require(&self, perm: &str) -> AppResult<()> {
        if self.has_permission(perm) {
            Ok(())
        } else {
            tracing::warn!("Permission denied: {} lacks {}", self.username, perm);
            Err(AppError::Forbidden(perm.to_string()))
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    // Non-API paths are the static admin UI
    if !path.starts_with("/api") {
        return true;
    }

    path == "/api/auth/login" || path == "/api/health"
}

/// Token from `Authorization: Bearer` or the token cookie
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(DbConn(state.db.clone()));

    let path = request.uri().path().to_string();
    if is_public_path(&path) {
        return next.run(request).await;
    }

    let Some(token) = extract_token(request.headers(), &state.config.auth.cookie_name) else {
        return AppError::Unauthorized.into_response();
    };

    let claims = match validate_token(&state.db, &state.keys, &token).await {
        Ok(claims) => claims,
        Err(TokenError::LookupFailed(e)) => {
            tracing::error!("Database error during auth: {}", e);
            return AppError::Internal("authentication lookup failed".to_string()).into_response();
        }
        Err(e) => {
            tracing::debug!("Rejected token on {}: {}", path, e);
            return AppError::Unauthorized.into_response();
        }
    };

    // Permissions are resolved per request so revocations apply at once
    let (roles, permissions) = match state.resolver().resolve(&claims.sub).await {
        Ok(access) => {
            let permissions = access.sorted_permissions();
            (access.role_keys, permissions)
        }
        Err(e) => {
            tracing::error!("Permission resolution failed for {}: {}", claims.username, e);
            (Vec::new(), Vec::new())
        }
    };

    request.extensions_mut().insert(CurrentUser {
        id: claims.sub,
        username: claims.username,
        roles,
        permissions,
    });

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(roles: &[&str], permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: "u".to_string(),
            username: "alice".to_string(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/assets/index.js"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/api/health"));
        assert!(!is_public_path("/api/auth/info"));
        assert!(!is_public_path("/api/system/user"));
    }

    #[test]
    fn test_require_permission() {
        let editor = user(&["editor"], &[perm::USER_LIST]);
        assert!(editor.require(perm::USER_LIST).is_ok());
        assert!(matches!(editor.require(perm::USER_ADD), Err(AppError::Forbidden(p)) if p == perm::USER_ADD));

        assert!(user(&["admin"], &[]).require(perm::ROLE_REMOVE).is_ok());
        assert!(user(&[], &[perm::ALL]).require(perm::DICT_EDIT).is_ok());
        assert!(CurrentUser::default().require(perm::USER_LIST).is_err());
    }

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token=from-cookie; other=1"));
        assert_eq!(extract_token(&headers, "token").as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers, "token").as_deref(), Some("from-header"));

        assert_eq!(extract_token(&HeaderMap::new(), "token"), None);
    }
}
