//! Login and token validation
//!
//! Passwords are bcrypt hashes; sessions are stateless HS256 tokens carrying
//! the user id, role keys and permission strings resolved at login.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::entity::{now_ts, user};
use crate::permission::PermissionResolver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    BadPassword,

    #[error("user is disabled")]
    UserDisabled,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("user no longer exists or is disabled")]
    UserGone,

    #[error("lookup failed: {0}")]
    LookupFailed(String),
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys plus token lifetime
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(auth.jwt_secret.as_bytes(), auth.token_ttl_secs())
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Sign a token for the given identity, valid from now for the TTL
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<(String, Claims), AuthError> {
        let iat = now_ts();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            roles,
            permissions,
            iat,
            exp: iat + self.ttl_secs,
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))
    }

    /// Verify signature and expiry
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub claims: Claims,
    pub user: user::Model,
}

/// Hash a password for storage
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt: {}", e)))
}

/// Check credentials, resolve access and issue a token
pub async fn authenticate(
    db: &DatabaseConnection,
    keys: &TokenKeys,
    username: &str,
    password: &str,
    ip: Option<String>,
) -> Result<LoginSession, AuthError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    let Some(account) = found else {
        tracing::warn!("Login failed: user not found - {}", username);
        return Err(AuthError::UserNotFound);
    };

    // A corrupt hash counts as a mismatch
    if !bcrypt::verify(password, &account.password).unwrap_or(false) {
        tracing::warn!("Login failed: wrong password - {}", username);
        return Err(AuthError::BadPassword);
    }

    if !account.is_active() {
        tracing::warn!("Login failed: user disabled - {}", username);
        return Err(AuthError::UserDisabled);
    }

    let access = PermissionResolver::new(db)
        .resolve(&account.id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    let (token, claims) = keys.issue(
        &account.id,
        &account.username,
        access.role_keys.clone(),
        access.sorted_permissions(),
    )?;

    let login_date = claims.iat;
    if let Err(e) = user::Entity::update_many()
        .col_expr(user::Column::LoginIp, Expr::value(ip.clone()))
        .col_expr(user::Column::LoginDate, Expr::value(Some(login_date)))
        .filter(user::Column::Id.eq(account.id.as_str()))
        .exec(db)
        .await
    {
        tracing::error!("Failed to update last login: {}", e);
    }

    tracing::info!("User logged in: {}", account.username);

    let mut user = account;
    user.login_ip = ip;
    user.login_date = Some(login_date);

    Ok(LoginSession { token, claims, user })
}

/// Verify a token and that its subject may still act
pub async fn validate_token(
    db: &DatabaseConnection,
    keys: &TokenKeys,
    token: &str,
) -> Result<Claims, TokenError> {
    let claims = keys.decode(token)?;

    let account = user::Entity::find_by_id(claims.sub.clone())
        .one(db)
        .await
        .map_err(|e| TokenError::LookupFailed(e.to_string()))?;

    match account {
        Some(account) if account.is_active() => Ok(claims),
        _ => Err(TokenError::UserGone),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user_role;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    const TEST_COST: u32 = 4;

    fn account(password: &str, status: &str) -> user::Model {
        user::Model {
            id: "u-1".to_string(),
            username: "alice".to_string(),
            password: hash_password(password, TEST_COST).unwrap(),
            nickname: Some("Alice".to_string()),
            email: None,
            phone: None,
            avatar: None,
            dept_id: None,
            status: status.to_string(),
            login_ip: None,
            login_date: None,
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        }
    }

    fn keys() -> TokenKeys {
        TokenKeys::new(b"test-secret", 3600)
    }

    #[test]
    fn test_issue_and_decode() {
        let keys = keys();
        let (token, claims) = keys
            .issue("u-1", "alice", vec!["admin".to_string()], vec!["*:*:*".to_string()])
            .unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);

        let decoded = keys.decode(&token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_decode_rejects_foreign_and_garbage_tokens() {
        let (token, _) = keys().issue("u-1", "alice", vec![], vec![]).unwrap();
        let other = TokenKeys::new(b"other-secret", 3600);
        assert_eq!(other.decode(&token), Err(TokenError::Malformed));
        assert_eq!(keys().decode("not-a-token"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_decode_expired() {
        let keys = keys();
        let now = now_ts();
        let claims = Claims {
            sub: "u-1".to_string(),
            username: "alice".to_string(),
            roles: vec![],
            permissions: vec![],
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = keys.sign(&claims).unwrap();
        assert_eq!(keys.decode(&token), Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();
        let err = authenticate(&db, &keys(), "ghost", "pw", None).await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account("right", "0")]])
            .into_connection();
        let err = authenticate(&db, &keys(), "alice", "wrong", None).await.unwrap_err();
        assert_eq!(err, AuthError::BadPassword);
    }

    #[tokio::test]
    async fn test_authenticate_disabled_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account("pw", "1")]])
            .into_connection();
        let err = authenticate(&db, &keys(), "alice", "pw", None).await.unwrap_err();
        assert_eq!(err, AuthError::UserDisabled);
    }

    #[tokio::test]
    async fn test_authenticate_issues_token() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account("pw", "0")]])
            .append_query_results([Vec::<user_role::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let keys = keys();

        let session = authenticate(&db, &keys, "alice", "pw", Some("10.0.0.1".to_string()))
            .await
            .unwrap();
        assert_eq!(session.claims.sub, "u-1");
        assert!(session.claims.roles.is_empty());
        assert!(session.claims.permissions.is_empty());
        assert_eq!(session.user.login_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(keys.decode(&session.token).unwrap(), session.claims);

        // One user-role lookup serves both the role keys and the permissions
        let log = db.into_transaction_log();
        let role_lookups = log
            .iter()
            .filter(|t| format!("{:?}", t).contains("sys_user_role"))
            .count();
        assert_eq!(role_lookups, 1);
    }

    #[tokio::test]
    async fn test_validate_token_user_gone() {
        let keys = keys();
        let (token, _) = keys.issue("u-1", "alice", vec![], vec![]).unwrap();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([vec![account("pw", "1")]])
            .append_query_results([vec![account("pw", "0")]])
            .into_connection();

        assert_eq!(validate_token(&db, &keys, &token).await, Err(TokenError::UserGone));
        assert_eq!(validate_token(&db, &keys, &token).await, Err(TokenError::UserGone));
        assert_eq!(validate_token(&db, &keys, &token).await.unwrap().sub, "u-1");
    }
}
