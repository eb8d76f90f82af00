use axum::http::HeaderMap;
use chrono::Duration;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::now;
use crate::models::{MembershipLevel, Role, User};

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn issue_session(conn: &Connection, user_id: &str, ttl_hours: i64) -> AppResult<String> {
    let token = uuid::Uuid::new_v4().to_string();
    let expires_at = now() + Duration::hours(ttl_hours.max(1));
    queries::create_session(conn, &token, user_id, &expires_at)?;
    Ok(token)
}

/// Resolves the caller when a token is present. A token that does not match
/// a live session is still an error.
pub fn optional_user(conn: &Connection, headers: &HeaderMap) -> AppResult<Option<User>> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    match queries::get_session_user(conn, token, &now())? {
        Some(user) => Ok(Some(user)),
        None => Err(AppError::Unauthorized),
    }
}

pub fn require_user(conn: &Connection, headers: &HeaderMap) -> AppResult<User> {
    optional_user(conn, headers)?.ok_or(AppError::Unauthorized)
}

pub fn require_admin(conn: &Connection, headers: &HeaderMap) -> AppResult<User> {
    let user = require_user(conn, headers)?;
    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

/// Staff or admin.
pub fn require_staff(conn: &Connection, headers: &HeaderMap) -> AppResult<User> {
    let user = require_user(conn, headers)?;
    if !user.is_staff() {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

/// Owner of the resource or an admin; anyone else is told it does not exist.
pub fn ensure_self_or_admin(user: &User, owner_id: &str) -> AppResult<()> {
    if user.is_admin() || user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::NotFound("user".to_string()))
    }
}

pub fn new_user(name: &str, email: &str, password: &str, phone: Option<String>) -> AppResult<User> {
    let password_hash = hash_password(password)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))?;
    Ok(User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_lowercase(),
        password_hash,
        phone,
        role: Role::User,
        points: 0,
        total_spending: 0,
        membership_level: MembershipLevel::Bronze,
        created_at: now(),
    })
}

/// Creates the configured admin account, or promotes it if it already exists.
pub fn bootstrap_admin(conn: &Connection, config: &AppConfig) -> anyhow::Result<()> {
    if config.admin_email.is_empty() || config.admin_password.is_empty() {
        return Ok(());
    }

    match queries::get_user_by_email(conn, &config.admin_email)? {
        Some(existing) if existing.is_admin() => {}
        Some(existing) => {
            queries::set_user_role(conn, &existing.id, Role::Admin)?;
            tracing::info!(email = %existing.email, "promoted existing user to admin");
        }
        None => {
            let mut admin = new_user("Administrator", &config.admin_email, &config.admin_password, None)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            admin.role = Role::Admin;
            queries::create_user(conn, &admin)?;
            tracing::info!(email = %admin.email, "created admin account");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer tok-123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok-123"));
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = db::init_db(":memory:").unwrap();
        let user = new_user("Alice", "Alice@Example.com", "secret", None).unwrap();
        assert_eq!(user.email, "alice@example.com");
        queries::create_user(&conn, &user).unwrap();

        let token = issue_session(&conn, &user.id, 1).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());

        assert_eq!(require_user(&conn, &headers).unwrap().id, user.id);
        assert!(matches!(require_admin(&conn, &headers), Err(AppError::Forbidden)));

        queries::delete_session(&conn, &token).unwrap();
        assert!(matches!(require_user(&conn, &headers), Err(AppError::Unauthorized)));
        assert!(matches!(optional_user(&conn, &headers), Err(AppError::Unauthorized)));
        assert!(optional_user(&conn, &HeaderMap::new()).unwrap().is_none());
    }

    #[test]
    fn test_bootstrap_admin_is_idempotent() {
        let conn = db::init_db(":memory:").unwrap();
        let mut config = crate::config::AppConfig::from_env();
        config.admin_email = "root@example.com".to_string();
        config.admin_password = "rootpw".to_string();

        bootstrap_admin(&conn, &config).unwrap();
        bootstrap_admin(&conn, &config).unwrap();

        let users = queries::list_users(&conn).unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin());
    }
}
