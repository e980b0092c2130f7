//! Admin account management.
//!
//! # Usage
//!
//! ```bash
//! fm-cli admin create -u admin -p 'a-long-password' --phone 13800138000
//! ```

use freshmilk_api::services::auth::{AuthError, hash_password, validate_password};
use freshmilk_core::Phone;
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Username is empty.
    #[error("Username must not be empty")]
    EmptyUsername,

    /// Password rejected or could not be hashed.
    #[error("Password error: {0}")]
    Password(#[from] AuthError),

    /// Phone number is malformed.
    #[error("Invalid phone: {0}")]
    InvalidPhone(String),

    /// Username or phone already taken.
    #[error("User already exists: {0}")]
    UserExists(String),
}

/// Create an active admin account and return its ID.
///
/// # Errors
///
/// Returns an error if validation fails, the username or phone is taken,
/// or the database is unreachable.
pub async fn create_user(
    username: &str,
    password: &str,
    phone: Option<&str>,
) -> Result<i32, AdminError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AdminError::EmptyUsername);
    }
    validate_password(password)?;
    let phone = phone
        .map(|p| Phone::parse(p).map_err(|e| AdminError::InvalidPhone(e.to_string())))
        .transpose()?
        .map(Phone::into_inner);
    let password_hash = hash_password(password)?;

    let pool = connect().await?;

    tracing::info!("Creating admin user: {}", username);

    let existing: Option<i32> = sqlx::query_scalar(
        "SELECT id FROM shop.user WHERE username = $1 OR ($2::text IS NOT NULL AND phone = $2)",
    )
    .bind(username)
    .bind(&phone)
    .fetch_optional(&pool)
    .await?;

    if existing.is_some() {
        return Err(AdminError::UserExists(username.to_owned()));
    }

    let user_id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO shop.user (username, password_hash, phone, nickname, is_admin)
        VALUES ($1, $2, $3, $1, TRUE)
        RETURNING id
        ",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(&phone)
    .fetch_one(&pool)
    .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Username: {}",
        user_id,
        username
    );

    Ok(user_id)
}
