//! Authentication service.
//!
//! Password, WeChat, and token-refresh login, plus password changes and
//! phone-verified resets. Every successful login yields an access/refresh pair.

pub mod error;
pub mod jwt;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{Phone, UserId};

use self::jwt::{TokenPair, TokenService, TokenType};
use super::reset_codes::ResetCodeStore;
use super::wechat::{WechatSession, username_for_openid};
use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::user::{NewUser, User};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration details.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub username: &'r str,
    pub password: &'r str,
    pub password_confirm: &'r str,
    pub phone: Option<&'r str>,
    pub nickname: Option<&'r str>,
}

/// Optional profile details sent with a WeChat login.
#[derive(Debug, Clone, Default)]
pub struct WechatProfile<'r> {
    pub nickname: Option<&'r str>,
    pub avatar: Option<&'r str>,
}

/// A signed-in user and their fresh tokens.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: &'a TokenService,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, tokens: &'a TokenService) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens,
        }
    }

    /// Register a password account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` or `AuthError::WeakPassword` for bad
    /// passwords, `AuthError::InvalidPhone` for a malformed phone, and
    /// `AuthError::UserAlreadyExists` when the username or phone is taken.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration<'_>) -> Result<Session, AuthError> {
        let username = registration.username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidUsername("用户名不能为空".to_owned()));
        }
        if registration.password != registration.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(registration.password)?;

        let phone = registration
            .phone
            .filter(|p| !p.trim().is_empty())
            .map(Phone::parse)
            .transpose()?;

        let new = NewUser {
            username: username.to_owned(),
            password_hash: Some(hash_password(registration.password)?),
            phone: phone.map(Phone::into_inner),
            nickname: registration.nickname.unwrap_or(username).to_owned(),
            ..NewUser::default()
        };

        let user = self.users.create(&new).await.map_err(|e| match e {
            RepositoryError::Conflict(msg) => AuthError::UserAlreadyExists(msg),
            other => AuthError::Repository(other),
        })?;

        let tokens = self.tokens.issue_pair(user.id)?;
        Ok(Session { user, tokens })
    }

    /// Log in with a username (or phone) and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` on a wrong login or password and
    /// `AuthError::Inactive` for a disabled account.
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<Session, AuthError> {
        let creds = self
            .users
            .get_credentials(login.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = creds
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, hash)?;

        if !creds.is_active {
            return Err(AuthError::Inactive);
        }

        self.users.touch_last_login(creds.id).await?;
        let user = self.users.require(creds.id).await?;
        let tokens = self.tokens.issue_pair(user.id)?;
        Ok(Session { user, tokens })
    }

    /// Find or create the user behind a WeChat session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Inactive` for a disabled account.
    #[instrument(skip(self, session, profile))]
    pub async fn wechat_login(
        &self,
        session: &WechatSession,
        profile: &WechatProfile<'_>,
    ) -> Result<Session, AuthError> {
        let user = if let Some(user) = self.users.get_by_openid(&session.openid).await? {
            if !user.is_active {
                return Err(AuthError::Inactive);
            }
            self.users
                .set_wechat_session(user.id, &session.session_key, session.unionid.as_deref())
                .await?;
            user
        } else {
            let username = username_for_openid(&session.openid);
            let new = NewUser {
                nickname: profile.nickname.unwrap_or(&username).to_owned(),
                avatar: profile.avatar.unwrap_or_default().to_owned(),
                username,
                openid: Some(session.openid.clone()),
                unionid: session.unionid.clone(),
                session_key: Some(session.session_key.clone()),
                ..NewUser::default()
            };
            let user = self.users.create(&new).await?;
            tracing::info!(user_id = %user.id, "created user from wechat login");
            user
        };

        let tokens = self.tokens.issue_pair(user.id)?;
        Ok(Session { user, tokens })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken`, `TokenExpired`, or `WrongTokenType` for a bad
    /// token and `Inactive` when the account is disabled or gone.
    pub async fn refresh(&self, refresh: &str) -> Result<String, AuthError> {
        let user_id = self.tokens.verify(refresh, TokenType::Refresh)?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Inactive)?;
        self.tokens.issue(user.id, TokenType::Access)
    }

    /// Change a password after checking the old one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` when the old password is wrong.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let hash = self
            .users
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(old_password, &hash).map_err(|_| AuthError::WrongOldPassword)?;
        validate_password(new_password)?;
        self.users
            .set_password_hash(user_id, &hash_password(new_password)?)
            .await?;
        Ok(())
    }

    /// Set a new password for the account behind `phone`, consuming its reset code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch`, `AuthError::WeakPassword`, or
    /// `AuthError::InvalidResetCode`.
    #[instrument(skip(self, codes, code, new_password, confirm_password))]
    pub async fn reset_password(
        &self,
        codes: &ResetCodeStore,
        phone: &str,
        code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(new_password)?;

        let phone = Phone::parse(phone)?;
        let user = self
            .users
            .get_by_phone(phone.as_str())
            .await?
            .ok_or(AuthError::InvalidResetCode)?;

        if !codes.consume(phone.as_str(), code).await {
            return Err(AuthError::InvalidResetCode);
        }

        self.users
            .set_password_hash(user.id, &hash_password(new_password)?)
            .await?;
        Ok(())
    }
}

/// Check the password policy.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` when the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "密码长度至少为{MIN_PASSWORD_LENGTH}位"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on mismatch or an unreadable hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        // Counted in characters, not bytes.
        assert!(validate_password("牛奶牛奶牛奶牛").is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("fresh-milk-2024").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("fresh-milk-2024", &hash).is_ok());
        assert!(matches!(
            verify_password("fresh-milk-2025", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(matches!(
            verify_password("whatever", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
