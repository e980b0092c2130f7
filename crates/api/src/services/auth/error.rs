//! Authentication error types.

use thiserror::Error;

use freshmilk_core::PhoneError;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong username/phone or password.
    #[error("用户名或密码错误")]
    InvalidCredentials,

    /// Token is malformed or its signature does not verify.
    #[error("无效的令牌")]
    InvalidToken,

    /// Token has expired.
    #[error("令牌已过期")]
    TokenExpired,

    /// A refresh token was presented where an access token is expected, or vice versa.
    #[error("令牌类型错误")]
    WrongTokenType,

    /// Account has been disabled.
    #[error("账号已被禁用")]
    Inactive,

    /// Password too weak or invalid.
    #[error("{0}")]
    WeakPassword(String),

    /// Old password did not match on a password change.
    #[error("原密码错误")]
    WrongOldPassword,

    /// Password and confirmation differ.
    #[error("两次输入的密码不一致")]
    PasswordMismatch,

    /// Phone number is not a valid mobile number.
    #[error("{0}")]
    InvalidPhone(#[from] PhoneError),

    /// Reset code missing, wrong, or expired.
    #[error("验证码错误或已过期")]
    InvalidResetCode,

    /// Username is empty or otherwise unusable.
    #[error("{0}")]
    InvalidUsername(String),

    /// Username or phone already registered.
    #[error("{0}")]
    UserAlreadyExists(String),

    /// WeChat rejected the login code.
    #[error("微信登录失败: {0}")]
    WechatRejected(String),

    /// WeChat could not be reached.
    #[error("wechat unavailable: {0}")]
    WechatUnavailable(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Token could not be signed.
    #[error("token encoding error: {0}")]
    TokenEncoding(String),
}
