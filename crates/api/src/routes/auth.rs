//! Authentication route handlers.
//!
//! Everything under `/api/v1/auth`. The router is wrapped in the auth rate
//! limiter by the caller.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{Phone, UserAction};

use super::{MessageResponse, log_action};
use crate::db::users::UserRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{ClientInfo, RequireUser};
use crate::models::user::UserView;
use crate::services::auth::{AuthService, Registration, Session, WechatProfile};
use crate::state::AppState;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/wx-login", post(wx_login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/send-reset-code", post(send_reset_code))
        .route("/verify-reset-code", post(verify_reset_code))
        .route("/reset-password", post(reset_password))
}

/// Tokens plus the signed-in user.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserView,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            access: session.tokens.access,
            refresh: session.tokens.refresh,
            user: session.user.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    pub phone: Option<String>,
    pub nickname: Option<String>,
}

/// Register a password account.
#[tracing::instrument(skip(state, client, body), fields(username = %body.username))]
async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let session = AuthService::new(state.pool(), state.tokens())
        .register(&Registration {
            username: &body.username,
            password: &body.password,
            password_confirm: &body.password_confirm,
            phone: body.phone.as_deref(),
            nickname: body.nickname.as_deref(),
        })
        .await?;

    log_action(&state, session.user.id, UserAction::Register, &client).await;
    tracing::info!(user_id = %session.user.id, "user registered");
    Ok((StatusCode::CREATED, Json(session.into())))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or phone number.
    pub username: String,
    pub password: String,
}

/// Log in with a username (or phone) and password.
#[tracing::instrument(skip(state, client, body), fields(login = %body.username))]
async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let session = AuthService::new(state.pool(), state.tokens())
        .login(&body.username, &body.password)
        .await?;

    log_action(&state, session.user.id, UserAction::Login, &client).await;
    add_breadcrumb("auth", "login", None);
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct WechatLoginRequest {
    pub code: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Log in through a WeChat mini-program code.
#[tracing::instrument(skip_all)]
async fn wx_login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<WechatLoginRequest>,
) -> Result<Json<SessionResponse>> {
    let wechat = state.wechat().code_to_session(&body.code).await?;
    let session = AuthService::new(state.pool(), state.tokens())
        .wechat_login(
            &wechat,
            &WechatProfile {
                nickname: body.nickname.as_deref(),
                avatar: body.avatar.as_deref(),
            },
        )
        .await?;

    log_action(&state, session.user.id, UserAction::Login, &client).await;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Exchange a refresh token for a new access token.
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    let access = AuthService::new(state.pool(), state.tokens())
        .refresh(&body.refresh)
        .await?;
    Ok(Json(RefreshResponse { access }))
}

/// Record a logout. Tokens are stateless; the client discards them.
async fn logout(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    client: ClientInfo,
) -> Json<MessageResponse> {
    log_action(&state, user.id, UserAction::Logout, &client).await;
    Json(MessageResponse::new("退出登录成功"))
}

#[derive(Debug, Deserialize)]
pub struct SendResetCodeRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct SendResetCodeResponse {
    pub message: String,
    /// Only filled in demo mode, where no SMS is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Issue a password reset code for a registered phone.
#[tracing::instrument(skip_all)]
async fn send_reset_code(
    State(state): State<AppState>,
    Json(body): Json<SendResetCodeRequest>,
) -> Result<Json<SendResetCodeResponse>> {
    let phone = Phone::parse(&body.phone).map_err(|e| AppError::bad_request(e.to_string()))?;
    UserRepository::new(state.pool())
        .get_by_phone(phone.as_str())
        .await?
        .ok_or_else(|| AppError::not_found("该手机号未注册"))?;

    let code = state.reset_codes().issue(phone.as_str()).await;
    tracing::info!(phone = %phone.masked(), "reset code issued");

    Ok(Json(SendResetCodeResponse {
        message: "验证码已发送".to_owned(),
        code: state.config().demo_mode.then_some(code),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetCodeRequest {
    pub phone: String,
    pub code: String,
}

/// Check a reset code without consuming it.
async fn verify_reset_code(
    State(state): State<AppState>,
    Json(body): Json<VerifyResetCodeRequest>,
) -> Result<Json<MessageResponse>> {
    let phone = Phone::parse(&body.phone).map_err(|e| AppError::bad_request(e.to_string()))?;
    if !state.reset_codes().verify(phone.as_str(), &body.code).await {
        return Err(AppError::bad_request("验证码错误或已过期"));
    }
    Ok(Json(MessageResponse::new("验证成功")))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub phone: String,
    pub code: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Set a new password with a reset code.
#[tracing::instrument(skip_all)]
async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    AuthService::new(state.pool(), state.tokens())
        .reset_password(
            state.reset_codes(),
            &body.phone,
            &body.code,
            &body.new_password,
            &body.confirm_password,
        )
        .await?;
    Ok(Json(MessageResponse::new("密码重置成功")))
}
