//! Bearer-token authentication and capability checks.
//!
//! [`authenticate`] runs on every `/api/v1` request: a valid access token
//! puts a [`CurrentUser`] into the request extensions, a bad one is
//! rejected with 401, and no token leaves the request anonymous. Handlers
//! then pick the extractor matching the capability they need.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Span;

use freshmilk_core::DeliveryPersonId;

use crate::db::users::UserRepository;
use crate::error::{AppError, set_sentry_user};
use crate::models::user::{Capability, CurrentUser};
use crate::services::auth::AuthError;
use crate::services::auth::jwt::{TokenService, TokenType};
use crate::state::AppState;

const LOGIN_REQUIRED: &str = "身份认证信息未提供";

/// Resolve the bearer token, if any, into a [`CurrentUser`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(header) = header {
        match resolve_user(&state, &header).await {
            Ok(user) => {
                Span::current().record("user_id", user.id.as_i32());
                set_sentry_user(&user.id, &user.username);
                request.extensions_mut().insert(user);
            }
            Err(e) => return e.into_response(),
        }
    }

    next.run(request).await
}

async fn resolve_user(state: &AppState, header: &str) -> Result<CurrentUser, AppError> {
    let token = TokenService::extract_bearer(header).ok_or(AuthError::InvalidToken)?;
    let user_id = state.tokens().verify(token, TokenType::Access)?;
    let row = UserRepository::new(state.pool())
        .get_auth_row(user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if !row.is_active {
        return Err(AuthError::Inactive.into());
    }
    Ok(row.into())
}

/// Route layer for the admin router: 401 without a user, 403 for
/// non-admins.
///
/// # Errors
///
/// Returns the rejection as an `AppError`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Unauthorized(LOGIN_REQUIRED.to_owned()))?;
    if !user.has(Capability::Admin) {
        return Err(AppError::forbidden("您没有执行该操作的权限"));
    }
    Ok(next.run(request).await)
}

fn current_user(parts: &Parts) -> Result<CurrentUser, AppError> {
    parts
        .extensions
        .get::<CurrentUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(LOGIN_REQUIRED.to_owned()))
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts).map(Self)
    }
}

/// Extractor that optionally gets the current user.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// Extractor that requires an admin. Admin routes are already behind
/// [`require_admin`]; this hands the handler the acting admin.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)?;
        if !user.has(Capability::Admin) {
            return Err(AppError::forbidden("您没有执行该操作的权限"));
        }
        Ok(Self(user))
    }
}

/// Extractor that requires a user linked to an active delivery person.
pub struct RequireCourier {
    pub user: CurrentUser,
    pub courier_id: DeliveryPersonId,
}

impl<S> FromRequestParts<S> for RequireCourier
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)?;
        let courier_id = user
            .courier_id
            .ok_or_else(|| AppError::forbidden("您不是配送员"))?;
        Ok(Self { user, courier_id })
    }
}
