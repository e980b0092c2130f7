//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database)
//! GET  /media/*                         - Uploaded files
//!
//! /api/v1
//!   /auth/*                             - Register, login, WeChat, refresh, reset (rate limited)
//!   /users/*, /addresses/*              - Profile, password, points, addresses
//!   /membership/*                       - Plans and membership orders
//!   /upload/image                       - Image upload
//!   /categories, /products/*, /favorites/*
//!   /cart/*, /orders/*, /refunds/*
//!   /coupons/*, /coupon-activities/*, /user-coupons/*
//!   /subscriptions/*
//!   /delivery/*                         - Courier self-service
//!   /express/*                          - Tracking; /express/admin/* is admin only
//!   /comments/*, /topics, /posts/*
//!   /advertisements/*, /messages/*, /user-messages/*
//!   /feedback/*
//!   /admin/*                            - Back office (admin only)
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod community;
pub mod coupons;
pub mod delivery;
pub mod express;
pub mod feedback;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod refunds;
pub mod subscriptions;
pub mod upload;
pub mod users;

use std::str::FromStr;

use axum::{Router, middleware};
use serde::{Deserialize, Serialize};

use freshmilk_core::{UserAction, UserId};

use crate::db::Page;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::{ClientInfo, auth_rate_limiter, authenticate, require_admin};
use crate::state::AppState;

/// Build the `/api/v1` router.
pub fn api_router(state: &AppState) -> Router<AppState> {
    let admin = admin::router().route_layer(middleware::from_fn(require_admin));

    Router::new()
        .nest("/auth", auth::router().layer(auth_rate_limiter()))
        .merge(users::router())
        .merge(upload::router())
        .merge(catalog::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(refunds::router())
        .merge(coupons::router())
        .merge(subscriptions::router())
        .merge(delivery::router())
        .merge(express::router())
        .merge(express::admin_router())
        .merge(community::router())
        .merge(notifications::router())
        .merge(feedback::router())
        .nest("/admin", admin)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

/// `?page=&page_size=` on list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    /// Clamped limit and offset.
    #[must_use]
    pub fn page(self) -> Page {
        Page::new(self.page, self.page_size)
    }
}

/// `{"message": ...}` body for actions without a resource to return.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{"status": ...}` body. The value is parsed in the handler so an unknown
/// status is a 400 with a readable message.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

impl StatusUpdate {
    /// Parse the requested status.
    ///
    /// # Errors
    ///
    /// Returns 400 for a value outside the enum.
    pub fn parse<T: FromStr>(&self) -> Result<T> {
        self.status
            .trim()
            .parse()
            .map_err(|_| AppError::bad_request(format!("无效的状态值: {}", self.status)))
    }
}

/// Record a user action. Failures are logged, never surfaced.
pub async fn log_action(state: &AppState, user_id: UserId, action: UserAction, client: &ClientInfo) {
    if let Err(e) = UserRepository::new(state.pool())
        .log_action(user_id, action, client.ip.as_deref(), &client.user_agent)
        .await
    {
        tracing::warn!(error = %e, %user_id, action = %action, "failed to record user action");
    }
}
