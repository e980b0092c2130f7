//! Business services.
//!
//! Repositories own single-table reads and writes; services own the
//! multi-step workflows that must run in one transaction, plus the outbound
//! clients (courier APIs, WeChat).

pub mod auth;
pub mod coupons;
pub mod express;
pub mod membership;
pub mod orders;
pub mod refunds;
pub mod reset_codes;
pub mod shipping;
pub mod subscriptions;
pub mod wechat;

use crate::db::RepositoryError;
use crate::error::AppError;

/// Map `RepositoryError::NotFound` to a 404 with `message`, passing other
/// errors through.
pub(crate) fn not_found(message: &'static str) -> impl Fn(RepositoryError) -> AppError {
    move |e| match e {
        RepositoryError::NotFound => AppError::not_found(message),
        other => other.into(),
    }
}
