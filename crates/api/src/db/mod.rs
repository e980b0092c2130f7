//! Database operations for the shop `PostgreSQL` schema.
//!
//! # Schema: `shop`
//!
//! ## Table groups
//!
//! - accounts: `user`, `user_address`, `user_log`, `points_record`,
//!   `membership_plan`, `membership_order`
//! - catalog: `category`, `product`, `favorite`
//! - checkout: `cart_item`, `order`, `order_item`, `payment`, `refund_request`
//! - coupons: `coupon`, `user_coupon`, `coupon_activity`, `coupon_activity_coupon`
//! - fulfilment: `subscription`, `delivery_person`, `delivery_record`,
//!   `delivery_route`, `delivery_route_record`, `express_company`,
//!   `express_order`, `express_trace`
//! - community: `comment`, `comment_like`, `topic`, `post`, `post_like`
//! - messaging: `advertisement`, `message`, `user_message`, `feedback`
//!
//! Dependent rows are removed or detached explicitly by the repository that
//! deletes their parent; no foreign key cascades.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p freshmilk-cli -- migrate
//! ```

pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod comments;
pub mod coupons;
pub mod delivery;
pub mod express;
pub mod feedback;
pub mod membership;
pub mod notifications;
pub mod orders;
pub mod points;
pub mod posts;
pub mod refunds;
pub mod statistics;
pub mod subscriptions;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use cart::CartRepository;
pub use catalog::CatalogRepository;
pub use comments::CommentRepository;
pub use coupons::CouponRepository;
pub use delivery::DeliveryRepository;
pub use express::ExpressRepository;
pub use feedback::FeedbackRepository;
pub use membership::MembershipRepository;
pub use notifications::NotificationRepository;
pub use orders::OrderRepository;
pub use posts::PostRepository;
pub use refunds::RefundRepository;
pub use statistics::StatisticsRepository;
pub use subscriptions::SubscriptionRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique username).
    #[error("{0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict` with the given message.
    pub(crate) fn unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Limit and offset for a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Default number of rows per page.
    pub const DEFAULT_SIZE: i64 = 20;
    /// Largest page a client may request.
    pub const MAX_SIZE: i64 = 100;

    /// Build a page from 1-based `page` and `page_size`, clamping both.
    #[must_use]
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let size = page_size
            .unwrap_or(Self::DEFAULT_SIZE)
            .clamp(1, Self::MAX_SIZE);
        let page = page.unwrap_or(1).max(1);
        Self {
            limit: size,
            offset: (page - 1).saturating_mul(size),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total count.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Convert every result.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Escape `%`, `_` and `\` and wrap in `%` for an `ILIKE` contains-match.
#[must_use]
pub fn contains_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::default();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(Some(3), Some(10)), Page { limit: 10, offset: 20 });
        assert_eq!(Page::new(Some(0), Some(500)), Page { limit: 100, offset: 0 });
        assert_eq!(Page::new(Some(-4), Some(0)), Page { limit: 1, offset: 0 });
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern(" milk "), "%milk%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }
}
