//! Back-office handlers, nested under `/api/v1/admin`.
//!
//! # Route Structure
//!
//! ```text
//! /users, /logs, /membership-plans       - Accounts and membership
//! /categories, /products                 - Catalog
//! /orders, /payments, /refunds           - Checkout
//! /coupons, /coupon-activities           - Coupons
//! /subscriptions                         - Subscriptions
//! /delivery-persons, /delivery-records, /delivery-routes
//! /comments, /topics, /posts             - Community moderation
//! /advertisements, /messages             - Notifications
//! /feedback                              - Feedback handling
//! /statistics/*                          - Dashboard and reports
//! ```
//!
//! The caller wraps the whole router in `require_admin`; handlers can use
//! [`RequireAdmin`](crate::middleware::RequireAdmin) when they need the
//! acting admin.

mod catalog;
mod community;
mod coupons;
mod delivery;
mod feedback;
mod notifications;
mod orders;
mod statistics;
mod subscriptions;
mod users;

use axum::Router;

use crate::state::AppState;

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(catalog::router())
        .merge(orders::router())
        .merge(coupons::router())
        .merge(subscriptions::router())
        .merge(delivery::router())
        .merge(community::router())
        .merge(notifications::router())
        .merge(feedback::router())
        .merge(statistics::router())
}
