//! Fresh Milk Core - Shared domain types and business rules.
//!
//! This crate provides the types used across all Fresh Milk components:
//! - `api` - The REST API server (customer, courier, and admin routes)
//! - `cli` - Command-line tools for migrations, seeding, and admin accounts
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Pricing, discounts, points accrual, and status
//! guards live here so they can be unit tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, statuses, contact details, money helpers,
//!   membership tiers, subscription pricing, and coupon maths

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
