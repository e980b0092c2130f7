//! Core types for Fresh Milk.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod contact;
pub mod coupon;
pub mod id;
pub mod kind;
pub mod member;
pub mod money;
pub mod number;
pub mod status;
pub mod subscription;

pub use contact::{Email, EmailError, Phone, PhoneError};
pub use coupon::{CouponTerms, CouponWindow, ReceiveError};
pub use id::*;
pub use kind::*;
pub use member::{MAX_PLAN_DURATION_DAYS, MemberLevel, Membership};
pub use money::{MIN_PAY_AMOUNT, at_least_min_pay, floor_points, round_money, round_points};
pub use number::{DocumentPrefix, coupon_code};
pub use status::*;
pub use subscription::{
    DeliveryProgress, SubscriptionFrequency, SubscriptionPricing, advance_delivery, periods_in_range,
};
