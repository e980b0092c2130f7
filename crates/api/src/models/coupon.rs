//! Coupon templates, user holdings, and activities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freshmilk_core::{
    CouponActivityId, CouponId, CouponStatus, CouponTerms, CouponType, CouponWindow, OrderId,
    UserCouponId, UserCouponStatus, UserId,
};

use super::user::default_true;

/// A coupon template.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub min_amount: Decimal,
    pub max_discount: Option<Decimal>,
    pub total_count: i32,
    pub used_count: i32,
    pub received_count: i32,
    pub per_user_limit: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_products: bool,
    pub applicable_product_ids: Vec<i32>,
    pub applicable_category_ids: Vec<i32>,
    pub status: CouponStatus,
    pub description: String,
    pub points_required: i32,
    pub is_exchangeable: bool,
    pub exchange_limit: i32,
    pub exchanged_count: i32,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Pricing terms.
    #[must_use]
    pub const fn terms(&self) -> CouponTerms {
        CouponTerms {
            coupon_type: self.coupon_type,
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            min_amount: self.min_amount,
            max_discount: self.max_discount,
        }
    }

    /// Quantity and validity window.
    #[must_use]
    pub const fn window(&self) -> CouponWindow {
        CouponWindow {
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            total_count: self.total_count,
            received_count: self.received_count,
        }
    }

    /// Whether the points-exchange quota still has room.
    #[must_use]
    pub const fn has_exchange_capacity(&self) -> bool {
        self.exchange_limit == 0 || self.exchanged_count < self.exchange_limit
    }
}

/// Coupon template fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    /// Generated when omitted.
    pub code: Option<String>,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub min_amount: Decimal,
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub total_count: i32,
    #[serde(default = "default_per_user_limit")]
    pub per_user_limit: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_all_products: bool,
    #[serde(default)]
    pub applicable_product_ids: Vec<i32>,
    #[serde(default)]
    pub applicable_category_ids: Vec<i32>,
    #[serde(default = "default_status")]
    pub status: CouponStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub points_required: i32,
    #[serde(default)]
    pub is_exchangeable: bool,
    #[serde(default)]
    pub exchange_limit: i32,
}

const fn default_per_user_limit() -> i32 {
    1
}

const fn default_status() -> CouponStatus {
    CouponStatus::Active
}

/// Filters for coupon lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponFilter {
    pub status: Option<CouponStatus>,
    pub coupon_type: Option<CouponType>,
}

/// A coupon held by a user, joined with its template.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserCoupon {
    pub id: UserCouponId,
    pub user_id: UserId,
    pub coupon_id: CouponId,
    pub status: UserCouponStatus,
    pub received_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<OrderId>,
    pub coupon_name: String,
    pub coupon_type: CouponType,
    pub coupon_status: CouponStatus,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub min_amount: Decimal,
    pub max_discount: Option<Decimal>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl UserCoupon {
    /// Pricing terms of the underlying template.
    #[must_use]
    pub const fn terms(&self) -> CouponTerms {
        CouponTerms {
            coupon_type: self.coupon_type,
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            min_amount: self.min_amount,
            max_discount: self.max_discount,
        }
    }

    /// Whether the coupon can be applied to an order at `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == UserCouponStatus::Unused
            && self.coupon_status == CouponStatus::Active
            && self.start_time <= now
            && now <= self.end_time
    }
}

/// A usable coupon with the discount it would give.
#[derive(Debug, Clone, Serialize)]
pub struct UsableCoupon {
    #[serde(flatten)]
    pub coupon: UserCoupon,
    pub discount: Decimal,
}

/// A promotional activity.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CouponActivity {
    pub id: CouponActivityId,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An activity with its coupons.
#[derive(Debug, Clone, Serialize)]
pub struct CouponActivityDetail {
    #[serde(flatten)]
    pub activity: CouponActivity,
    pub coupons: Vec<Coupon>,
}

/// Activity fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponActivityInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub coupon_ids: Vec<CouponId>,
}
