//! Periodic delivery subscriptions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freshmilk_core::{
    AddressId, ProductId, SubscriptionFrequency, SubscriptionId, SubscriptionStatus, UserId,
};

/// A subscription with its product snapshot.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscription_no: String,
    pub user_id: UserId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub product_image: String,
    pub product_price: Decimal,
    pub frequency: SubscriptionFrequency,
    pub quantity: i32,
    pub total_periods: i32,
    pub delivered_count: i32,
    pub period_price: Decimal,
    pub total_price: Decimal,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub start_date: NaiveDate,
    pub next_delivery_date: Option<NaiveDate>,
    pub status: SubscriptionStatus,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Deliveries still owed.
    #[must_use]
    pub const fn remaining_periods(&self) -> i32 {
        self.total_periods - self.delivered_count
    }
}

/// Subscription request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub product_id: ProductId,
    pub frequency: SubscriptionFrequency,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub total_periods: i32,
    pub start_date: NaiveDate,
    pub address_id: Option<AddressId>,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_address: Option<String>,
    #[serde(default)]
    pub remark: String,
}

const fn default_quantity() -> i32 {
    1
}

/// Row fields for a new subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub subscription_no: String,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: String,
    pub product_price: Decimal,
    pub frequency: SubscriptionFrequency,
    pub quantity: i32,
    pub total_periods: i32,
    pub period_price: Decimal,
    pub total_price: Decimal,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub start_date: NaiveDate,
    pub remark: String,
}

/// Filters for subscription lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
    pub user_id: Option<UserId>,
    pub subscription_no: Option<String>,
}

/// Result of confirming one delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryConfirmation {
    pub delivered_count: i32,
    pub total_periods: i32,
    pub points_earned: i32,
    pub status: SubscriptionStatus,
}
