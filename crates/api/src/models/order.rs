//! Cart, orders, payments, and refunds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use freshmilk_core::{
    AddressId, CartItemId, ExpressStatus, OrderId, OrderItemId, OrderStatus, PaymentId,
    PaymentMethod, PaymentStatus, ProductId, RefundId, RefundReason, RefundStatus, RefundType,
    SubscriptionId, UserCouponId, UserId,
};

// =============================================================================
// Cart
// =============================================================================

/// A cart line joined with its product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Decimal,
    pub product_cover_image: String,
    pub product_stock: i32,
    pub product_is_active: bool,
    pub quantity: i32,
    pub selected: bool,
    /// `product_price * quantity`.
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Totals over the selected cart lines.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartSummary {
    pub total_count: i64,
    pub total_amount: Decimal,
}

// =============================================================================
// Orders
// =============================================================================

/// A product order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub pay_amount: Decimal,
    pub discount_amount: Decimal,
    pub user_coupon_id: Option<UserCouponId>,
    pub status: OrderStatus,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub delivery_type: String,
    pub delivery_fee: Decimal,
    pub express_company: String,
    pub express_no: String,
    pub express_status: Option<ExpressStatus>,
    pub is_subscription: bool,
    pub subscription_id: Option<SubscriptionId>,
    pub remark: String,
    pub points_awarded: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A line of an order with a product snapshot.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the product has been deleted.
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub product_image: String,
    pub price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// One requested line at checkout.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Checkout request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub items: Vec<OrderLineInput>,
    pub address_id: Option<AddressId>,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_address: Option<String>,
    #[serde(default)]
    pub remark: String,
    pub user_coupon_id: Option<UserCouponId>,
}

/// Order header fields computed by checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub pay_amount: Decimal,
    pub discount_amount: Decimal,
    pub user_coupon_id: Option<UserCouponId>,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub remark: String,
}

/// Order line computed by checkout.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: String,
    pub price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

/// Filters for order lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub order_no: Option<String>,
    pub user_id: Option<UserId>,
}

// =============================================================================
// Payments
// =============================================================================

/// A payment against an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub payment_no: String,
    pub order_id: OrderId,
    pub order_no: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Filters for the admin payment list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
}

// =============================================================================
// Refunds
// =============================================================================

/// A refund request.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RefundRequest {
    pub id: RefundId,
    pub refund_no: String,
    pub order_id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    pub description: String,
    pub amount: Decimal,
    pub images: Json<Vec<String>>,
    pub status: RefundStatus,
    pub order_status_before: OrderStatus,
    pub admin_id: Option<UserId>,
    pub admin_remark: String,
    pub reject_reason: String,
    pub return_express_company: String,
    pub return_express_no: String,
    pub return_address: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A customer's refund application.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefund {
    pub order_id: OrderId,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    #[serde(default)]
    pub description: String,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Filters for the admin refund list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundFilter {
    pub status: Option<RefundStatus>,
    pub refund_type: Option<RefundType>,
    pub order_no: Option<String>,
}
