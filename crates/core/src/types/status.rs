//! Status enums for entities with a lifecycle.
//!
//! Every status is stored as a `PostgreSQL` enum in the `shop` schema and
//! serialised as its snake_case wire value. Transition guards are plain
//! equality checks on the current status; the helpers here only name them.

/// Macro to define a string-valued enum backed by a `PostgreSQL` enum type.
///
/// Generates:
/// - `Serialize`/`Deserialize` using the given wire values
/// - `sqlx::Type` mapped to the given `PostgreSQL` type (with `postgres` feature)
/// - `as_str()`, `ALL`, `Display`, and `FromStr`
///
/// # Example
///
/// ```rust
/// # use freshmilk_core::define_status;
/// define_status!(
///     /// Traffic light colour.
///     Light, "shop.light" {
///         Red => "red",
///         Green => "green",
///     }
/// );
///
/// assert_eq!(Light::Red.as_str(), "red");
/// assert_eq!("green".parse::<Light>(), Ok(Light::Green));
/// ```
#[macro_export]
macro_rules! define_status {
    (
        $(#[$meta:meta])*
        $name:ident, $pg_type:tt {
            $( $(#[$vmeta:meta])* $variant:ident => $value:tt ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(type_name = $pg_type))]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $value)]
                #[cfg_attr(feature = "postgres", sqlx(rename = $value))]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire and database value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value,)+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(format!("invalid {}: {s}", stringify!($name))),
                }
            }
        }
    };
}

define_status!(
    /// Order lifecycle.
    ///
    /// ```text
    /// pending -> paid -> shipped -> delivered -> completed
    ///    |        |        |           |            |
    ///    v        +--------+---- refunding ---------+
    /// cancelled                    |
    ///                              v
    ///                          refunded
    /// ```
    OrderStatus, "shop.order_status" {
        Pending => "pending",
        Paid => "paid",
        Shipped => "shipped",
        Delivered => "delivered",
        Completed => "completed",
        Cancelled => "cancelled",
        Refunding => "refunding",
        Refunded => "refunded",
    }
);

impl OrderStatus {
    /// Statuses that count towards revenue.
    pub const REVENUE: &'static [Self] = &[Self::Paid, Self::Shipped, Self::Delivered, Self::Completed];

    /// Whether the order has been paid for and not refunded or cancelled.
    #[must_use]
    pub const fn is_revenue(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Shipped | Self::Delivered | Self::Completed
        )
    }

    /// Whether a refund request may be opened against an order in this status.
    #[must_use]
    pub const fn is_refundable(&self) -> bool {
        self.is_revenue()
    }

    /// Whether the goods have left the warehouse, so a return is possible.
    #[must_use]
    pub const fn goods_dispatched(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered | Self::Completed)
    }
}

define_status!(
    /// Payment record status.
    PaymentStatus, "shop.payment_status" {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
        Refunded => "refunded",
    }
);

define_status!(
    /// Refund request status.
    RefundStatus, "shop.refund_status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

impl RefundStatus {
    /// Whether the request still blocks a new refund on the same order.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

define_status!(
    /// Membership purchase status.
    MembershipOrderStatus, "shop.membership_order_status" {
        Pending => "pending",
        Paid => "paid",
        Cancelled => "cancelled",
    }
);

define_status!(
    /// Coupon template status.
    CouponStatus, "shop.coupon_status" {
        Active => "active",
        Inactive => "inactive",
        Expired => "expired",
    }
);

define_status!(
    /// Status of a coupon held by a user.
    UserCouponStatus, "shop.user_coupon_status" {
        Unused => "unused",
        Used => "used",
        Expired => "expired",
    }
);

define_status!(
    /// Subscription status.
    SubscriptionStatus, "shop.subscription_status" {
        Active => "active",
        Paused => "paused",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

impl SubscriptionStatus {
    /// Whether the subscription has reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

define_status!(
    /// Courier availability.
    DeliveryPersonStatus, "shop.delivery_person_status" {
        Active => "active",
        Inactive => "inactive",
        Busy => "busy",
    }
);

define_status!(
    /// Local delivery progress.
    DeliveryStatus, "shop.delivery_status" {
        Pending => "pending",
        Picked => "picked",
        Delivering => "delivering",
        Delivered => "delivered",
        Failed => "failed",
    }
);

define_status!(
    /// Express shipment status.
    ExpressStatus, "shop.express_status" {
        Created => "created",
        Collected => "collected",
        InTransit => "in_transit",
        Delivering => "delivering",
        Signed => "signed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

impl ExpressStatus {
    /// Whether the shipment can still be cancelled.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        !matches!(self, Self::Signed | Self::Cancelled)
    }
}

define_status!(
    /// Feedback handling status.
    FeedbackStatus, "shop.feedback_status" {
        Pending => "pending",
        Processing => "processing",
        Resolved => "resolved",
        Closed => "closed",
    }
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
        assert!("unknown".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ExpressStatus::InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
    }

    #[test]
    fn test_revenue_statuses() {
        assert!(OrderStatus::Paid.is_revenue());
        assert!(OrderStatus::Completed.is_revenue());
        assert!(!OrderStatus::Pending.is_revenue());
        assert!(!OrderStatus::Refunding.is_revenue());
        assert!(!OrderStatus::Refunded.is_revenue());
        assert_eq!(OrderStatus::REVENUE.len(), 4);
    }

    #[test]
    fn test_goods_dispatched() {
        assert!(!OrderStatus::Paid.goods_dispatched());
        assert!(OrderStatus::Shipped.goods_dispatched());
        assert!(OrderStatus::Completed.goods_dispatched());
    }

    #[test]
    fn test_refund_open_states() {
        assert!(RefundStatus::Pending.is_open());
        assert!(RefundStatus::Approved.is_open());
        assert!(!RefundStatus::Rejected.is_open());
        assert!(!RefundStatus::Completed.is_open());
    }

    #[test]
    fn test_express_cancellable() {
        assert!(ExpressStatus::Created.is_cancellable());
        assert!(ExpressStatus::InTransit.is_cancellable());
        assert!(!ExpressStatus::Signed.is_cancellable());
    }
}
