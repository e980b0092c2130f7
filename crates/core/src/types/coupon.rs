//! Coupon eligibility and discount maths.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::money::round_money;
use super::{CouponStatus, CouponType};

/// The pricing terms of a coupon template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponTerms {
    /// How the coupon reduces the price.
    pub coupon_type: CouponType,
    /// For `discount` coupons: the fraction paid, in tenths (`9.5` = 95%).
    pub discount_percent: Option<Decimal>,
    /// For `amount` coupons: the amount taken off.
    pub discount_amount: Option<Decimal>,
    /// Minimum order amount required.
    pub min_amount: Decimal,
    /// Cap on the discount for `discount` coupons (`0` or `None` = no cap).
    pub max_discount: Option<Decimal>,
}

impl CouponTerms {
    /// Whether `amount` reaches the coupon's threshold.
    #[must_use]
    pub fn meets_minimum(&self, amount: Decimal) -> bool {
        self.min_amount <= amount
    }

    /// Discount granted on an order of `amount` with the given delivery fee.
    ///
    /// The result is rounded to cents and never exceeds `amount`. Returns
    /// zero when the threshold is not met.
    #[must_use]
    pub fn discount_for(&self, amount: Decimal, delivery_fee: Decimal) -> Decimal {
        if !self.meets_minimum(amount) {
            return Decimal::ZERO;
        }

        let raw = match self.coupon_type {
            CouponType::Discount => {
                let tenths = self.discount_percent.unwrap_or(Decimal::TEN);
                let off = amount * (Decimal::ONE - tenths / Decimal::TEN);
                match self.max_discount {
                    Some(cap) if cap > Decimal::ZERO => off.min(cap),
                    _ => off,
                }
            }
            CouponType::Amount => self.discount_amount.unwrap_or_default(),
            CouponType::Shipping => delivery_fee,
        };

        round_money(raw.max(Decimal::ZERO).min(amount))
    }
}

/// Quantity and validity window of a coupon template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponWindow {
    /// Template status.
    pub status: CouponStatus,
    /// Start of validity.
    pub start_time: DateTime<Utc>,
    /// End of validity.
    pub end_time: DateTime<Utc>,
    /// Total coupons that can be handed out (`0` = unlimited).
    pub total_count: i32,
    /// Coupons handed out so far.
    pub received_count: i32,
}

/// Why a coupon cannot be received right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// Template disabled or expired.
    #[error("优惠券不可领取")]
    NotActive,
    /// Outside the start/end window.
    #[error("不在领取时间内")]
    OutsideWindow,
    /// Every coupon has been handed out.
    #[error("优惠券已领完")]
    SoldOut,
    /// The user already holds the maximum.
    #[error("每人限领{0}张")]
    LimitReached(i32),
}

impl CouponWindow {
    /// Whether `now` lies within the validity window (inclusive).
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// Whether stock remains.
    #[must_use]
    pub const fn has_stock(&self) -> bool {
        self.total_count == 0 || self.received_count < self.total_count
    }

    /// Check whether a user holding `held` coupons may receive another.
    ///
    /// Checks run in a fixed order: status, time window, stock, per-user limit.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn check_receive(
        &self,
        now: DateTime<Utc>,
        held: i64,
        per_user_limit: i32,
    ) -> Result<(), ReceiveError> {
        if self.status != CouponStatus::Active {
            return Err(ReceiveError::NotActive);
        }
        if !self.is_open(now) {
            return Err(ReceiveError::OutsideWindow);
        }
        if !self.has_stock() {
            return Err(ReceiveError::SoldOut);
        }
        if held >= i64::from(per_user_limit) {
            return Err(ReceiveError::LimitReached(per_user_limit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn terms(coupon_type: CouponType) -> CouponTerms {
        CouponTerms {
            coupon_type,
            discount_percent: None,
            discount_amount: None,
            min_amount: Decimal::ZERO,
            max_discount: None,
        }
    }

    fn window(now: DateTime<Utc>) -> CouponWindow {
        CouponWindow {
            status: CouponStatus::Active,
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            total_count: 0,
            received_count: 0,
        }
    }

    #[test]
    fn test_percent_discount() {
        let coupon = CouponTerms {
            discount_percent: Some(Decimal::new(95, 1)),
            ..terms(CouponType::Discount)
        };
        assert_eq!(
            coupon.discount_for(Decimal::new(10000, 2), Decimal::ZERO),
            Decimal::new(500, 2)
        );
    }

    #[test]
    fn test_percent_discount_is_capped() {
        let coupon = CouponTerms {
            discount_percent: Some(Decimal::new(8, 0)),
            max_discount: Some(Decimal::new(10, 0)),
            ..terms(CouponType::Discount)
        };
        assert_eq!(
            coupon.discount_for(Decimal::new(200, 0), Decimal::ZERO),
            Decimal::new(10, 0)
        );
    }

    #[test]
    fn test_amount_discount_requires_minimum() {
        let coupon = CouponTerms {
            discount_amount: Some(Decimal::new(10, 0)),
            min_amount: Decimal::new(50, 0),
            ..terms(CouponType::Amount)
        };
        assert_eq!(
            coupon.discount_for(Decimal::new(49, 0), Decimal::ZERO),
            Decimal::ZERO
        );
        assert_eq!(
            coupon.discount_for(Decimal::new(50, 0), Decimal::ZERO),
            Decimal::new(10, 0)
        );
    }

    #[test]
    fn test_discount_never_exceeds_amount() {
        let coupon = CouponTerms {
            discount_amount: Some(Decimal::new(20, 0)),
            ..terms(CouponType::Amount)
        };
        assert_eq!(
            coupon.discount_for(Decimal::new(5, 0), Decimal::ZERO),
            Decimal::new(5, 0)
        );
    }

    #[test]
    fn test_shipping_coupon_waives_fee() {
        let coupon = terms(CouponType::Shipping);
        assert_eq!(
            coupon.discount_for(Decimal::new(30, 0), Decimal::new(6, 0)),
            Decimal::new(6, 0)
        );
    }

    #[test]
    fn test_receive_checks_in_order() {
        let now = Utc::now();

        let inactive = CouponWindow {
            status: CouponStatus::Inactive,
            total_count: 1,
            received_count: 1,
            ..window(now)
        };
        assert_eq!(inactive.check_receive(now, 5, 1), Err(ReceiveError::NotActive));

        let closed = CouponWindow {
            end_time: now - Duration::hours(1),
            total_count: 1,
            received_count: 1,
            ..window(now)
        };
        assert_eq!(closed.check_receive(now, 5, 1), Err(ReceiveError::OutsideWindow));

        let sold_out = CouponWindow {
            total_count: 1,
            received_count: 1,
            ..window(now)
        };
        assert_eq!(sold_out.check_receive(now, 5, 1), Err(ReceiveError::SoldOut));

        assert_eq!(
            window(now).check_receive(now, 2, 2),
            Err(ReceiveError::LimitReached(2))
        );
        assert_eq!(window(now).check_receive(now, 1, 2), Ok(()));
    }

    #[test]
    fn test_limit_message() {
        assert_eq!(ReceiveError::LimitReached(3).to_string(), "每人限领3张");
    }
}
