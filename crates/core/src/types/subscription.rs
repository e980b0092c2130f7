//! Subscription frequency, pricing, and delivery accrual.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use super::money::{round_money, round_points};
use crate::define_status;

/// Minimum number of periods in a subscription.
pub const MIN_PERIODS: i32 = 1;
/// Maximum number of periods in a subscription (one year of weekly drops).
pub const MAX_PERIODS: i32 = 52;

define_status!(
    /// How often a subscription delivers.
    SubscriptionFrequency, "shop.subscription_frequency" {
        Daily => "daily",
        Weekly => "weekly",
        Biweekly => "biweekly",
        Monthly => "monthly",
    }
);

impl SubscriptionFrequency {
    /// Days between deliveries.
    #[must_use]
    pub const fn interval_days(&self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Biweekly => 14,
            Self::Monthly => 30,
        }
    }

    /// Date of the delivery after `date`.
    #[must_use]
    pub fn next_after(&self, date: NaiveDate) -> NaiveDate {
        date + Duration::days(self.interval_days())
    }
}

/// Subscription pricing derived from the unit price at sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPricing {
    /// Price charged per delivery.
    pub period_price: Decimal,
    /// Price for the whole subscription.
    pub total_price: Decimal,
}

impl SubscriptionPricing {
    /// Subscribers pay 90% of the list price.
    pub const RATE: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

    /// Compute pricing for `quantity` units over `periods` deliveries.
    #[must_use]
    pub fn compute(unit_price: Decimal, quantity: i32, periods: i32) -> Self {
        let period_price = round_money(unit_price * Self::RATE * Decimal::from(quantity));
        let total_price = round_money(period_price * Decimal::from(periods));
        Self {
            period_price,
            total_price,
        }
    }

    /// Points awarded for one confirmed delivery: the period price rounded
    /// to whole points, never less than one.
    #[must_use]
    pub fn delivery_points(period_price: Decimal) -> i32 {
        round_points(period_price).max(1)
    }
}

/// Outcome of confirming one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryProgress {
    /// Deliveries made including this one.
    pub delivered_count: i32,
    /// Next scheduled date, `None` once all periods are delivered.
    pub next_delivery_date: Option<NaiveDate>,
    /// Whether this delivery completed the subscription.
    pub completed: bool,
}

/// Advance a subscription by one delivery.
///
/// Returns `None` when every period has already been delivered.
#[must_use]
pub fn advance_delivery(
    frequency: SubscriptionFrequency,
    delivered_count: i32,
    total_periods: i32,
    current_date: NaiveDate,
) -> Option<DeliveryProgress> {
    if delivered_count >= total_periods {
        return None;
    }

    let delivered_count = delivered_count + 1;
    let completed = delivered_count >= total_periods;
    let next_delivery_date = (!completed).then(|| frequency.next_after(current_date));

    Some(DeliveryProgress {
        delivered_count,
        next_delivery_date,
        completed,
    })
}

/// Whether a requested period count is allowed.
#[must_use]
pub const fn periods_in_range(periods: i32) -> bool {
    periods >= MIN_PERIODS && periods <= MAX_PERIODS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    #[test]
    fn test_interval_days() {
        assert_eq!(SubscriptionFrequency::Daily.interval_days(), 1);
        assert_eq!(SubscriptionFrequency::Weekly.interval_days(), 7);
        assert_eq!(SubscriptionFrequency::Biweekly.interval_days(), 14);
        assert_eq!(SubscriptionFrequency::Monthly.interval_days(), 30);
    }

    #[test]
    fn test_pricing_applies_subscriber_rate() {
        let pricing = SubscriptionPricing::compute(Decimal::new(1000, 2), 2, 4);
        assert_eq!(pricing.period_price, Decimal::new(1800, 2));
        assert_eq!(pricing.total_price, Decimal::new(7200, 2));
    }

    #[test]
    fn test_delivery_points_floor_of_one() {
        assert_eq!(SubscriptionPricing::delivery_points(Decimal::new(1800, 2)), 18);
        assert_eq!(SubscriptionPricing::delivery_points(Decimal::new(45, 2)), 1);
        assert_eq!(SubscriptionPricing::delivery_points(Decimal::ZERO), 1);
    }

    #[test]
    fn test_advance_delivery_schedules_next() {
        let progress =
            advance_delivery(SubscriptionFrequency::Weekly, 0, 4, date(2025, 3, 1)).unwrap_or_else(|| {
                panic!("delivery should be allowed");
            });
        assert_eq!(progress.delivered_count, 1);
        assert_eq!(progress.next_delivery_date, Some(date(2025, 3, 8)));
        assert!(!progress.completed);
    }

    #[test]
    fn test_advance_delivery_completes_on_last_period() {
        let progress =
            advance_delivery(SubscriptionFrequency::Daily, 2, 3, date(2025, 3, 1)).unwrap_or_else(|| {
                panic!("delivery should be allowed");
            });
        assert_eq!(progress.delivered_count, 3);
        assert_eq!(progress.next_delivery_date, None);
        assert!(progress.completed);
    }

    #[test]
    fn test_advance_delivery_rejects_overrun() {
        assert!(advance_delivery(SubscriptionFrequency::Daily, 3, 3, date(2025, 3, 1)).is_none());
    }

    #[test]
    fn test_periods_in_range() {
        assert!(!periods_in_range(0));
        assert!(periods_in_range(1));
        assert!(periods_in_range(52));
        assert!(!periods_in_range(53));
    }
}
