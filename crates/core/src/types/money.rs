//! Money and points arithmetic.
//!
//! Amounts are `rust_decimal::Decimal` in yuan with two decimal places,
//! stored as `NUMERIC(10,2)`. Rounding is half-to-even everywhere so stored
//! values match what the database would produce when coercing a scale.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Smallest payable amount for an order after discounts.
pub const MIN_PAY_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round an amount to two decimal places.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Round an amount to whole points (half-to-even).
///
/// Values outside the `i32` range saturate.
#[must_use]
pub fn round_points(amount: Decimal) -> i32 {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    saturate(rounded)
}

/// Truncate an amount towards negative infinity into whole points.
#[must_use]
pub fn floor_points(amount: Decimal) -> i32 {
    saturate(amount.floor())
}

fn saturate(whole: Decimal) -> i32 {
    whole.to_i32().unwrap_or(if whole.is_sign_negative() {
        i32::MIN
    } else {
        i32::MAX
    })
}

/// Clamp an amount so it is never below [`MIN_PAY_AMOUNT`].
#[must_use]
pub fn at_least_min_pay(amount: Decimal) -> Decimal {
    amount.max(MIN_PAY_AMOUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_money_half_even() {
        assert_eq!(round_money(Decimal::new(12_345, 3)), Decimal::new(1234, 2));
        assert_eq!(round_money(Decimal::new(12_355, 3)), Decimal::new(1236, 2));
        assert_eq!(round_money(Decimal::new(1999, 2)), Decimal::new(1999, 2));
    }

    #[test]
    fn test_round_points_half_even() {
        assert_eq!(round_points(Decimal::new(25, 1)), 2);
        assert_eq!(round_points(Decimal::new(35, 1)), 4);
        assert_eq!(round_points(Decimal::new(1710, 2)), 17);
    }

    #[test]
    fn test_floor_points() {
        assert_eq!(floor_points(Decimal::new(5999, 2)), 59);
        assert_eq!(floor_points(Decimal::ZERO), 0);
    }

    #[test]
    fn test_min_pay_amount() {
        assert_eq!(MIN_PAY_AMOUNT, Decimal::new(1, 2));
        assert_eq!(at_least_min_pay(Decimal::ZERO), Decimal::new(1, 2));
        assert_eq!(at_least_min_pay(Decimal::TEN), Decimal::TEN);
    }
}
