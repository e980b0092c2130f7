//! Business rules shared by checkout, membership, coupons, and subscriptions.
//!
//! These walk several core rules together the way a request would, rather
//! than re-checking each helper in isolation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use freshmilk_core::{
    CouponStatus, CouponTerms, CouponType, CouponWindow, DocumentPrefix, MAX_PLAN_DURATION_DAYS,
    MemberLevel, Membership,
    OrderStatus, ReceiveError, SubscriptionFrequency, SubscriptionPricing, advance_delivery,
    at_least_min_pay, coupon_code, floor_points, round_money,
};
use rust_decimal::Decimal;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default()
}

fn yuan(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

// ============================================================================
// Checkout
// ============================================================================

#[test]
fn test_gold_member_checkout_with_amount_coupon() {
    let membership = Membership::new(MemberLevel::Gold, Some(now() + Duration::days(10)));
    let goods = yuan("120.00");
    let member_price = round_money(goods * membership.discount_rate(now()));
    assert_eq!(member_price, yuan("108.00"));

    let coupon = CouponTerms {
        coupon_type: CouponType::Amount,
        discount_percent: None,
        discount_amount: Some(yuan("20")),
        min_amount: yuan("100"),
        max_discount: None,
    };
    let off = coupon.discount_for(member_price, Decimal::ZERO);
    assert_eq!(off, yuan("20.00"));
    assert_eq!(at_least_min_pay(member_price - off), yuan("88.00"));

    // Points on completion: gold earns 1.5x, floored.
    let points = floor_points((member_price - off) * membership.points_multiplier(now()));
    assert_eq!(points, 132);
}

#[test]
fn test_expired_member_pays_full_price() {
    let membership = Membership::new(MemberLevel::Platinum, Some(now() - Duration::seconds(1)));
    assert_eq!(membership.discount_rate(now()), Decimal::ONE);
    assert_eq!(membership.points_multiplier(now()), Decimal::ONE);
}

#[test]
fn test_coupon_larger_than_order_leaves_minimum_payment() {
    let coupon = CouponTerms {
        coupon_type: CouponType::Amount,
        discount_percent: None,
        discount_amount: Some(yuan("50")),
        min_amount: Decimal::ZERO,
        max_discount: None,
    };
    let amount = yuan("30.00");
    let off = coupon.discount_for(amount, Decimal::ZERO);
    assert_eq!(off, amount);
    assert_eq!(at_least_min_pay(amount - off), yuan("0.01"));
}

#[test]
fn test_discount_coupon_is_capped() {
    let coupon = CouponTerms {
        coupon_type: CouponType::Discount,
        discount_percent: Some(yuan("8")),
        discount_amount: None,
        min_amount: Decimal::ZERO,
        max_discount: Some(yuan("15")),
    };
    // 20% of 200 is 40, capped at 15
    assert_eq!(coupon.discount_for(yuan("200"), Decimal::ZERO), yuan("15.00"));
    // 20% of 50 is 10, under the cap
    assert_eq!(coupon.discount_for(yuan("50"), Decimal::ZERO), yuan("10.00"));
}

#[test]
fn test_shipping_coupon_waives_delivery_fee() {
    let coupon = CouponTerms {
        coupon_type: CouponType::Shipping,
        discount_percent: None,
        discount_amount: None,
        min_amount: yuan("49"),
        max_discount: None,
    };
    assert_eq!(coupon.discount_for(yuan("60"), yuan("8")), yuan("8.00"));
    assert_eq!(coupon.discount_for(yuan("40"), yuan("8")), Decimal::ZERO);
}

// ============================================================================
// Membership
// ============================================================================

#[test]
fn test_renewing_same_tier_stacks_on_expiry() {
    let expire_at = now() + Duration::days(5);
    let silver = Membership::new(MemberLevel::Silver, Some(expire_at));
    let renewed = silver.extend(MemberLevel::Silver, 30, now());
    assert_eq!(
        renewed.and_then(|m| m.expire_at),
        Some(expire_at + Duration::days(30))
    );
}

#[test]
fn test_upgrading_restarts_from_now() {
    let silver = Membership::new(MemberLevel::Silver, Some(now() + Duration::days(5)));
    let gold = silver.extend(MemberLevel::Gold, 90, now());
    assert_eq!(gold.map(|m| m.level), Some(MemberLevel::Gold));
    assert_eq!(
        gold.and_then(|m| m.expire_at),
        Some(now() + Duration::days(90))
    );
}

#[test]
fn test_repeated_renewals_stay_in_range() {
    let mut membership = Membership::new(MemberLevel::Gold, Some(now() + Duration::days(1)));
    for _ in 0..20 {
        match membership.extend(MemberLevel::Gold, MAX_PLAN_DURATION_DAYS, now()) {
            Some(next) => membership = next,
            None => panic!("a longest-plan renewal left the calendar"),
        }
    }
    assert!(membership.expire_at > Some(now() + Duration::days(365 * 190)));
    assert!(membership.extend(MemberLevel::Gold, i32::MAX, now()).is_none());
}

// ============================================================================
// Coupons
// ============================================================================

#[test]
fn test_receive_checks_run_in_order() {
    let window = CouponWindow {
        status: CouponStatus::Active,
        start_time: now() - Duration::days(1),
        end_time: now() + Duration::days(1),
        total_count: 10,
        received_count: 10,
    };
    // Sold out wins over the per-user limit
    assert_eq!(window.check_receive(now(), 5, 1), Err(ReceiveError::SoldOut));

    let open = CouponWindow {
        received_count: 3,
        ..window
    };
    assert_eq!(open.check_receive(now(), 0, 1), Ok(()));
    assert_eq!(
        open.check_receive(now(), 1, 1),
        Err(ReceiveError::LimitReached(1))
    );
    assert_eq!(
        open.check_receive(now() + Duration::days(2), 0, 1),
        Err(ReceiveError::OutsideWindow)
    );

    let disabled = CouponWindow {
        status: CouponStatus::Inactive,
        ..open
    };
    assert_eq!(disabled.check_receive(now(), 0, 1), Err(ReceiveError::NotActive));
}

#[test]
fn test_unlimited_stock() {
    let window = CouponWindow {
        status: CouponStatus::Active,
        start_time: now(),
        end_time: now(),
        total_count: 0,
        received_count: 10_000,
    };
    assert!(window.has_stock());
    assert!(window.is_open(now()));
}

#[test]
fn test_coupon_code_shape() {
    let code = coupon_code();
    assert_eq!(code.len(), 10);
    assert!(code.starts_with("FM"));
    assert!(
        code.chars()
            .skip(2)
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    );
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn test_weekly_subscription_runs_to_completion() {
    let pricing = SubscriptionPricing::compute(yuan("12.50"), 2, 4);
    assert_eq!(pricing.period_price, yuan("22.50"));
    assert_eq!(pricing.total_price, yuan("90.00"));
    assert_eq!(SubscriptionPricing::delivery_points(pricing.period_price), 22);

    let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default();
    let mut date = start;
    let mut delivered = 0;
    let mut finished = false;
    while let Some(progress) = advance_delivery(SubscriptionFrequency::Weekly, delivered, 4, date) {
        delivered = progress.delivered_count;
        finished = progress.completed;
        match progress.next_delivery_date {
            Some(next) => date = next,
            None => break,
        }
    }
    assert_eq!(delivered, 4);
    assert!(finished);
    assert_eq!(date, start + Duration::days(21));
    assert!(advance_delivery(SubscriptionFrequency::Weekly, 4, 4, date).is_none());
}

// ============================================================================
// Orders
// ============================================================================

#[test]
fn test_only_paid_orders_are_refundable() {
    assert!(!OrderStatus::Pending.is_refundable());
    assert!(OrderStatus::Paid.is_refundable());
    assert!(!OrderStatus::Paid.goods_dispatched());
    assert!(OrderStatus::Shipped.goods_dispatched());
    assert!(!OrderStatus::Refunded.is_refundable());
}

#[test]
fn test_document_numbers_carry_timestamp() {
    let number = DocumentPrefix::Order.generate_at(now());
    let stamp = now().format("%Y%m%d%H%M%S").to_string();
    assert!(number.starts_with(&format!("FM{stamp}")));
    assert_eq!(number.len(), 2 + 14 + 6);
}
