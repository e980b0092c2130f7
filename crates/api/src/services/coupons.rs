//! Receiving, exchanging, issuing, and using coupons.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{
    CouponId, CouponStatus, OrderId, PointsSource, PointsType, UserCouponId, UserCouponStatus,
    UserId,
};

use crate::db::coupons::{self, CouponRepository};
use crate::db::{orders, points};
use crate::error::{AppError, Result};
use crate::models::coupon::{Coupon, UsableCoupon, UserCoupon};
use crate::models::user::PointsChange;

use super::not_found;

/// Coupon workflows that touch holdings or points.
pub struct CouponService<'a> {
    pool: &'a PgPool,
    coupons: CouponRepository<'a>,
}

impl<'a> CouponService<'a> {
    /// Create a new coupon service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            coupons: CouponRepository::new(pool),
        }
    }

    /// Receive a coupon from its template.
    ///
    /// # Errors
    ///
    /// Returns 404 for a missing template, and 400 when it is inactive, out
    /// of its window, sold out, or the user already holds the limit.
    #[instrument(skip(self))]
    pub async fn receive(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCoupon> {
        let mut tx = self.pool.begin().await?;
        let coupon = coupons::lock_coupon(&mut tx, coupon_id)
            .await
            .map_err(not_found("优惠券不存在"))?;

        let held = coupons::count_held(&mut tx, user_id, coupon.id).await?;
        coupon
            .window()
            .check_receive(Utc::now(), held, coupon.per_user_limit)
            .map_err(|e| AppError::bad_request(e.to_string()))?;

        let id = coupons::grant(&mut tx, user_id, coupon.id, false).await?;
        tx.commit().await?;

        Ok(self.coupons.get_user_coupon(user_id, id).await?)
    }

    /// Exchange points for a coupon.
    ///
    /// # Errors
    ///
    /// Returns 400 when the coupon cannot be exchanged or the balance is
    /// short.
    #[instrument(skip(self))]
    pub async fn exchange(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCoupon> {
        let mut tx = self.pool.begin().await?;
        let balance = points::lock_balance(&mut tx, user_id).await?;
        let coupon = coupons::lock_coupon(&mut tx, coupon_id)
            .await
            .map_err(not_found("优惠券不存在"))?;

        check_exchange(&coupon, balance)?;

        points::apply(
            &mut tx,
            &PointsChange {
                user_id,
                points: -coupon.points_required,
                record_type: PointsType::Spend,
                source: PointsSource::Exchange,
                order_id: None,
                subscription_id: None,
                remark: format!("兑换优惠券：{}", coupon.name),
            },
        )
        .await?;
        let id = coupons::grant(&mut tx, user_id, coupon.id, true).await?;
        tx.commit().await?;

        tracing::info!(coupon = %coupon.code, points = coupon.points_required, "coupon exchanged");
        Ok(self.coupons.get_user_coupon(user_id, id).await?)
    }

    /// Grant a coupon to each user directly, skipping users at the
    /// per-user limit. Returns how many were granted.
    ///
    /// # Errors
    ///
    /// Returns 404 for a missing template and 400 when it runs out.
    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    pub async fn issue(&self, coupon_id: CouponId, user_ids: &[UserId]) -> Result<usize> {
        if user_ids.is_empty() {
            return Err(AppError::bad_request("请选择要发放的用户"));
        }

        let mut tx = self.pool.begin().await?;
        let mut coupon = coupons::lock_coupon(&mut tx, coupon_id)
            .await
            .map_err(not_found("优惠券不存在"))?;

        let mut granted = 0;
        for &user_id in user_ids {
            if !coupon.window().has_stock() {
                break;
            }
            let held = coupons::count_held(&mut tx, user_id, coupon.id).await?;
            if held >= i64::from(coupon.per_user_limit) {
                continue;
            }
            coupons::grant(&mut tx, user_id, coupon.id, false).await?;
            coupon.received_count += 1;
            granted += 1;
        }
        tx.commit().await?;

        tracing::info!(coupon = %coupon.code, granted, "coupons issued");
        Ok(granted)
    }

    /// Mark one of the user's coupons used on one of their orders.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's coupon or order and 400 unless the
    /// coupon is unused.
    #[instrument(skip(self))]
    pub async fn use_coupon(
        &self,
        user_id: UserId,
        id: UserCouponId,
        order_id: OrderId,
    ) -> Result<UserCoupon> {
        let mut tx = self.pool.begin().await?;
        let coupon = coupons::lock_user_coupon(&mut tx, user_id, id)
            .await
            .map_err(not_found("优惠券不存在"))?;
        if coupon.status != UserCouponStatus::Unused {
            return Err(AppError::bad_request("优惠券已使用或已过期"));
        }
        let order = orders::lock(&mut tx, order_id)
            .await
            .map_err(not_found("订单不存在"))?;
        if order.user_id != user_id {
            return Err(AppError::not_found("订单不存在"));
        }

        coupons::mark_used(&mut tx, &coupon, order.id).await?;
        tx.commit().await?;
        Ok(self.coupons.get_user_coupon(user_id, id).await?)
    }

    /// Coupons usable on an order of `amount`, each with its discount.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn usable(&self, user_id: UserId, amount: Decimal) -> Result<Vec<UsableCoupon>> {
        let rows = self.coupons.usable(user_id, amount).await?;
        Ok(rows
            .into_iter()
            .map(|coupon| UsableCoupon {
                discount: coupon.terms().discount_for(amount, Decimal::ZERO),
                coupon,
            })
            .collect())
    }
}

/// Check a locked template against the exchange rules and the user's
/// balance.
fn check_exchange(coupon: &Coupon, balance: i32) -> Result<()> {
    if !coupon.is_exchangeable {
        return Err(AppError::bad_request("该优惠券不支持积分兑换"));
    }
    if coupon.status != CouponStatus::Active {
        return Err(AppError::bad_request("优惠券不可兑换"));
    }
    let window = coupon.window();
    if !window.is_open(Utc::now()) {
        return Err(AppError::bad_request("不在兑换时间内"));
    }
    if !coupon.has_exchange_capacity() || !window.has_stock() {
        return Err(AppError::bad_request("优惠券已兑完"));
    }
    if balance < coupon.points_required {
        return Err(AppError::bad_request(format!(
            "积分不足，需要{}积分，当前{}积分",
            coupon.points_required, balance
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use freshmilk_core::CouponType;

    use super::*;

    fn exchange_coupon() -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::new(1),
            code: "EXCHANGE5".to_owned(),
            name: "5元积分券".to_owned(),
            coupon_type: CouponType::Amount,
            discount_percent: None,
            discount_amount: Some(Decimal::new(5, 0)),
            min_amount: Decimal::new(30, 0),
            max_discount: None,
            total_count: 0,
            used_count: 0,
            received_count: 0,
            per_user_limit: 10,
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(30),
            is_all_products: true,
            applicable_product_ids: Vec::new(),
            applicable_category_ids: Vec::new(),
            status: CouponStatus::Active,
            description: String::new(),
            points_required: 50,
            is_exchangeable: true,
            exchange_limit: 2,
            exchanged_count: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_exchange_allowed_with_enough_points() {
        assert!(check_exchange(&exchange_coupon(), 50).is_ok());
    }

    #[test]
    fn test_exchange_rejects_short_balance() {
        let err = check_exchange(&exchange_coupon(), 49).unwrap_err();
        assert_eq!(err.to_string(), "积分不足，需要50积分，当前49积分");
    }

    #[test]
    fn test_exchange_rejects_exhausted_quota() {
        let mut coupon = exchange_coupon();
        coupon.exchanged_count = 2;
        assert!(check_exchange(&coupon, 500).is_err());
    }

    #[test]
    fn test_exchange_rejects_non_exchangeable_and_inactive() {
        let mut coupon = exchange_coupon();
        coupon.is_exchangeable = false;
        assert!(check_exchange(&coupon, 500).is_err());

        let mut coupon = exchange_coupon();
        coupon.status = CouponStatus::Inactive;
        assert!(check_exchange(&coupon, 500).is_err());
    }
}
