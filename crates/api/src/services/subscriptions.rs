//! Subscription sign-up, status changes, and delivery confirmation.

use chrono::{Local, NaiveDate};
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{
    DocumentPrefix, PointsSource, PointsType, SubscriptionId, SubscriptionPricing,
    SubscriptionStatus, UserId, advance_delivery, periods_in_range,
};

use crate::db::catalog::CatalogRepository;
use crate::db::points;
use crate::db::subscriptions::{self, SubscriptionRepository};
use crate::error::{AppError, Result};
use crate::models::subscription::{
    CreateSubscription, DeliveryConfirmation, NewSubscription, Subscription,
};
use crate::models::user::PointsChange;

use super::not_found;
use super::orders::resolve_receiver;

/// Validate quantity, period count, and start date of a sign-up.
///
/// # Errors
///
/// Returns 400 for the first rule that fails.
pub fn validate_request(
    quantity: i32,
    total_periods: i32,
    start_date: NaiveDate,
    today: NaiveDate,
) -> Result<()> {
    if quantity < 1 {
        return Err(AppError::bad_request("订购数量必须大于0"));
    }
    if !periods_in_range(total_periods) {
        return Err(AppError::bad_request("订购期数必须在1到52之间"));
    }
    if start_date < today {
        return Err(AppError::bad_request("开始日期不能早于今天"));
    }
    Ok(())
}

/// Subscription workflows.
pub struct SubscriptionService<'a> {
    pool: &'a PgPool,
    subscriptions: SubscriptionRepository<'a>,
}

impl<'a> SubscriptionService<'a> {
    /// Create a new subscription service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            subscriptions: SubscriptionRepository::new(pool),
        }
    }

    /// Sign a user up for periodic deliveries of a product.
    ///
    /// # Errors
    ///
    /// Returns 404 unless the product is active and offered on
    /// subscription, and 400 for an invalid request.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn create(&self, user_id: UserId, input: &CreateSubscription) -> Result<Subscription> {
        let product = CatalogRepository::new(self.pool)
            .get_product(input.product_id)
            .await
            .map_err(not_found("该商品不支持订阅"))?;
        if !(product.is_active && product.is_subscription) {
            return Err(AppError::not_found("该商品不支持订阅"));
        }

        validate_request(
            input.quantity,
            input.total_periods,
            input.start_date,
            Local::now().date_naive(),
        )?;

        let receiver = resolve_receiver(
            self.pool,
            user_id,
            input.address_id,
            input.receiver_name.as_deref(),
            input.receiver_phone.as_deref(),
            input.receiver_address.as_deref(),
        )
        .await?;

        let pricing = SubscriptionPricing::compute(product.price, input.quantity, input.total_periods);
        let subscription = self
            .subscriptions
            .create(&NewSubscription {
                subscription_no: DocumentPrefix::Subscription.generate(),
                user_id,
                product_id: product.id,
                product_name: product.name,
                product_image: product.cover_image,
                product_price: product.price,
                frequency: input.frequency,
                quantity: input.quantity,
                total_periods: input.total_periods,
                period_price: pricing.period_price,
                total_price: pricing.total_price,
                receiver_name: receiver.name,
                receiver_phone: receiver.phone,
                receiver_address: receiver.address,
                start_date: input.start_date,
                remark: input.remark.trim().to_owned(),
            })
            .await?;

        tracing::info!(subscription_no = %subscription.subscription_no, "subscription created");
        Ok(subscription)
    }

    /// Pause an active subscription.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's subscription and 400 unless it is active.
    pub async fn pause(&self, id: SubscriptionId, owner: Option<UserId>) -> Result<Subscription> {
        self.transition(
            id,
            owner,
            &[SubscriptionStatus::Active],
            SubscriptionStatus::Paused,
            "只能暂停进行中的订阅",
        )
        .await
    }

    /// Resume a paused subscription.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's subscription and 400 unless it is paused.
    pub async fn resume(&self, id: SubscriptionId, owner: Option<UserId>) -> Result<Subscription> {
        self.transition(
            id,
            owner,
            &[SubscriptionStatus::Paused],
            SubscriptionStatus::Active,
            "只能恢复已暂停的订阅",
        )
        .await
    }

    /// Cancel a subscription that has not finished.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's subscription and 400 once it is
    /// completed or cancelled.
    pub async fn cancel(&self, id: SubscriptionId, owner: Option<UserId>) -> Result<Subscription> {
        self.transition(
            id,
            owner,
            &[SubscriptionStatus::Active, SubscriptionStatus::Paused],
            SubscriptionStatus::Cancelled,
            "该订阅已结束，无法取消",
        )
        .await
    }

    async fn transition(
        &self,
        id: SubscriptionId,
        owner: Option<UserId>,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
        rejected: &'static str,
    ) -> Result<Subscription> {
        self.subscriptions
            .get(id, owner)
            .await
            .map_err(not_found("订阅不存在"))?;
        self.subscriptions
            .transition(id, from, to)
            .await?
            .ok_or_else(|| AppError::bad_request(rejected))
    }

    /// Record one delivery and award its points to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's subscription and 400 unless it is
    /// active with periods remaining.
    #[instrument(skip(self))]
    pub async fn confirm_delivery(
        &self,
        id: SubscriptionId,
        owner: Option<UserId>,
    ) -> Result<DeliveryConfirmation> {
        let mut tx = self.pool.begin().await?;
        let subscription = subscriptions::lock(&mut tx, id, owner)
            .await
            .map_err(not_found("订阅不存在"))?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(AppError::bad_request("只能确认进行中订阅的配送"));
        }

        let current = subscription
            .next_delivery_date
            .unwrap_or(subscription.start_date);
        let progress = advance_delivery(
            subscription.frequency,
            subscription.delivered_count,
            subscription.total_periods,
            current,
        )
        .ok_or_else(|| AppError::bad_request("所有期数均已配送"))?;

        let status = if progress.completed {
            SubscriptionStatus::Completed
        } else {
            SubscriptionStatus::Active
        };
        subscriptions::record_delivery(
            &mut tx,
            id,
            progress.delivered_count,
            progress.next_delivery_date,
            status,
        )
        .await?;

        let earned = SubscriptionPricing::delivery_points(subscription.period_price);
        points::apply(
            &mut tx,
            &PointsChange {
                user_id: subscription.user_id,
                points: earned,
                record_type: PointsType::Earn,
                source: PointsSource::Subscription,
                order_id: None,
                subscription_id: Some(id),
                remark: format!(
                    "订阅{}第{}期配送完成",
                    subscription.subscription_no, progress.delivered_count
                ),
            },
        )
        .await?;
        tx.commit().await?;

        Ok(DeliveryConfirmation {
            delivered_count: progress.delivered_count,
            total_periods: subscription.total_periods,
            points_earned: earned,
            status,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_request_accepts_today() {
        let today = date(2026, 5, 1);
        assert!(validate_request(1, 4, today, today).is_ok());
        assert!(validate_request(2, 52, date(2026, 6, 1), today).is_ok());
    }

    #[test]
    fn test_validate_request_rules() {
        let today = date(2026, 5, 1);
        assert!(validate_request(0, 4, today, today).is_err());
        assert!(validate_request(1, 0, today, today).is_err());
        assert!(validate_request(1, 53, today, today).is_err());
        assert_eq!(
            validate_request(1, 4, date(2026, 4, 30), today)
                .unwrap_err()
                .to_string(),
            "开始日期不能早于今天"
        );
    }
}
