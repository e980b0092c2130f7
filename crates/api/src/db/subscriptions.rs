//! Subscription repository.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};

use freshmilk_core::{SubscriptionId, SubscriptionStatus, UserId};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::subscription::{NewSubscription, Subscription, SubscriptionFilter};

/// Repository for subscriptions.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, paginated subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &SubscriptionFilter,
        page: Page,
    ) -> Result<Paginated<Subscription>, RepositoryError> {
        let number = filter.subscription_no.as_deref().map(contains_pattern);

        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.subscription
            WHERE ($1::shop.subscription_status IS NULL OR status = $1)
              AND ($2::integer IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR subscription_no ILIKE $3)
            ",
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(&number)
        .fetch_one(self.pool)
        .await?;

        let results = sqlx::query_as::<_, Subscription>(
            r"
            SELECT * FROM shop.subscription
            WHERE ($1::shop.subscription_status IS NULL OR status = $1)
              AND ($2::integer IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR subscription_no ILIKE $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(&number)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Paginated { count, results })
    }

    /// Get a subscription, optionally scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist or belongs to someone else.
    pub async fn get(
        &self,
        id: SubscriptionId,
        owner: Option<UserId>,
    ) -> Result<Subscription, RepositoryError> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM shop.subscription WHERE id = $1 AND ($2::integer IS NULL OR user_id = $2)",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Insert a subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewSubscription) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query_as::<_, Subscription>(
            r"
            INSERT INTO shop.subscription
                (subscription_no, user_id, product_id, product_name, product_image,
                 product_price, frequency, quantity, total_periods, period_price, total_price,
                 receiver_name, receiver_phone, receiver_address, start_date,
                 next_delivery_date, remark)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15, $16)
            RETURNING *
            ",
        )
        .bind(&new.subscription_no)
        .bind(new.user_id)
        .bind(new.product_id)
        .bind(&new.product_name)
        .bind(&new.product_image)
        .bind(new.product_price)
        .bind(new.frequency)
        .bind(new.quantity)
        .bind(new.total_periods)
        .bind(new.period_price)
        .bind(new.total_price)
        .bind(&new.receiver_name)
        .bind(&new.receiver_phone)
        .bind(&new.receiver_address)
        .bind(new.start_date)
        .bind(&new.remark)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Move a subscription to `to` when its status is one of `from`.
    ///
    /// Returns `None` when the current status is not allowed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn transition(
        &self,
        id: SubscriptionId,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, Subscription>(
            r"
            UPDATE shop.subscription SET status = $3
            WHERE id = $1 AND status::text = ANY($2)
            RETURNING *
            ",
        )
        .bind(id)
        .bind(from.iter().map(SubscriptionStatus::as_str).collect::<Vec<_>>())
        .bind(to)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }
}

/// Lock a subscription row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist or belongs to someone else.
pub async fn lock(
    conn: &mut PgConnection,
    id: SubscriptionId,
    owner: Option<UserId>,
) -> Result<Subscription, RepositoryError> {
    sqlx::query_as::<_, Subscription>(
        r"
        SELECT * FROM shop.subscription
        WHERE id = $1 AND ($2::integer IS NULL OR user_id = $2)
        FOR UPDATE
        ",
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Store delivery progress.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn record_delivery(
    conn: &mut PgConnection,
    id: SubscriptionId,
    delivered_count: i32,
    next_delivery_date: Option<NaiveDate>,
    status: SubscriptionStatus,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.subscription
        SET delivered_count = $2, next_delivery_date = $3, status = $4
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(delivered_count)
    .bind(next_delivery_date)
    .bind(status)
    .execute(conn)
    .await?;
    Ok(())
}
