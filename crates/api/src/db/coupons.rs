//! Coupon repository: templates, user holdings, and activities.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use freshmilk_core::{
    CouponActivityId, CouponId, OrderId, UserCouponId, UserCouponStatus, UserId,
};

use super::{Page, Paginated, RepositoryError};
use crate::models::coupon::{
    Coupon, CouponActivity, CouponActivityDetail, CouponActivityInput, CouponFilter, CouponInput,
    UserCoupon,
};

const USER_COUPON_SELECT: &str = r"
    SELECT uc.id, uc.user_id, uc.coupon_id, uc.status, uc.received_at, uc.used_at, uc.order_id,
           c.name AS coupon_name, c.coupon_type, c.status AS coupon_status,
           c.discount_percent, c.discount_amount, c.min_amount, c.max_discount,
           c.start_time, c.end_time
    FROM shop.user_coupon uc
    JOIN shop.coupon c ON c.id = uc.coupon_id
";

const AVAILABLE: &str = r"
    status = 'active' AND start_time <= NOW() AND end_time >= NOW()
    AND (total_count = 0 OR received_count < total_count)
";

/// Repository for coupons.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    /// Create a new coupon repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Filtered, paginated coupon templates, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &CouponFilter,
        page: Page,
    ) -> Result<Paginated<Coupon>, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.coupon
            WHERE ($1::shop.coupon_status IS NULL OR status = $1)
              AND ($2::shop.coupon_type IS NULL OR coupon_type = $2)
            ",
        )
        .bind(filter.status)
        .bind(filter.coupon_type)
        .fetch_one(self.pool)
        .await?;

        let results = sqlx::query_as::<_, Coupon>(
            r"
            SELECT * FROM shop.coupon
            WHERE ($1::shop.coupon_status IS NULL OR status = $1)
              AND ($2::shop.coupon_type IS NULL OR coupon_type = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(filter.status)
        .bind(filter.coupon_type)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Paginated { count, results })
    }

    /// Coupons that can be received right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn available(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let sql = format!("SELECT * FROM shop.coupon WHERE {AVAILABLE} ORDER BY end_time, id");
        let rows = sqlx::query_as::<_, Coupon>(&sql).fetch_all(self.pool).await?;
        Ok(rows)
    }

    /// Coupons that can be bought with points right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn exchangeable(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let sql = format!(
            r"SELECT * FROM shop.coupon
            WHERE {AVAILABLE} AND is_exchangeable
              AND (exchange_limit = 0 OR exchanged_count < exchange_limit)
            ORDER BY points_required, id"
        );
        let rows = sqlx::query_as::<_, Coupon>(&sql).fetch_all(self.pool).await?;
        Ok(rows)
    }

    /// Get a coupon template.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get(&self, id: CouponId) -> Result<Coupon, RepositoryError> {
        sqlx::query_as::<_, Coupon>("SELECT * FROM shop.coupon WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a coupon template with the given code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, code: &str, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        sqlx::query_as::<_, Coupon>(
            r"
            INSERT INTO shop.coupon
                (code, name, coupon_type, discount_percent, discount_amount, min_amount,
                 max_discount, total_count, per_user_limit, start_time, end_time,
                 is_all_products, applicable_product_ids, applicable_category_ids, status,
                 description, points_required, is_exchangeable, exchange_limit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19)
            RETURNING *
            ",
        )
        .bind(code)
        .bind(&input.name)
        .bind(input.coupon_type)
        .bind(input.discount_percent)
        .bind(input.discount_amount)
        .bind(input.min_amount)
        .bind(input.max_discount)
        .bind(input.total_count)
        .bind(input.per_user_limit)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_all_products)
        .bind(&input.applicable_product_ids)
        .bind(&input.applicable_category_ids)
        .bind(input.status)
        .bind(&input.description)
        .bind(input.points_required)
        .bind(input.is_exchangeable)
        .bind(input.exchange_limit)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "优惠券编码已存在"))
    }

    /// Replace a coupon template's editable fields. The code is kept unless given.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update(&self, id: CouponId, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        sqlx::query_as::<_, Coupon>(
            r"
            UPDATE shop.coupon SET
                code = COALESCE($2, code), name = $3, coupon_type = $4,
                discount_percent = $5, discount_amount = $6, min_amount = $7,
                max_discount = $8, total_count = $9, per_user_limit = $10,
                start_time = $11, end_time = $12, is_all_products = $13,
                applicable_product_ids = $14, applicable_category_ids = $15, status = $16,
                description = $17, points_required = $18, is_exchangeable = $19,
                exchange_limit = $20
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(input.coupon_type)
        .bind(input.discount_percent)
        .bind(input.discount_amount)
        .bind(input.min_amount)
        .bind(input.max_discount)
        .bind(input.total_count)
        .bind(input.per_user_limit)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_all_products)
        .bind(&input.applicable_product_ids)
        .bind(&input.applicable_category_ids)
        .bind(input.status)
        .bind(&input.description)
        .bind(input.points_required)
        .bind(input.is_exchangeable)
        .bind(input.exchange_limit)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "优惠券编码已存在"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Switch a template between active and inactive.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn toggle_status(&self, id: CouponId) -> Result<Coupon, RepositoryError> {
        sqlx::query_as::<_, Coupon>(
            r"
            UPDATE shop.coupon
            SET status = CASE WHEN status = 'active' THEN 'inactive'::shop.coupon_status
                              ELSE 'active'::shop.coupon_status END
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a template that nobody holds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if users already hold it.
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete(&self, id: CouponId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let held: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM shop.user_coupon WHERE coupon_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if held {
            return Err(RepositoryError::Conflict(
                "已有用户领取该优惠券，请改为停用".to_owned(),
            ));
        }

        sqlx::query("DELETE FROM shop.coupon_activity_coupon WHERE coupon_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.coupon WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // User coupons
    // =========================================================================

    /// A user's coupons, newest first. Unused coupons past their end time
    /// are marked expired first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        status: Option<UserCouponStatus>,
        page: Page,
    ) -> Result<Paginated<UserCoupon>, RepositoryError> {
        self.expire_for_user(user_id).await?;

        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.user_coupon
            WHERE user_id = $1 AND ($2::shop.user_coupon_status IS NULL OR status = $2)
            ",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let sql = format!(
            r"{USER_COUPON_SELECT}
            WHERE uc.user_id = $1 AND ($2::shop.user_coupon_status IS NULL OR uc.status = $2)
            ORDER BY uc.received_at DESC, uc.id DESC
            LIMIT $3 OFFSET $4"
        );
        let results = sqlx::query_as::<_, UserCoupon>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Unused coupons whose template is active and not yet ended, with a
    /// threshold at or below `amount`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn usable(&self, user_id: UserId, amount: Decimal) -> Result<Vec<UserCoupon>, RepositoryError> {
        let sql = format!(
            r"{USER_COUPON_SELECT}
            WHERE uc.user_id = $1 AND uc.status = 'unused'
              AND c.status = 'active' AND c.start_time <= NOW() AND c.end_time >= NOW()
              AND c.min_amount <= $2
            ORDER BY c.end_time, uc.id"
        );
        let rows = sqlx::query_as::<_, UserCoupon>(&sql)
            .bind(user_id)
            .bind(amount)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Get one of the user's coupons.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not belong to the user.
    pub async fn get_user_coupon(
        &self,
        user_id: UserId,
        id: UserCouponId,
    ) -> Result<UserCoupon, RepositoryError> {
        let sql = format!("{USER_COUPON_SELECT} WHERE uc.id = $1 AND uc.user_id = $2");
        sqlx::query_as::<_, UserCoupon>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn expire_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.user_coupon uc SET status = 'expired'
            FROM shop.coupon c
            WHERE c.id = uc.coupon_id AND uc.user_id = $1
              AND uc.status = 'unused' AND c.end_time < NOW()
            ",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Activities
    // =========================================================================

    /// Every activity, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_activities(&self) -> Result<Vec<CouponActivity>, RepositoryError> {
        let rows = sqlx::query_as::<_, CouponActivity>(
            "SELECT * FROM shop.coupon_activity ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Active activities inside their window, with their coupons.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn current_activities(&self) -> Result<Vec<CouponActivityDetail>, RepositoryError> {
        let activities = sqlx::query_as::<_, CouponActivity>(
            r"
            SELECT * FROM shop.coupon_activity
            WHERE is_active AND start_time <= NOW() AND end_time >= NOW()
            ORDER BY start_time DESC, id DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        let mut details = Vec::with_capacity(activities.len());
        for activity in activities {
            details.push(self.with_coupons(activity).await?);
        }
        Ok(details)
    }

    /// Get an activity with its coupons.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_activity(
        &self,
        id: CouponActivityId,
    ) -> Result<CouponActivityDetail, RepositoryError> {
        let activity = sqlx::query_as::<_, CouponActivity>(
            "SELECT * FROM shop.coupon_activity WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        self.with_coupons(activity).await
    }

    async fn with_coupons(
        &self,
        activity: CouponActivity,
    ) -> Result<CouponActivityDetail, RepositoryError> {
        let coupons = sqlx::query_as::<_, Coupon>(
            r"
            SELECT c.* FROM shop.coupon c
            JOIN shop.coupon_activity_coupon ac ON ac.coupon_id = c.id
            WHERE ac.activity_id = $1
            ORDER BY c.id
            ",
        )
        .bind(activity.id)
        .fetch_all(self.pool)
        .await?;
        Ok(CouponActivityDetail { activity, coupons })
    }

    /// Create an activity and link its coupons.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn create_activity(
        &self,
        input: &CouponActivityInput,
    ) -> Result<CouponActivityDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query_scalar::<_, CouponActivityId>(
            r"
            INSERT INTO shop.coupon_activity (name, description, start_time, end_time, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await?;
        link_coupons(&mut tx, id, input).await?;
        tx.commit().await?;
        self.get_activity(id).await
    }

    /// Replace an activity and its coupon links.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update_activity(
        &self,
        id: CouponActivityId,
        input: &CouponActivityInput,
    ) -> Result<CouponActivityDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r"
            UPDATE shop.coupon_activity
            SET name = $2, description = $3, start_time = $4, end_time = $5, is_active = $6
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        sqlx::query("DELETE FROM shop.coupon_activity_coupon WHERE activity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_coupons(&mut tx, id, input).await?;
        tx.commit().await?;
        self.get_activity(id).await
    }

    /// Delete an activity and its coupon links.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_activity(&self, id: CouponActivityId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shop.coupon_activity_coupon WHERE activity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.coupon_activity WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn link_coupons(
    conn: &mut PgConnection,
    activity_id: CouponActivityId,
    input: &CouponActivityInput,
) -> Result<(), RepositoryError> {
    let ids: Vec<i32> = input.coupon_ids.iter().map(CouponId::as_i32).collect();
    sqlx::query(
        r"
        INSERT INTO shop.coupon_activity_coupon (activity_id, coupon_id)
        SELECT $1, id FROM shop.coupon WHERE id = ANY($2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(activity_id)
    .bind(ids)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Lock a coupon template.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist.
pub async fn lock_coupon(conn: &mut PgConnection, id: CouponId) -> Result<Coupon, RepositoryError> {
    sqlx::query_as::<_, Coupon>("SELECT * FROM shop.coupon WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Number of coupons from a template the user holds, in any status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn count_held(
    conn: &mut PgConnection,
    user_id: UserId,
    coupon_id: CouponId,
) -> Result<i64, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM shop.user_coupon WHERE user_id = $1 AND coupon_id = $2",
    )
    .bind(user_id)
    .bind(coupon_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Hand a coupon to a user and bump the template's counters.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn grant(
    conn: &mut PgConnection,
    user_id: UserId,
    coupon_id: CouponId,
    via_exchange: bool,
) -> Result<UserCouponId, RepositoryError> {
    let id = sqlx::query_scalar::<_, UserCouponId>(
        "INSERT INTO shop.user_coupon (user_id, coupon_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(coupon_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r"
        UPDATE shop.coupon SET
            received_count = received_count + 1,
            exchanged_count = exchanged_count + CASE WHEN $2 THEN 1 ELSE 0 END
        WHERE id = $1
        ",
    )
    .bind(coupon_id)
    .bind(via_exchange)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Lock one of the user's coupons together with its template fields.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not belong to the user.
pub async fn lock_user_coupon(
    conn: &mut PgConnection,
    user_id: UserId,
    id: UserCouponId,
) -> Result<UserCoupon, RepositoryError> {
    let sql = format!("{USER_COUPON_SELECT} WHERE uc.id = $1 AND uc.user_id = $2 FOR UPDATE OF uc");
    sqlx::query_as::<_, UserCoupon>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Mark a coupon used on an order and bump the template's `used_count`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn mark_used(
    conn: &mut PgConnection,
    coupon: &UserCoupon,
    order_id: OrderId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.user_coupon SET status = 'used', used_at = NOW(), order_id = $2 WHERE id = $1",
    )
    .bind(coupon.id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE shop.coupon SET used_count = used_count + 1 WHERE id = $1")
        .bind(coupon.coupon_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Return a used coupon to its holder.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn release(conn: &mut PgConnection, id: UserCouponId) -> Result<(), RepositoryError> {
    let coupon_id: Option<CouponId> = sqlx::query_scalar(
        r"
        UPDATE shop.user_coupon SET status = 'unused', used_at = NULL, order_id = NULL
        WHERE id = $1 AND status = 'used'
        RETURNING coupon_id
        ",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(coupon_id) = coupon_id {
        sqlx::query("UPDATE shop.coupon SET used_count = GREATEST(0, used_count - 1) WHERE id = $1")
            .bind(coupon_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

