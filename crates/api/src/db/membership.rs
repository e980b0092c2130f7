//! Membership plans and membership purchases.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use sqlx::types::Json;

use freshmilk_core::{MemberLevel, Membership, MembershipOrderId, MembershipPlanId, UserId};

use super::RepositoryError;
use crate::models::user::{MembershipOrder, MembershipPlan, MembershipPlanInput};

/// Repository for membership plans and orders.
pub struct MembershipRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MembershipRepository<'a> {
    /// Create a new membership repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Plans, by sort order. `active_only` hides disabled plans.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_plans(&self, active_only: bool) -> Result<Vec<MembershipPlan>, RepositoryError> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            r"
            SELECT * FROM shop.membership_plan
            WHERE is_active OR NOT $1
            ORDER BY sort_order, id
            ",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;
        Ok(plans)
    }

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the plan does not exist.
    pub async fn get_plan(&self, id: MembershipPlanId) -> Result<MembershipPlan, RepositoryError> {
        sqlx::query_as::<_, MembershipPlan>("SELECT * FROM shop.membership_plan WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a plan.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_plan(
        &self,
        input: &MembershipPlanInput,
    ) -> Result<MembershipPlan, RepositoryError> {
        sqlx::query_as::<_, MembershipPlan>(
            r"
            INSERT INTO shop.membership_plan
                (name, level, duration_days, original_price, price, description,
                 benefits, is_active, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(&input.name)
        .bind(input.level)
        .bind(input.duration_days)
        .bind(input.original_price)
        .bind(input.price)
        .bind(&input.description)
        .bind(Json(&input.benefits))
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "套餐名称已存在"))
    }

    /// Replace a plan.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the plan does not exist.
    pub async fn update_plan(
        &self,
        id: MembershipPlanId,
        input: &MembershipPlanInput,
    ) -> Result<MembershipPlan, RepositoryError> {
        sqlx::query_as::<_, MembershipPlan>(
            r"
            UPDATE shop.membership_plan SET
                name = $2, level = $3, duration_days = $4, original_price = $5, price = $6,
                description = $7, benefits = $8, is_active = $9, sort_order = $10
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.level)
        .bind(input.duration_days)
        .bind(input.original_price)
        .bind(input.price)
        .bind(&input.description)
        .bind(Json(&input.benefits))
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "套餐名称已存在"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a plan. Orders keep their snapshot and lose the link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the plan does not exist.
    pub async fn delete_plan(&self, id: MembershipPlanId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shop.membership_order SET plan_id = NULL WHERE plan_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.membership_plan WHERE id = $1")
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
    // Orders
    // =========================================================================

    /// A user's membership orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<MembershipOrder>, RepositoryError> {
        let orders = sqlx::query_as::<_, MembershipOrder>(
            r"
            SELECT * FROM shop.membership_order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(orders)
    }

    /// Get one of the user's membership orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not belong to the user.
    pub async fn get_order(
        &self,
        user_id: UserId,
        id: MembershipOrderId,
    ) -> Result<MembershipOrder, RepositoryError> {
        sqlx::query_as::<_, MembershipOrder>(
            "SELECT * FROM shop.membership_order WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Create a pending order from a plan snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_order(
        &self,
        order_no: &str,
        user_id: UserId,
        plan: &MembershipPlan,
    ) -> Result<MembershipOrder, RepositoryError> {
        let order = sqlx::query_as::<_, MembershipOrder>(
            r"
            INSERT INTO shop.membership_order
                (order_no, user_id, plan_id, plan_name, level, duration_days, amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(order_no)
        .bind(user_id)
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.level)
        .bind(plan.duration_days)
        .bind(plan.price)
        .fetch_one(self.pool)
        .await?;
        Ok(order)
    }

    /// Cancel a pending order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order is not pending.
    pub async fn cancel_order(
        &self,
        user_id: UserId,
        id: MembershipOrderId,
    ) -> Result<MembershipOrder, RepositoryError> {
        let order = self.get_order(user_id, id).await?;
        sqlx::query_as::<_, MembershipOrder>(
            r"
            UPDATE shop.membership_order SET status = 'cancelled'
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(order.id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| RepositoryError::Conflict("只能取消待支付的订单".to_owned()))
    }
}

/// Lock a membership order for payment.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not belong to the user.
pub async fn lock_order(
    conn: &mut PgConnection,
    user_id: UserId,
    id: MembershipOrderId,
) -> Result<MembershipOrder, RepositoryError> {
    sqlx::query_as::<_, MembershipOrder>(
        "SELECT * FROM shop.membership_order WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Lock a user row and return their current membership.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn lock_user_membership(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Membership, RepositoryError> {
    let (level, expire_at): (MemberLevel, Option<DateTime<Utc>>) = sqlx::query_as(
        "SELECT member_level, member_expire_at FROM shop.user WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;
    Ok(Membership::new(level, expire_at))
}

/// Mark an order paid and record the resulting expiry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn mark_paid(
    conn: &mut PgConnection,
    id: MembershipOrderId,
    expire_at: Option<DateTime<Utc>>,
) -> Result<MembershipOrder, RepositoryError> {
    let order = sqlx::query_as::<_, MembershipOrder>(
        r"
        UPDATE shop.membership_order
        SET status = 'paid', paid_at = NOW(), expire_at = $2
        WHERE id = $1
        RETURNING *
        ",
    )
    .bind(id)
    .bind(expire_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Set a user's membership tier and expiry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_user_membership(
    conn: &mut PgConnection,
    user_id: UserId,
    level: MemberLevel,
    expire_at: Option<DateTime<Utc>>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.user SET member_level = $2, member_expire_at = $3 WHERE id = $1")
        .bind(user_id)
        .bind(level)
        .bind(expire_at)
        .execute(conn)
        .await?;
    Ok(())
}
