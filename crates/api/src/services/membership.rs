//! Paying for membership plans.

use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{MembershipOrderId, MembershipOrderStatus};

use crate::db::membership;
use crate::error::{AppError, Result};
use crate::models::user::{CurrentUser, MembershipOrder};

use super::not_found;

/// Membership order payment.
pub struct MembershipService<'a> {
    pool: &'a PgPool,
}

impl<'a> MembershipService<'a> {
    /// Create a new membership service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Pay a pending membership order and apply the plan.
    ///
    /// The plan extends the membership stored on the locked user row, so
    /// concurrent purchases by one user apply one after the other.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's order, and 400 unless it is pending
    /// or when the new expiry is out of range.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn pay(&self, user: &CurrentUser, id: MembershipOrderId) -> Result<MembershipOrder> {
        let mut tx = self.pool.begin().await?;
        let order = membership::lock_order(&mut tx, user.id, id)
            .await
            .map_err(not_found("会员订单不存在"))?;
        if order.status != MembershipOrderStatus::Pending {
            return Err(AppError::bad_request("订单状态不正确，无法支付"));
        }

        let current = membership::lock_user_membership(&mut tx, user.id).await?;
        let extended = current
            .extend(order.level, order.duration_days, Utc::now())
            .ok_or_else(|| AppError::bad_request("会员有效期超出范围"))?;
        membership::set_user_membership(&mut tx, user.id, extended.level, extended.expire_at)
            .await?;
        let order = membership::mark_paid(&mut tx, order.id, extended.expire_at).await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, level = %order.level, "membership purchased");
        Ok(order)
    }
}
