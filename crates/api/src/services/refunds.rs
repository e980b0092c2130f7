//! Refund workflow.
//!
//! Opening a request parks the order in `refunding` and remembers the status
//! it came from; cancelling or rejecting puts it back. Completion refunds the
//! payments, returns stock when the goods are back in the warehouse, and
//! reverses points earned on the order.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{
    DocumentPrefix, OrderStatus, PointsSource, PointsType, RefundId, RefundStatus, RefundType,
    UserId,
};

use crate::db::refunds::{NewRefund, RefundRepository};
use crate::db::{catalog, orders, points, refunds};
use crate::error::{AppError, Result};
use crate::models::order::{CreateRefund, RefundRequest};
use crate::models::user::PointsChange;

use super::not_found;

/// Whether completing a refund puts goods back on the shelf: they were
/// returned, or they never left.
#[must_use]
pub fn restocks(refund_type: RefundType, status_before: OrderStatus) -> bool {
    refund_type == RefundType::ReturnRefund || status_before == OrderStatus::Paid
}

/// Refund amount for a request, defaulting to the full payment.
///
/// # Errors
///
/// Returns 400 unless `0 < amount <= pay_amount`.
pub fn refund_amount(requested: Option<Decimal>, pay_amount: Decimal) -> Result<Decimal> {
    let amount = requested.unwrap_or(pay_amount);
    if amount <= Decimal::ZERO || amount > pay_amount {
        return Err(AppError::bad_request("退款金额必须大于0且不超过实付金额"));
    }
    Ok(amount)
}

/// Refund requests and their processing.
pub struct RefundService<'a> {
    pool: &'a PgPool,
    refunds: RefundRepository<'a>,
}

impl<'a> RefundService<'a> {
    /// Create a new refund service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            refunds: RefundRepository::new(pool),
        }
    }

    /// Open a refund request on one of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's order and 400 when the order cannot be
    /// refunded, already has an open request, or the amount is out of range.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create(&self, user_id: UserId, input: &CreateRefund) -> Result<RefundRequest> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, input.order_id)
            .await
            .map_err(not_found("订单不存在"))?;
        if order.user_id != user_id {
            return Err(AppError::not_found("订单不存在"));
        }
        if !order.status.is_refundable() {
            return Err(AppError::bad_request("当前订单状态不可申请退款"));
        }
        if refunds::has_open(&mut tx, order.id).await? {
            return Err(AppError::bad_request("该订单已有处理中的退款申请"));
        }
        if input.refund_type == RefundType::ReturnRefund && !order.status.goods_dispatched() {
            return Err(AppError::bad_request("订单尚未发货，请选择仅退款"));
        }
        let amount = refund_amount(input.amount, order.pay_amount)?;

        let refund_no = DocumentPrefix::Refund.generate();
        let id = refunds::insert(
            &mut tx,
            &NewRefund {
                refund_no: &refund_no,
                order_id: order.id,
                user_id,
                refund_type: input.refund_type,
                reason: input.reason,
                description: input.description.trim(),
                amount,
                images: &input.images,
                order_status_before: order.status,
            },
        )
        .await?;
        orders::set_status(&mut tx, order.id, OrderStatus::Refunding).await?;
        tx.commit().await?;

        tracing::info!(%refund_no, order_no = %order.order_no, "refund requested");
        Ok(self.refunds.get(id).await?)
    }

    /// Withdraw a pending or approved request.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's request and 400 once it is closed.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId, id: RefundId) -> Result<RefundRequest> {
        let mut tx = self.pool.begin().await?;
        let refund = refunds::lock(&mut tx, id).await.map_err(not_found("退款申请不存在"))?;
        if refund.user_id != user_id {
            return Err(AppError::not_found("退款申请不存在"));
        }
        if !refund.status.is_open() {
            return Err(AppError::bad_request("当前状态不可取消"));
        }

        refunds::close(&mut tx, id, RefundStatus::Cancelled, None, "").await?;
        orders::set_status(&mut tx, refund.order_id, refund.order_status_before).await?;
        tx.commit().await?;
        Ok(self.refunds.get(id).await?)
    }

    /// Record the customer's return shipment on an approved return.
    ///
    /// # Errors
    ///
    /// Returns 400 unless the request is an approved return with both fields
    /// filled in.
    pub async fn fill_return_express(
        &self,
        user_id: UserId,
        id: RefundId,
        company: &str,
        express_no: &str,
    ) -> Result<RefundRequest> {
        let refund = self
            .refunds
            .get_for_user(user_id, id)
            .await
            .map_err(not_found("退款申请不存在"))?;
        if refund.status != RefundStatus::Approved || refund.refund_type != RefundType::ReturnRefund
        {
            return Err(AppError::bad_request("只有已同意的退货退款申请可以填写退货物流"));
        }
        let (company, express_no) = (company.trim(), express_no.trim());
        if company.is_empty() || express_no.is_empty() {
            return Err(AppError::bad_request("请填写退货快递公司和快递单号"));
        }
        Ok(self
            .refunds
            .set_return_express(id, company, express_no)
            .await?)
    }

    /// Approve a pending request. Return requests get `return_address`, or
    /// `default_address` when none is given.
    ///
    /// # Errors
    ///
    /// Returns 400 unless the request is pending.
    #[instrument(skip(self, default_address))]
    pub async fn approve(
        &self,
        admin_id: UserId,
        id: RefundId,
        admin_remark: &str,
        return_address: Option<&str>,
        default_address: &str,
    ) -> Result<RefundRequest> {
        let refund = self.refunds.get(id).await.map_err(not_found("退款申请不存在"))?;
        if refund.status != RefundStatus::Pending {
            return Err(AppError::bad_request("只能审核待处理的退款申请"));
        }

        let address = if refund.refund_type == RefundType::ReturnRefund {
            return_address
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(default_address)
        } else {
            ""
        };
        Ok(self
            .refunds
            .approve(id, admin_id, admin_remark.trim(), address)
            .await?)
    }

    /// Reject a pending request and restore the order.
    ///
    /// # Errors
    ///
    /// Returns 400 for an empty reason or a request that is not pending.
    #[instrument(skip(self))]
    pub async fn reject(&self, admin_id: UserId, id: RefundId, reason: &str) -> Result<RefundRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::bad_request("请填写拒绝原因"));
        }

        let mut tx = self.pool.begin().await?;
        let refund = refunds::lock(&mut tx, id).await.map_err(not_found("退款申请不存在"))?;
        if refund.status != RefundStatus::Pending {
            return Err(AppError::bad_request("只能审核待处理的退款申请"));
        }

        refunds::close(&mut tx, id, RefundStatus::Rejected, Some(admin_id), reason).await?;
        orders::set_status(&mut tx, refund.order_id, refund.order_status_before).await?;
        tx.commit().await?;
        Ok(self.refunds.get(id).await?)
    }

    /// Complete an approved request.
    ///
    /// # Errors
    ///
    /// Returns 400 unless the request is approved and, for returns, the
    /// return shipment has been recorded.
    #[instrument(skip(self))]
    pub async fn complete(&self, admin_id: UserId, id: RefundId) -> Result<RefundRequest> {
        let mut tx = self.pool.begin().await?;
        let refund = refunds::lock(&mut tx, id).await.map_err(not_found("退款申请不存在"))?;
        if refund.status != RefundStatus::Approved {
            return Err(AppError::bad_request("只能完成已同意的退款申请"));
        }
        if refund.refund_type == RefundType::ReturnRefund && refund.return_express_no.is_empty() {
            return Err(AppError::bad_request("买家尚未填写退货物流"));
        }

        let order = orders::lock(&mut tx, refund.order_id).await?;
        orders::set_status(&mut tx, order.id, OrderStatus::Refunded).await?;
        orders::refund_payments(&mut tx, order.id).await?;

        if restocks(refund.refund_type, refund.order_status_before) {
            for item in orders::items_in(&mut tx, order.id).await? {
                if let Some(product_id) = item.product_id {
                    catalog::adjust_stock(&mut tx, product_id, -item.quantity).await?;
                }
            }
        }

        if order.points_awarded > 0 {
            points::apply(
                &mut tx,
                &PointsChange {
                    user_id: order.user_id,
                    points: -order.points_awarded,
                    record_type: PointsType::Adjust,
                    source: PointsSource::Refund,
                    order_id: Some(order.id),
                    subscription_id: None,
                    remark: format!("订单{}退款，扣回积分", order.order_no),
                },
            )
            .await?;
            orders::set_points_awarded(&mut tx, order.id, 0).await?;
        }

        refunds::close(&mut tx, id, RefundStatus::Completed, Some(admin_id), "").await?;
        tx.commit().await?;

        tracing::info!(refund_no = %refund.refund_no, amount = %refund.amount, "refund completed");
        Ok(self.refunds.get(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restocks() {
        assert!(restocks(RefundType::ReturnRefund, OrderStatus::Delivered));
        assert!(restocks(RefundType::RefundOnly, OrderStatus::Paid));
        assert!(!restocks(RefundType::RefundOnly, OrderStatus::Shipped));
        assert!(!restocks(RefundType::RefundOnly, OrderStatus::Completed));
    }

    #[test]
    fn test_refund_amount_bounds() {
        let paid = Decimal::new(5000, 2);
        assert_eq!(refund_amount(None, paid).ok(), Some(paid));
        assert_eq!(
            refund_amount(Some(Decimal::new(1000, 2)), paid).ok(),
            Some(Decimal::new(1000, 2))
        );
        assert!(refund_amount(Some(Decimal::ZERO), paid).is_err());
        assert!(refund_amount(Some(Decimal::new(5001, 2)), paid).is_err());
    }
}
