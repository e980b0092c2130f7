//! Checkout and order lifecycle.
//!
//! Every state change locks the order row first and checks the current
//! status by equality. Stock moves happen under `SELECT ... FOR UPDATE` on
//! the product rows inside the same transaction.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{
    AddressId, DocumentPrefix, OrderId, OrderStatus, PaymentMethod, PointsSource, PointsType,
    ProductId, UserId, at_least_min_pay, floor_points, round_money,
};

use crate::db::addresses::AddressRepository;
use crate::db::{cart, catalog, coupons, orders, points};
use crate::error::{AppError, Result};
use crate::models::order::{CreateOrder, NewOrder, NewOrderItem, Order, OrderDetail};
use crate::models::user::{CurrentUser, PointsChange};

use super::not_found;

/// Where goods are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// Resolve receiver details from a saved address or from explicit fields.
///
/// # Errors
///
/// Returns 404 for someone else's address and 400 when neither source is
/// complete.
pub async fn resolve_receiver(
    pool: &PgPool,
    user_id: UserId,
    address_id: Option<AddressId>,
    name: Option<&str>,
    phone: Option<&str>,
    address: Option<&str>,
) -> Result<Receiver> {
    if let Some(id) = address_id {
        let saved = AddressRepository::new(pool)
            .get(user_id, id)
            .await
            .map_err(not_found("收货地址不存在"))?;
        return Ok(Receiver {
            address: saved.full_address(),
            name: saved.receiver_name,
            phone: saved.receiver_phone,
        });
    }

    match (name, phone, address) {
        (Some(name), Some(phone), Some(address))
            if !name.trim().is_empty() && !phone.trim().is_empty() && !address.trim().is_empty() =>
        {
            Ok(Receiver {
                name: name.trim().to_owned(),
                phone: phone.trim().to_owned(),
                address: address.trim().to_owned(),
            })
        }
        _ => Err(AppError::bad_request("请选择收货地址或填写收货信息")),
    }
}

/// Reserve `quantity` of a product against its locked `stock`, counting
/// earlier lines of the same order for that product.
///
/// On shortage returns what is still available to this line.
fn claim_stock(
    claimed: &mut HashMap<ProductId, i32>,
    product_id: ProductId,
    quantity: i32,
    stock: i32,
) -> std::result::Result<(), i32> {
    let already = claimed.get(&product_id).copied().unwrap_or(0);
    let available = stock.saturating_sub(already).max(0);
    match already.checked_add(quantity) {
        Some(wanted) if wanted <= stock => {
            claimed.insert(product_id, wanted);
            Ok(())
        }
        _ => Err(available),
    }
}

/// Checkout and order status changes.
pub struct OrderService<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order.
    ///
    /// Locks each product, checks stock, snapshots lines, applies the member
    /// discount and an optional coupon, and removes the products from the
    /// cart. Any failure rolls the whole checkout back.
    ///
    /// # Errors
    ///
    /// Returns 400 for empty orders, bad quantities, short stock, or an
    /// unusable coupon, and 404 for missing or inactive products.
    #[instrument(skip(self, user, input), fields(user_id = %user.id, lines = input.items.len()))]
    pub async fn create(&self, user: &CurrentUser, input: &CreateOrder) -> Result<OrderDetail> {
        if input.items.is_empty() {
            return Err(AppError::bad_request("订单商品不能为空"));
        }
        if input.items.iter().any(|line| line.quantity < 1) {
            return Err(AppError::bad_request("商品数量必须大于0"));
        }

        let receiver = resolve_receiver(
            self.pool,
            user.id,
            input.address_id,
            input.receiver_name.as_deref(),
            input.receiver_phone.as_deref(),
            input.receiver_address.as_deref(),
        )
        .await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut lines = Vec::with_capacity(input.items.len());
        let mut claimed = HashMap::new();
        let mut total = Decimal::ZERO;
        for line in &input.items {
            let product = catalog::lock_product(&mut tx, line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| AppError::not_found("商品不存在或已下架"))?;
            claim_stock(&mut claimed, product.id, line.quantity, product.stock).map_err(
                |available| {
                    AppError::bad_request(format!("{}库存不足，当前库存{}", product.name, available))
                },
            )?;

            let total_price = product.price * Decimal::from(line.quantity);
            total += total_price;
            lines.push(NewOrderItem {
                product_id: product.id,
                product_name: product.name,
                product_image: product.cover_image,
                price: product.price,
                quantity: line.quantity,
                total_price,
            });
        }

        let total = round_money(total);
        let mut pay = round_money(total * user.membership.discount_rate(now));

        let coupon = match input.user_coupon_id {
            Some(id) => {
                let coupon = coupons::lock_user_coupon(&mut tx, user.id, id)
                    .await
                    .map_err(not_found("优惠券不存在"))?;
                if !coupon.is_usable(now) {
                    return Err(AppError::bad_request("优惠券不可用"));
                }
                let terms = coupon.terms();
                if !terms.meets_minimum(total) {
                    return Err(AppError::bad_request(format!(
                        "订单金额未满{}元，无法使用该优惠券",
                        terms.min_amount
                    )));
                }
                pay = at_least_min_pay(pay - terms.discount_for(total, Decimal::ZERO));
                Some(coupon)
            }
            None => None,
        };

        let order = orders::insert(
            &mut tx,
            &NewOrder {
                order_no: DocumentPrefix::Order.generate_at(now),
                user_id: user.id,
                total_amount: total,
                pay_amount: pay,
                discount_amount: total - pay,
                user_coupon_id: coupon.as_ref().map(|c| c.id),
                receiver_name: receiver.name,
                receiver_phone: receiver.phone,
                receiver_address: receiver.address,
                remark: input.remark.trim().to_owned(),
            },
        )
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            items.push(orders::insert_item(&mut tx, order.id, line).await?);
            catalog::adjust_stock(&mut tx, line.product_id, line.quantity).await?;
        }

        if let Some(coupon) = &coupon {
            coupons::mark_used(&mut tx, coupon, order.id).await?;
        }

        let product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        cart::remove_products(&mut tx, user.id, &product_ids).await?;

        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, pay_amount = %order.pay_amount, "order created");
        Ok(OrderDetail { order, items })
    }

    /// Cancel a pending order, returning stock and any coupon.
    ///
    /// `owner` restricts the order to one user; admins pass `None`.
    ///
    /// # Errors
    ///
    /// Returns 404 for a missing order and 400 unless it is pending.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId, owner: Option<UserId>) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_owned(&mut tx, id, owner).await?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::bad_request("只能取消待支付的订单"));
        }

        for item in orders::items_in(&mut tx, id).await? {
            if let Some(product_id) = item.product_id {
                catalog::adjust_stock(&mut tx, product_id, -item.quantity).await?;
            }
        }
        if let Some(coupon_id) = order.user_coupon_id {
            coupons::release(&mut tx, coupon_id).await?;
        }

        let order = orders::transition(&mut tx, id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await?
            .ok_or_else(|| AppError::bad_request("只能取消待支付的订单"))?;
        tx.commit().await?;
        Ok(order)
    }

    /// Pay a pending order with a simulated payment.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's order and 400 unless it is pending.
    #[instrument(skip(self))]
    pub async fn pay(
        &self,
        user_id: UserId,
        id: OrderId,
        method: Option<PaymentMethod>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_owned(&mut tx, id, Some(user_id)).await?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::bad_request("订单状态不正确，无法支付"));
        }

        orders::insert_payment(
            &mut tx,
            &DocumentPrefix::Payment.generate(),
            id,
            order.pay_amount,
            method.unwrap_or(PaymentMethod::Sandbox),
        )
        .await?;
        let order = orders::transition(&mut tx, id, OrderStatus::Pending, OrderStatus::Paid)
            .await?
            .ok_or_else(|| AppError::bad_request("订单状态不正确，无法支付"))?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, "order paid");
        Ok(order)
    }

    /// Confirm receipt of a delivered order and award points.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's order and 400 unless it is delivered.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn confirm_receive(&self, user: &CurrentUser, id: OrderId) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_owned(&mut tx, id, Some(user.id)).await?;
        if order.status != OrderStatus::Delivered {
            return Err(AppError::bad_request("只能确认已送达的订单"));
        }

        let mut order = orders::transition(&mut tx, id, OrderStatus::Delivered, OrderStatus::Completed)
            .await?
            .ok_or_else(|| AppError::bad_request("只能确认已送达的订单"))?;

        let earned = floor_points(order.pay_amount * user.membership.points_multiplier(Utc::now()));
        if earned > 0 {
            points::apply(
                &mut tx,
                &PointsChange {
                    user_id: user.id,
                    points: earned,
                    record_type: PointsType::Earn,
                    source: PointsSource::Order,
                    order_id: Some(id),
                    subscription_id: None,
                    remark: format!("订单{}完成", order.order_no),
                },
            )
            .await?;
            orders::set_points_awarded(&mut tx, id, earned).await?;
            order.points_awarded = earned;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Mark a paid order shipped with manually entered express details.
    ///
    /// # Errors
    ///
    /// Returns 400 when details are missing or the order is not paid.
    #[instrument(skip(self))]
    pub async fn ship(&self, id: OrderId, express_company: &str, express_no: &str) -> Result<Order> {
        let (company, number) = (express_company.trim(), express_no.trim());
        if company.is_empty() || number.is_empty() {
            return Err(AppError::bad_request("请填写快递公司和快递单号"));
        }

        let mut tx = self.pool.begin().await?;
        let order = orders::lock(&mut tx, id).await?;
        if order.status != OrderStatus::Paid {
            return Err(AppError::bad_request("只有已支付的订单可以发货"));
        }
        orders::transition(&mut tx, id, OrderStatus::Paid, OrderStatus::Shipped).await?;
        orders::set_shipping(&mut tx, id, company, number).await?;
        let order = orders::lock(&mut tx, id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Mark a shipped order delivered.
    ///
    /// # Errors
    ///
    /// Returns 400 unless the order is shipped.
    #[instrument(skip(self))]
    pub async fn deliver(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        orders::lock(&mut tx, id).await?;
        let order = orders::transition(&mut tx, id, OrderStatus::Shipped, OrderStatus::Delivered)
            .await?
            .ok_or_else(|| AppError::bad_request("只有已发货的订单可以标记送达"))?;
        tx.commit().await?;
        Ok(order)
    }
}

/// Lock an order and check who owns it. Someone else's order is reported as
/// missing.
async fn lock_owned(
    conn: &mut sqlx::PgConnection,
    id: OrderId,
    owner: Option<UserId>,
) -> Result<Order> {
    let order = orders::lock(conn, id).await.map_err(not_found("订单不存在"))?;
    if owner.is_some_and(|user_id| order.user_id != user_id) {
        return Err(AppError::not_found("订单不存在"));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_stock_counts_repeated_lines() {
        let mut claimed = HashMap::new();
        let milk = ProductId::new(1);
        assert_eq!(claim_stock(&mut claimed, milk, 5, 6), Ok(()));
        assert_eq!(claim_stock(&mut claimed, milk, 5, 6), Err(1));
        assert_eq!(claim_stock(&mut claimed, milk, 1, 6), Ok(()));
        assert_eq!(claim_stock(&mut claimed, milk, 1, 6), Err(0));
    }

    #[test]
    fn test_claim_stock_is_per_product() {
        let mut claimed = HashMap::new();
        assert_eq!(claim_stock(&mut claimed, ProductId::new(1), 6, 6), Ok(()));
        assert_eq!(claim_stock(&mut claimed, ProductId::new(2), 6, 6), Ok(()));
    }

    #[test]
    fn test_claim_stock_huge_quantity() {
        let mut claimed = HashMap::new();
        let milk = ProductId::new(1);
        assert_eq!(claim_stock(&mut claimed, milk, 1, 10), Ok(()));
        assert_eq!(claim_stock(&mut claimed, milk, i32::MAX, 10), Err(9));
    }
}
