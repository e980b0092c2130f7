//! Order and payment repository.
//!
//! Read paths take the pool; the checkout, cancel, and refund workflows in
//! `services` drive the `&mut PgConnection` helpers inside one transaction.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use freshmilk_core::{
    OrderId, OrderStatus, PaymentId, PaymentMethod, PaymentStatus, ProductId, UserId,
};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::order::{
    NewOrder, NewOrderItem, Order, OrderDetail, OrderFilter, OrderItem, Payment, PaymentFilter,
};

const PAYMENT_SELECT: &str = r"
    SELECT pm.*, o.order_no
    FROM shop.payment pm
    JOIN shop.order o ON o.id = pm.order_id
";

/// Repository for orders and payments.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, paginated orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Paginated<Order>, RepositoryError> {
        let order_no = filter.order_no.as_deref().map(contains_pattern);

        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.order
            WHERE ($1::shop.order_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR order_no ILIKE $2)
              AND ($3::integer IS NULL OR user_id = $3)
            ",
        )
        .bind(filter.status)
        .bind(&order_no)
        .bind(filter.user_id)
        .fetch_one(self.pool)
        .await?;

        let results = sqlx::query_as::<_, Order>(
            r"
            SELECT * FROM shop.order
            WHERE ($1::shop.order_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR order_no ILIKE $2)
              AND ($3::integer IS NULL OR user_id = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(filter.status)
        .bind(&order_no)
        .bind(filter.user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;

        Ok(Paginated { count, results })
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>("SELECT * FROM shop.order WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get an order by its number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn get_by_no(&self, order_no: &str) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>("SELECT * FROM shop.order WHERE order_no = $1")
            .bind(order_no)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get one of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not belong to the user.
    pub async fn get_for_user(&self, user_id: UserId, id: OrderId) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>("SELECT * FROM shop.order WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Lines of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM shop.order_item WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// Attach lines to an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn detail(&self, order: Order) -> Result<OrderDetail, RepositoryError> {
        let items = self.items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Whether the order contains a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn contains_product(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM shop.order_item WHERE order_id = $1 AND product_id = $2)",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Filtered, paginated payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<Paginated<Payment>, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.payment
            WHERE ($1::shop.payment_status IS NULL OR status = $1)
              AND ($2::shop.payment_method IS NULL OR method = $2)
            ",
        )
        .bind(filter.status)
        .bind(filter.method)
        .fetch_one(self.pool)
        .await?;

        let sql = format!(
            r"{PAYMENT_SELECT}
            WHERE ($1::shop.payment_status IS NULL OR pm.status = $1)
              AND ($2::shop.payment_method IS NULL OR pm.method = $2)
            ORDER BY pm.created_at DESC, pm.id DESC
            LIMIT $3 OFFSET $4"
        );
        let results = sqlx::query_as::<_, Payment>(&sql)
            .bind(filter.status)
            .bind(filter.method)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, RepositoryError> {
        let sql = format!("{PAYMENT_SELECT} WHERE pm.id = $1");
        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Lock an order row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>("SELECT * FROM shop.order WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Insert an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(conn: &mut PgConnection, new: &NewOrder) -> Result<Order, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(
        r"
        INSERT INTO shop.order
            (order_no, user_id, total_amount, pay_amount, discount_amount, user_coupon_id,
             receiver_name, receiver_phone, receiver_address, remark)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        ",
    )
    .bind(&new.order_no)
    .bind(new.user_id)
    .bind(new.total_amount)
    .bind(new.pay_amount)
    .bind(new.discount_amount)
    .bind(new.user_coupon_id)
    .bind(&new.receiver_name)
    .bind(&new.receiver_phone)
    .bind(&new.receiver_address)
    .bind(&new.remark)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Insert an order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &NewOrderItem,
) -> Result<OrderItem, RepositoryError> {
    let row = sqlx::query_as::<_, OrderItem>(
        r"
        INSERT INTO shop.order_item
            (order_id, product_id, product_name, product_image, price, quantity, total_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        ",
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(&item.product_name)
    .bind(&item.product_image)
    .bind(item.price)
    .bind(item.quantity)
    .bind(item.total_price)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Lines of an order, read inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items_in(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM shop.order_item WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Move an order from `from` to `to`, stamping the matching timestamp.
///
/// Returns `None` when the order is not in `from`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn transition(
    conn: &mut PgConnection,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(
        r"
        UPDATE shop.order SET
            status = $3,
            paid_at = CASE WHEN $3 = 'paid'::shop.order_status THEN NOW() ELSE paid_at END,
            shipped_at = CASE WHEN $3 = 'shipped'::shop.order_status THEN NOW() ELSE shipped_at END,
            delivered_at = CASE WHEN $3 = 'delivered'::shop.order_status THEN NOW() ELSE delivered_at END,
            completed_at = CASE WHEN $3 = 'completed'::shop.order_status THEN NOW() ELSE completed_at END,
            cancelled_at = CASE WHEN $3 = 'cancelled'::shop.order_status THEN NOW() ELSE cancelled_at END
        WHERE id = $1 AND status = $2
        RETURNING *
        ",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Set an order's status without touching timestamps.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.order SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

/// Record express details on a shipped order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_shipping(
    conn: &mut PgConnection,
    id: OrderId,
    express_company: &str,
    express_no: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.order
        SET express_company = $2, express_no = $3, express_status = 'created'
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(express_company)
    .bind(express_no)
    .execute(conn)
    .await?;
    Ok(())
}

/// Store the points awarded on completion.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_points_awarded(
    conn: &mut PgConnection,
    id: OrderId,
    points: i32,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.order SET points_awarded = $2 WHERE id = $1")
        .bind(id)
        .bind(points)
        .execute(conn)
        .await?;
    Ok(())
}

/// Create a successful sandbox payment.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_payment(
    conn: &mut PgConnection,
    payment_no: &str,
    order_id: OrderId,
    amount: Decimal,
    method: PaymentMethod,
) -> Result<PaymentId, RepositoryError> {
    let id = sqlx::query_scalar::<_, PaymentId>(
        r"
        INSERT INTO shop.payment
            (payment_no, order_id, amount, method, status, transaction_id, paid_at)
        VALUES ($1, $2, $3, $4, $5, $1, NOW())
        RETURNING id
        ",
    )
    .bind(payment_no)
    .bind(order_id)
    .bind(amount)
    .bind(method)
    .bind(PaymentStatus::Success)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Mark an order's successful payments refunded.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn refund_payments(conn: &mut PgConnection, order_id: OrderId) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.payment SET status = 'refunded' WHERE order_id = $1 AND status = 'success'",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
