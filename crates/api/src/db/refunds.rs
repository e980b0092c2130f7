//! Refund request repository.

use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use freshmilk_core::{OrderId, OrderStatus, RefundId, RefundReason, RefundStatus, RefundType, UserId};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::order::{RefundFilter, RefundRequest};

const REFUND_SELECT: &str = r"
    SELECT r.*, o.order_no
    FROM shop.refund_request r
    JOIN shop.order o ON o.id = r.order_id
";

/// Fields of a new refund request.
#[derive(Debug, Clone)]
pub struct NewRefund<'a> {
    pub refund_no: &'a str,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    pub description: &'a str,
    pub amount: Decimal,
    pub images: &'a [String],
    pub order_status_before: OrderStatus,
}

/// Repository for refund requests.
pub struct RefundRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RefundRepository<'a> {
    /// Create a new refund repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's refund requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Paginated<RefundRequest>, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shop.refund_request WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        let sql = format!(
            "{REFUND_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at DESC, r.id DESC LIMIT $2 OFFSET $3"
        );
        let results = sqlx::query_as::<_, RefundRequest>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Filtered refund requests for the admin console.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &RefundFilter,
        page: Page,
    ) -> Result<Paginated<RefundRequest>, RepositoryError> {
        let order_no = filter.order_no.as_deref().map(contains_pattern);
        let conditions = r"
            WHERE ($1::shop.refund_status IS NULL OR r.status = $1)
              AND ($2::shop.refund_type IS NULL OR r.refund_type = $2)
              AND ($3::text IS NULL OR o.order_no ILIKE $3)
        ";

        let count_sql = format!(
            "SELECT COUNT(*) FROM shop.refund_request r JOIN shop.order o ON o.id = r.order_id {conditions}"
        );
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.status)
            .bind(filter.refund_type)
            .bind(&order_no)
            .fetch_one(self.pool)
            .await?;

        let sql = format!(
            "{REFUND_SELECT} {conditions} ORDER BY r.created_at DESC, r.id DESC LIMIT $4 OFFSET $5"
        );
        let results = sqlx::query_as::<_, RefundRequest>(&sql)
            .bind(filter.status)
            .bind(filter.refund_type)
            .bind(&order_no)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a refund request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get(&self, id: RefundId) -> Result<RefundRequest, RepositoryError> {
        let sql = format!("{REFUND_SELECT} WHERE r.id = $1");
        sqlx::query_as::<_, RefundRequest>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get one of the user's refund requests.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not belong to the user.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: RefundId,
    ) -> Result<RefundRequest, RepositoryError> {
        let refund = self.get(id).await?;
        if refund.user_id != user_id {
            return Err(RepositoryError::NotFound);
        }
        Ok(refund)
    }

    /// Record the customer's return shipment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_return_express(
        &self,
        id: RefundId,
        company: &str,
        express_no: &str,
    ) -> Result<RefundRequest, RepositoryError> {
        sqlx::query(
            r"
            UPDATE shop.refund_request
            SET return_express_company = $2, return_express_no = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(company)
        .bind(express_no)
        .execute(self.pool)
        .await?;
        self.get(id).await
    }

    /// Approve a pending request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the request is not pending.
    pub async fn approve(
        &self,
        id: RefundId,
        admin_id: UserId,
        admin_remark: &str,
        return_address: &str,
    ) -> Result<RefundRequest, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.refund_request
            SET status = 'approved', admin_id = $2, admin_remark = $3,
                return_address = $4, processed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .bind(admin_id)
        .bind(admin_remark)
        .bind(return_address)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict("只能审核待处理的退款申请".to_owned()));
        }
        self.get(id).await
    }
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Lock a refund request.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist.
pub async fn lock(conn: &mut PgConnection, id: RefundId) -> Result<RefundRequest, RepositoryError> {
    let sql = format!("{REFUND_SELECT} WHERE r.id = $1 FOR UPDATE OF r");
    sqlx::query_as::<_, RefundRequest>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Whether the order already has a pending or approved request.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn has_open(conn: &mut PgConnection, order_id: OrderId) -> Result<bool, RepositoryError> {
    let exists: bool = sqlx::query_scalar(
        r"
        SELECT EXISTS(
            SELECT 1 FROM shop.refund_request
            WHERE order_id = $1 AND status IN ('pending', 'approved')
        )
        ",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Insert a refund request.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(conn: &mut PgConnection, new: &NewRefund<'_>) -> Result<RefundId, RepositoryError> {
    let id = sqlx::query_scalar::<_, RefundId>(
        r"
        INSERT INTO shop.refund_request
            (refund_no, order_id, user_id, refund_type, reason, description, amount,
             images, order_status_before)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        ",
    )
    .bind(new.refund_no)
    .bind(new.order_id)
    .bind(new.user_id)
    .bind(new.refund_type)
    .bind(new.reason)
    .bind(new.description)
    .bind(new.amount)
    .bind(Json(new.images))
    .bind(new.order_status_before)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Move a request to a closing status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn close(
    conn: &mut PgConnection,
    id: RefundId,
    status: RefundStatus,
    admin_id: Option<UserId>,
    reject_reason: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.refund_request SET
            status = $2,
            admin_id = COALESCE($3, admin_id),
            reject_reason = CASE WHEN $4 = '' THEN reject_reason ELSE $4 END,
            processed_at = CASE WHEN $2 = 'rejected'::shop.refund_status THEN NOW() ELSE processed_at END,
            completed_at = CASE WHEN $2 = 'completed'::shop.refund_status THEN NOW() ELSE completed_at END
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(status)
    .bind(admin_id)
    .bind(reject_reason)
    .execute(conn)
    .await?;
    Ok(())
}
