//! Express repository: courier companies, shipments, and tracking events.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use freshmilk_core::{
    ExpressCode, ExpressCompanyId, ExpressOrderId, ExpressStatus, OrderId, UserId,
};

use super::RepositoryError;
use crate::models::express::{
    ExpressCompany, ExpressCompanyInput, ExpressCompanySummary, ExpressOrder, ExpressTrace,
};

const EXPRESS_ORDER_SELECT: &str = r"
    SELECT e.*, o.order_no, c.code AS company_code, c.name AS company_name
    FROM shop.express_order e
    JOIN shop.order o ON o.id = e.order_id
    LEFT JOIN shop.express_company c ON c.id = e.company_id
";

/// A tracking event to persist.
#[derive(Debug, Clone)]
pub struct NewTrace {
    pub time: DateTime<Utc>,
    pub status: String,
    pub description: String,
    pub location: String,
}

/// Fields of a new shipment.
#[derive(Debug, Clone)]
pub struct NewExpressOrder<'a> {
    pub order_id: OrderId,
    pub company_id: ExpressCompanyId,
    pub express_no: &'a str,
    pub receiver_name: &'a str,
    pub receiver_phone: &'a str,
    pub receiver_address: &'a str,
    pub remark: &'a str,
}

/// Repository for express data.
pub struct ExpressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ExpressRepository<'a> {
    /// Create a new express repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Companies
    // =========================================================================

    /// Active companies as customers see them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_companies(&self) -> Result<Vec<ExpressCompanySummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, ExpressCompanySummary>(
            r"
            SELECT id, code, name, is_default FROM shop.express_company
            WHERE is_active
            ORDER BY is_default DESC, sort_order, id
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every company, for the admin console.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_companies(&self) -> Result<Vec<ExpressCompany>, RepositoryError> {
        let rows = sqlx::query_as::<_, ExpressCompany>(
            "SELECT * FROM shop.express_company ORDER BY sort_order, id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a company by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_company(&self, id: ExpressCompanyId) -> Result<ExpressCompany, RepositoryError> {
        sqlx::query_as::<_, ExpressCompany>("SELECT * FROM shop.express_company WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// The active company with `code`, or the active default when `code` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_active_company(
        &self,
        code: Option<ExpressCode>,
    ) -> Result<Option<ExpressCompany>, RepositoryError> {
        let row = sqlx::query_as::<_, ExpressCompany>(
            r"
            SELECT * FROM shop.express_company
            WHERE is_active AND (code = $1 OR ($1::shop.express_code IS NULL AND is_default))
            LIMIT 1
            ",
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Create a company. Making it the default clears the previous one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_company(
        &self,
        input: &ExpressCompanyInput,
    ) -> Result<ExpressCompany, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if input.is_default {
            clear_default(&mut tx).await?;
        }
        let company = sqlx::query_as::<_, ExpressCompany>(
            r"
            INSERT INTO shop.express_company
                (code, name, app_id, app_key, app_secret, customer_code, api_url, is_active,
                 is_default, sender_name, sender_phone, sender_province, sender_city,
                 sender_district, sender_address, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            ",
        )
        .bind(input.code)
        .bind(input.name.as_deref().unwrap_or_else(|| input.code.display_name()))
        .bind(&input.app_id)
        .bind(&input.app_key)
        .bind(&input.app_secret)
        .bind(&input.customer_code)
        .bind(&input.api_url)
        .bind(input.is_active)
        .bind(input.is_default)
        .bind(&input.sender_name)
        .bind(&input.sender_phone)
        .bind(&input.sender_province)
        .bind(&input.sender_city)
        .bind(&input.sender_district)
        .bind(&input.sender_address)
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique(e, "该快递公司已存在"))?;
        tx.commit().await?;
        Ok(company)
    }

    /// Replace a company. An empty `app_secret` keeps the stored one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    #[instrument(skip(self, input))]
    pub async fn update_company(
        &self,
        id: ExpressCompanyId,
        input: &ExpressCompanyInput,
    ) -> Result<ExpressCompany, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if input.is_default {
            clear_default(&mut tx).await?;
        }
        let company = sqlx::query_as::<_, ExpressCompany>(
            r"
            UPDATE shop.express_company SET
                code = $2, name = $3, app_id = $4, app_key = $5,
                app_secret = CASE WHEN $6 = '' THEN app_secret ELSE $6 END,
                customer_code = $7, api_url = $8, is_active = $9, is_default = $10,
                sender_name = $11, sender_phone = $12, sender_province = $13,
                sender_city = $14, sender_district = $15, sender_address = $16,
                sort_order = $17
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(input.code)
        .bind(input.name.as_deref().unwrap_or_else(|| input.code.display_name()))
        .bind(&input.app_id)
        .bind(&input.app_key)
        .bind(&input.app_secret)
        .bind(&input.customer_code)
        .bind(&input.api_url)
        .bind(input.is_active)
        .bind(input.is_default)
        .bind(&input.sender_name)
        .bind(&input.sender_phone)
        .bind(&input.sender_province)
        .bind(&input.sender_city)
        .bind(&input.sender_district)
        .bind(&input.sender_address)
        .bind(input.sort_order)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique(e, "该快递公司已存在"))?
        .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;
        Ok(company)
    }

    /// Delete a company. Shipments keep their number and lose the link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_company(&self, id: ExpressCompanyId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shop.express_order SET company_id = NULL WHERE company_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.express_company WHERE id = $1")
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
    // Shipments
    // =========================================================================

    /// Shipments of a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ExpressOrder>, RepositoryError> {
        let sql = format!("{EXPRESS_ORDER_SELECT} WHERE o.user_id = $1 ORDER BY e.created_at DESC, e.id DESC");
        let rows = sqlx::query_as::<_, ExpressOrder>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Get a shipment, optionally scoped to the order's owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist or belongs to someone else.
    pub async fn get_order(
        &self,
        id: ExpressOrderId,
        owner: Option<UserId>,
    ) -> Result<ExpressOrder, RepositoryError> {
        let sql = format!(
            "{EXPRESS_ORDER_SELECT} WHERE e.id = $1 AND ($2::integer IS NULL OR o.user_id = $2)"
        );
        sqlx::query_as::<_, ExpressOrder>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Latest shipment of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ExpressOrder>, RepositoryError> {
        let sql = format!(
            "{EXPRESS_ORDER_SELECT} WHERE e.order_id = $1 ORDER BY e.created_at DESC, e.id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ExpressOrder>(&sql)
            .bind(order_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Latest shipment carrying a tracking number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_express_no(
        &self,
        express_no: &str,
    ) -> Result<Option<ExpressOrder>, RepositoryError> {
        let sql = format!(
            "{EXPRESS_ORDER_SELECT} WHERE e.express_no = $1 ORDER BY e.created_at DESC, e.id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ExpressOrder>(&sql)
            .bind(express_no)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Update a shipment's status, stamping `collected_at` / `signed_at` on first reach.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn set_status(
        &self,
        express_order: &ExpressOrder,
        status: ExpressStatus,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r"
            UPDATE shop.express_order SET
                status = $2,
                collected_at = CASE WHEN $2 = 'collected'::shop.express_status
                                    THEN COALESCE(collected_at, NOW()) ELSE collected_at END,
                signed_at = CASE WHEN $2 = 'signed'::shop.express_status
                                 THEN COALESCE(signed_at, NOW()) ELSE signed_at END
            WHERE id = $1
            ",
        )
        .bind(express_order.id)
        .bind(status)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE shop.order SET express_status = $2 WHERE id = $1")
            .bind(express_order.order_id)
            .bind(status)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store a booked pickup.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_pickup(
        &self,
        id: ExpressOrderId,
        pickup_time: Option<&str>,
        pickup_code: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.express_order SET pickup_time = $2, pickup_code = $3 WHERE id = $1")
            .bind(id)
            .bind(pickup_time)
            .bind(pickup_code)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Traces
    // =========================================================================

    /// Tracking events of a shipment, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn traces(&self, id: ExpressOrderId) -> Result<Vec<ExpressTrace>, RepositoryError> {
        let rows = sqlx::query_as::<_, ExpressTrace>(
            r"
            SELECT id, express_order_id, trace_time, status, description, location
            FROM shop.express_trace
            WHERE express_order_id = $1
            ORDER BY trace_time DESC, id DESC
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Store tracking events that are not stored yet. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if an insert fails.
    pub async fn add_traces(
        &self,
        id: ExpressOrderId,
        traces: &[NewTrace],
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for trace in traces {
            let result = sqlx::query(
                r"
                INSERT INTO shop.express_trace
                    (express_order_id, trace_time, status, description, location)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (express_order_id, trace_time) DO NOTHING
                ",
            )
            .bind(id)
            .bind(trace.time)
            .bind(&trace.status)
            .bind(&trace.description)
            .bind(&trace.location)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }
}

async fn clear_default(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.express_company SET is_default = FALSE WHERE is_default")
        .execute(conn)
        .await?;
    Ok(())
}

// =============================================================================
// Transactional helpers
// =============================================================================

/// Insert a shipment in `created` status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order(
    conn: &mut PgConnection,
    new: &NewExpressOrder<'_>,
) -> Result<ExpressOrderId, RepositoryError> {
    let id = sqlx::query_scalar::<_, ExpressOrderId>(
        r"
        INSERT INTO shop.express_order
            (order_id, company_id, express_no, receiver_name, receiver_phone,
             receiver_address, remark)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        ",
    )
    .bind(new.order_id)
    .bind(new.company_id)
    .bind(new.express_no)
    .bind(new.receiver_name)
    .bind(new.receiver_phone)
    .bind(new.receiver_address)
    .bind(new.remark)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Cancel a shipment and clear its pickup.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn cancel_order(conn: &mut PgConnection, id: ExpressOrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.express_order
        SET status = 'cancelled', pickup_time = NULL, pickup_code = ''
        WHERE id = $1
        ",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Put a shipped order back to paid and clear its express fields.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn unship_order(conn: &mut PgConnection, order_id: OrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.order SET
            express_company = '', express_no = '', express_status = NULL,
            status = CASE WHEN status = 'shipped' THEN 'paid'::shop.order_status ELSE status END,
            shipped_at = CASE WHEN status = 'shipped' THEN NULL ELSE shipped_at END
        WHERE id = $1
        ",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}
