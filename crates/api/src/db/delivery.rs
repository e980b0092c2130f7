//! Delivery repository: couriers, delivery records, and routes.

use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{
    DeliveryPersonId, DeliveryPersonStatus, DeliveryRecordId, DeliveryRouteId, DeliveryStatus,
    OrderStatus,
};

use super::{Page, Paginated, RepositoryError};
use crate::models::delivery::{
    CreateDeliveryRecord, CreateDeliveryRoute, DeliveryPerson, DeliveryPersonInput,
    DeliveryPersonStats, DeliveryRecord, DeliveryRecordFilter, DeliveryRoute,
    DeliveryRouteDetail, DeliveryRouteFilter,
};

const RECORD_SELECT: &str = r"
    SELECT r.*, o.order_no, dp.name AS delivery_person_name
    FROM shop.delivery_record r
    JOIN shop.order o ON o.id = r.order_id
    JOIN shop.delivery_person dp ON dp.id = r.delivery_person_id
";

const ROUTE_SELECT: &str = r"
    SELECT rt.id, rt.delivery_person_id, dp.name AS delivery_person_name, rt.date,
           rt.total_orders, rt.created_at,
           (SELECT COUNT(*) FROM shop.delivery_route_record rr
            JOIN shop.delivery_record r ON r.id = rr.record_id
            WHERE rr.route_id = rt.id AND r.status = 'delivered') AS completed_orders
    FROM shop.delivery_route rt
    JOIN shop.delivery_person dp ON dp.id = rt.delivery_person_id
";

/// Repository for the courier fleet.
pub struct DeliveryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeliveryRepository<'a> {
    /// Create a new delivery repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Couriers
    // =========================================================================

    /// Active couriers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_persons(&self) -> Result<Vec<DeliveryPerson>, RepositoryError> {
        let rows = sqlx::query_as::<_, DeliveryPerson>(
            "SELECT * FROM shop.delivery_person WHERE is_active ORDER BY employee_no",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_person(&self, id: DeliveryPersonId) -> Result<DeliveryPerson, RepositoryError> {
        sqlx::query_as::<_, DeliveryPerson>("SELECT * FROM shop.delivery_person WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the employee number or user link is taken.
    pub async fn create_person(
        &self,
        input: &DeliveryPersonInput,
    ) -> Result<DeliveryPerson, RepositoryError> {
        sqlx::query_as::<_, DeliveryPerson>(
            r"
            INSERT INTO shop.delivery_person
                (user_id, employee_no, name, phone, id_card, vehicle_type, delivery_area, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(input.user_id)
        .bind(&input.employee_no)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.id_card)
        .bind(&input.vehicle_type)
        .bind(&input.delivery_area)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "工号或关联用户已存在"))
    }

    /// Replace a courier's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update_person(
        &self,
        id: DeliveryPersonId,
        input: &DeliveryPersonInput,
    ) -> Result<DeliveryPerson, RepositoryError> {
        sqlx::query_as::<_, DeliveryPerson>(
            r"
            UPDATE shop.delivery_person SET
                user_id = $2, employee_no = $3, name = $4, phone = $5, id_card = $6,
                vehicle_type = $7, delivery_area = $8, is_active = $9
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(input.user_id)
        .bind(&input.employee_no)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.id_card)
        .bind(&input.vehicle_type)
        .bind(&input.delivery_area)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "工号或关联用户已存在"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a courier who has no delivery history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if records reference the courier.
    pub async fn delete_person(&self, id: DeliveryPersonId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let used: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM shop.delivery_record WHERE delivery_person_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if used {
            return Err(RepositoryError::Conflict(
                "该配送员已有配送记录，请改为停用".to_owned(),
            ));
        }
        sqlx::query("DELETE FROM shop.delivery_route WHERE delivery_person_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.delivery_person WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    /// Set a courier's availability.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn set_person_status(
        &self,
        id: DeliveryPersonId,
        status: DeliveryPersonStatus,
    ) -> Result<DeliveryPerson, RepositoryError> {
        sqlx::query_as::<_, DeliveryPerson>(
            "UPDATE shop.delivery_person SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Lifetime and today's workload of a courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn person_stats(
        &self,
        id: DeliveryPersonId,
    ) -> Result<DeliveryPersonStats, RepositoryError> {
        let person = self.get_person(id).await?;
        let (today_total, today_completed): (i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'delivered')
            FROM shop.delivery_record
            WHERE delivery_person_id = $1 AND assigned_at::date = CURRENT_DATE
            ",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        Ok(DeliveryPersonStats {
            total_deliveries: person.total_deliveries,
            rating: person.rating,
            today_total,
            today_completed,
        })
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Filtered, paginated delivery records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_records(
        &self,
        filter: &DeliveryRecordFilter,
        page: Page,
    ) -> Result<Paginated<DeliveryRecord>, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.delivery_record
            WHERE ($1::shop.delivery_status IS NULL OR status = $1)
              AND ($2::integer IS NULL OR delivery_person_id = $2)
            ",
        )
        .bind(filter.status)
        .bind(filter.delivery_person)
        .fetch_one(self.pool)
        .await?;

        let sql = format!(
            r"{RECORD_SELECT}
            WHERE ($1::shop.delivery_status IS NULL OR r.status = $1)
              AND ($2::integer IS NULL OR r.delivery_person_id = $2)
            ORDER BY r.assigned_at DESC, r.id DESC
            LIMIT $3 OFFSET $4"
        );
        let results = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(filter.status)
            .bind(filter.delivery_person)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a delivery record, optionally scoped to one courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist or belongs to another courier.
    pub async fn get_record(
        &self,
        id: DeliveryRecordId,
        courier: Option<DeliveryPersonId>,
    ) -> Result<DeliveryRecord, RepositoryError> {
        let sql = format!(
            "{RECORD_SELECT} WHERE r.id = $1 AND ($2::integer IS NULL OR r.delivery_person_id = $2)"
        );
        sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(id)
            .bind(courier)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Assign a paid or shipped order to a courier, copying the receiver.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order or courier does not exist.
    /// Returns `RepositoryError::Conflict` if the order is not paid or shipped.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create_record(
        &self,
        input: &CreateDeliveryRecord,
    ) -> Result<DeliveryRecord, RepositoryError> {
        self.get_person(input.delivery_person_id).await?;

        let status: OrderStatus = sqlx::query_scalar("SELECT status FROM shop.order WHERE id = $1")
            .bind(input.order_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !matches!(status, OrderStatus::Paid | OrderStatus::Shipped) {
            return Err(RepositoryError::Conflict(
                "只有已支付或已发货的订单可以分配配送".to_owned(),
            ));
        }

        let id = sqlx::query_scalar::<_, DeliveryRecordId>(
            r"
            INSERT INTO shop.delivery_record
                (order_id, delivery_person_id, receiver_name, receiver_phone, receiver_address,
                 remark, customer_remark)
            SELECT o.id, $2, o.receiver_name, o.receiver_phone, o.receiver_address, $3, o.remark
            FROM shop.order o WHERE o.id = $1
            RETURNING id
            ",
        )
        .bind(input.order_id)
        .bind(input.delivery_person_id)
        .bind(&input.remark)
        .fetch_one(self.pool)
        .await?;

        self.get_record(id, None).await
    }

    /// Change a record's status.
    ///
    /// `picked` stamps `picked_at`. `delivered` stamps `delivered_at`, moves
    /// a shipped order to delivered, and counts the delivery for the courier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record does not exist or
    /// belongs to another courier.
    #[instrument(skip(self))]
    pub async fn set_record_status(
        &self,
        id: DeliveryRecordId,
        status: DeliveryStatus,
        courier: Option<DeliveryPersonId>,
    ) -> Result<DeliveryRecord, RepositoryError> {
        let record = self.get_record(id, courier).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE shop.delivery_record SET
                status = $2,
                picked_at = CASE WHEN $2 = 'picked'::shop.delivery_status THEN NOW() ELSE picked_at END,
                delivered_at = CASE WHEN $2 = 'delivered'::shop.delivery_status THEN NOW() ELSE delivered_at END
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        if status == DeliveryStatus::Delivered && record.status != DeliveryStatus::Delivered {
            sqlx::query(
                r"
                UPDATE shop.order SET status = 'delivered', delivered_at = NOW()
                WHERE id = $1 AND status = 'shipped'
                ",
            )
            .bind(record.order_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE shop.delivery_person SET total_deliveries = total_deliveries + 1 WHERE id = $1",
            )
            .bind(record.delivery_person_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_record(id, None).await
    }

    // =========================================================================
    // Routes
    // =========================================================================

    /// Filtered routes, newest date first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_routes(
        &self,
        filter: &DeliveryRouteFilter,
    ) -> Result<Vec<DeliveryRoute>, RepositoryError> {
        let sql = format!(
            r"{ROUTE_SELECT}
            WHERE ($1::date IS NULL OR rt.date = $1)
              AND ($2::integer IS NULL OR rt.delivery_person_id = $2)
            ORDER BY rt.date DESC, rt.id DESC"
        );
        let rows = sqlx::query_as::<_, DeliveryRoute>(&sql)
            .bind(filter.date)
            .bind(filter.delivery_person)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Get a route with its records.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_route(&self, id: DeliveryRouteId) -> Result<DeliveryRouteDetail, RepositoryError> {
        let sql = format!("{ROUTE_SELECT} WHERE rt.id = $1");
        let route = sqlx::query_as::<_, DeliveryRoute>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let sql = format!(
            r"{RECORD_SELECT}
            JOIN shop.delivery_route_record rr ON rr.record_id = r.id
            WHERE rr.route_id = $1
            ORDER BY r.id"
        );
        let records = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(id)
            .fetch_all(self.pool)
            .await?;

        Ok(DeliveryRouteDetail { route, records })
    }

    /// Create a route for a courier and day.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the courier already has a route that day.
    pub async fn create_route(
        &self,
        input: &CreateDeliveryRoute,
    ) -> Result<DeliveryRouteDetail, RepositoryError> {
        let ids: Vec<i32> = input.record_ids.iter().map(DeliveryRecordId::as_i32).collect();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, DeliveryRouteId>(
            r"
            INSERT INTO shop.delivery_route (delivery_person_id, date, total_orders)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(input.delivery_person_id)
        .bind(input.date)
        .bind(i32::try_from(ids.len()).unwrap_or(i32::MAX))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique(e, "该配送员当天已有路线"))?;

        let linked = sqlx::query(
            r"
            INSERT INTO shop.delivery_route_record (route_id, record_id)
            SELECT $1, id FROM shop.delivery_record WHERE id = ANY($2)
            ",
        )
        .bind(id)
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE shop.delivery_route SET total_orders = $2 WHERE id = $1")
            .bind(id)
            .bind(i32::try_from(linked.rows_affected()).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.get_route(id).await
    }

    /// Delete a route and its record links.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_route(&self, id: DeliveryRouteId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shop.delivery_route_record WHERE route_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.delivery_route WHERE id = $1")
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
