//! Statistics repository: read-only aggregates for the admin dashboard.
//!
//! Revenue counts orders in `paid`, `shipped`, `delivered`, or `completed`.
//! Day boundaries are UTC.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{CategoryId, OrderStatus, ProductId, UserId};

use super::RepositoryError;

/// Products with less stock than this are reported as low.
pub const LOW_STOCK_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Overview {
    pub total_users: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Today {
    pub orders: i64,
    pub revenue: Decimal,
    pub new_users: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Pending {
    pub orders_to_ship: i64,
    pub feedback: i64,
    pub low_stock_products: i64,
    pub refunds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub overview: Overview,
    pub today: Today,
    pub pending: Pending,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub orders: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategorySales {
    pub category_id: Option<CategoryId>,
    pub category_name: String,
    pub sales_amount: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesReport {
    pub days: i64,
    pub daily: Vec<DailySales>,
    pub top_categories: Vec<CategorySales>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRank {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub sales_count: i32,
    pub view_count: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub category_id: Option<CategoryId>,
    pub category_name: String,
    pub product_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductReport {
    pub top_sales: Vec<ProductRank>,
    pub top_views: Vec<ProductRank>,
    pub low_stock: Vec<ProductRank>,
    pub by_category: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyUsers {
    pub date: NaiveDate,
    pub new_users: i64,
    pub active_users: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopBuyer {
    pub user_id: UserId,
    pub username: String,
    pub order_count: i64,
    pub total_spent: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub days: i64,
    pub daily: Vec<DailyUsers>,
    pub top_buyers: Vec<TopBuyer>,
}

fn revenue_statuses() -> Vec<&'static str> {
    OrderStatus::REVENUE.iter().map(|s| s.as_str()).collect()
}

/// Repository for dashboard aggregates.
pub struct StatisticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StatisticsRepository<'a> {
    /// Create a new statistics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Headline counts for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<Dashboard, RepositoryError> {
        let statuses = revenue_statuses();

        let overview = sqlx::query_as::<_, Overview>(
            r"
            SELECT
                (SELECT COUNT(*) FROM shop.user WHERE NOT is_admin) AS total_users,
                (SELECT COUNT(*) FROM shop.product WHERE is_active) AS total_products,
                (SELECT COUNT(*) FROM shop.order) AS total_orders,
                (SELECT COALESCE(SUM(pay_amount), 0) FROM shop.order
                 WHERE status::text = ANY($1)) AS total_revenue
            ",
        )
        .bind(&statuses)
        .fetch_one(self.pool)
        .await?;

        let today = sqlx::query_as::<_, Today>(
            r"
            SELECT
                (SELECT COUNT(*) FROM shop.order
                 WHERE created_at >= date_trunc('day', NOW())) AS orders,
                (SELECT COALESCE(SUM(pay_amount), 0) FROM shop.order
                 WHERE created_at >= date_trunc('day', NOW())
                   AND status::text = ANY($1)) AS revenue,
                (SELECT COUNT(*) FROM shop.user
                 WHERE date_joined >= date_trunc('day', NOW())) AS new_users
            ",
        )
        .bind(&statuses)
        .fetch_one(self.pool)
        .await?;

        let pending = sqlx::query_as::<_, Pending>(
            r"
            SELECT
                (SELECT COUNT(*) FROM shop.order WHERE status = 'paid') AS orders_to_ship,
                (SELECT COUNT(*) FROM shop.feedback WHERE status = 'pending') AS feedback,
                (SELECT COUNT(*) FROM shop.product
                 WHERE is_active AND stock < $1) AS low_stock_products,
                (SELECT COUNT(*) FROM shop.refund_request WHERE status = 'pending') AS refunds
            ",
        )
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_one(self.pool)
        .await?;

        Ok(Dashboard {
            overview,
            today,
            pending,
        })
    }

    /// Daily revenue for the last `days` days (today included), with empty
    /// days reported as zero, plus the best-selling categories over the same span.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn sales(&self, days: i64) -> Result<SalesReport, RepositoryError> {
        let statuses = revenue_statuses();

        let daily = sqlx::query_as::<_, DailySales>(
            r"
            SELECT d::date AS date,
                   COALESCE(SUM(o.pay_amount), 0) AS revenue,
                   COUNT(o.id) AS orders
            FROM generate_series(
                     (NOW() AT TIME ZONE 'UTC')::date - ($1 - 1)::integer,
                     (NOW() AT TIME ZONE 'UTC')::date,
                     INTERVAL '1 day'
                 ) AS d
            LEFT JOIN shop.order o
                   ON (o.created_at AT TIME ZONE 'UTC')::date = d::date
                  AND o.status::text = ANY($2)
            GROUP BY d
            ORDER BY d
            ",
        )
        .bind(days)
        .bind(&statuses)
        .fetch_all(self.pool)
        .await?;

        let top_categories = sqlx::query_as::<_, CategorySales>(
            r"
            SELECT c.id AS category_id,
                   COALESCE(c.name, '未分类') AS category_name,
                   SUM(oi.total_price) AS sales_amount,
                   SUM(oi.quantity)::bigint AS quantity
            FROM shop.order_item oi
            JOIN shop.order o ON o.id = oi.order_id
            LEFT JOIN shop.product p ON p.id = oi.product_id
            LEFT JOIN shop.category c ON c.id = p.category_id
            WHERE o.status::text = ANY($2)
              AND o.created_at >= date_trunc('day', NOW()) - ($1 - 1) * INTERVAL '1 day'
            GROUP BY c.id, c.name
            ORDER BY sales_amount DESC
            LIMIT 10
            ",
        )
        .bind(days)
        .bind(&statuses)
        .fetch_all(self.pool)
        .await?;

        Ok(SalesReport {
            days,
            daily,
            top_categories,
        })
    }

    /// Product rankings and per-category counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<ProductReport, RepositoryError> {
        const RANK_SELECT: &str =
            "SELECT id, name, price, stock, sales_count, view_count FROM shop.product";

        let top_sales = sqlx::query_as::<_, ProductRank>(&format!(
            "{RANK_SELECT} ORDER BY sales_count DESC, id LIMIT 10"
        ))
        .fetch_all(self.pool)
        .await?;

        let top_views = sqlx::query_as::<_, ProductRank>(&format!(
            "{RANK_SELECT} ORDER BY view_count DESC, id LIMIT 10"
        ))
        .fetch_all(self.pool)
        .await?;

        let low_stock = sqlx::query_as::<_, ProductRank>(&format!(
            "{RANK_SELECT} WHERE is_active AND stock < $1 ORDER BY stock, id"
        ))
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_all(self.pool)
        .await?;

        let by_category = sqlx::query_as::<_, CategoryCount>(
            r"
            SELECT c.id AS category_id,
                   COALESCE(c.name, '未分类') AS category_name,
                   COUNT(p.id) AS product_count
            FROM shop.product p
            LEFT JOIN shop.category c ON c.id = p.category_id
            GROUP BY c.id, c.name
            ORDER BY product_count DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(ProductReport {
            top_sales,
            top_views,
            low_stock,
            by_category,
        })
    }

    /// Daily sign-ups and distinct logins, plus the biggest spenders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn users(&self, days: i64) -> Result<UserReport, RepositoryError> {
        let daily = sqlx::query_as::<_, DailyUsers>(
            r"
            SELECT d::date AS date,
                   (SELECT COUNT(*) FROM shop.user u
                    WHERE (u.date_joined AT TIME ZONE 'UTC')::date = d::date) AS new_users,
                   (SELECT COUNT(DISTINCT l.user_id) FROM shop.user_log l
                    WHERE l.action = 'login'
                      AND (l.created_at AT TIME ZONE 'UTC')::date = d::date) AS active_users
            FROM generate_series(
                     (NOW() AT TIME ZONE 'UTC')::date - ($1 - 1)::integer,
                     (NOW() AT TIME ZONE 'UTC')::date,
                     INTERVAL '1 day'
                 ) AS d
            ORDER BY d
            ",
        )
        .bind(days)
        .fetch_all(self.pool)
        .await?;

        let top_buyers = sqlx::query_as::<_, TopBuyer>(
            r"
            SELECT u.id AS user_id, u.username,
                   COUNT(o.id) AS order_count,
                   SUM(o.pay_amount) AS total_spent
            FROM shop.order o
            JOIN shop.user u ON u.id = o.user_id
            WHERE o.status::text = ANY($1)
            GROUP BY u.id, u.username
            ORDER BY total_spent DESC
            LIMIT 10
            ",
        )
        .bind(revenue_statuses())
        .fetch_all(self.pool)
        .await?;

        Ok(UserReport {
            days,
            daily,
            top_buyers,
        })
    }
}
