//! Points ledger.
//!
//! Every balance change goes through [`apply`], which locks the user row,
//! clamps the balance at zero, and appends a `points_record` in the caller's
//! transaction.

use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use freshmilk_core::UserId;

use super::{Page, Paginated, RepositoryError};
use crate::models::user::{PointsChange, PointsRecord};

/// Apply a points change and record it.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
/// Returns `RepositoryError::Database` if a query fails.
#[instrument(skip(conn, change), fields(user_id = %change.user_id, points = change.points))]
pub async fn apply(
    conn: &mut PgConnection,
    change: &PointsChange,
) -> Result<PointsRecord, RepositoryError> {
    let current: i32 =
        sqlx::query_scalar("SELECT points FROM shop.user WHERE id = $1 FOR UPDATE")
            .bind(change.user_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(RepositoryError::NotFound)?;

    let balance = current.saturating_add(change.points).max(0);

    sqlx::query("UPDATE shop.user SET points = $2 WHERE id = $1")
        .bind(change.user_id)
        .bind(balance)
        .execute(&mut *conn)
        .await?;

    let record = sqlx::query_as::<_, PointsRecord>(
        r"
        INSERT INTO shop.points_record
            (user_id, record_type, source, points, balance, order_id, subscription_id, remark)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        ",
    )
    .bind(change.user_id)
    .bind(change.record_type)
    .bind(change.source)
    .bind(change.points)
    .bind(balance)
    .bind(change.order_id)
    .bind(change.subscription_id)
    .bind(&change.remark)
    .fetch_one(&mut *conn)
    .await?;

    Ok(record)
}

/// Lock a user row and return the current balance.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the user does not exist.
pub async fn lock_balance(conn: &mut PgConnection, user_id: UserId) -> Result<i32, RepositoryError> {
    sqlx::query_scalar("SELECT points FROM shop.user WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// A user's ledger, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: UserId,
    page: Page,
) -> Result<Paginated<PointsRecord>, RepositoryError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.points_record WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let results = sqlx::query_as::<_, PointsRecord>(
        r"
        SELECT * FROM shop.points_record
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        ",
    )
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(Paginated { count, results })
}
