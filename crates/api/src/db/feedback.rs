//! Feedback repository.

use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use freshmilk_core::{FeedbackId, FeedbackStatus, UserId};

use super::{Page, Paginated, RepositoryError};
use crate::models::feedback::{CreateFeedback, Feedback, FeedbackFilter};

const FEEDBACK_SELECT: &str = r"
    SELECT f.*, u.username
    FROM shop.feedback f
    JOIN shop.user u ON u.id = f.user_id
";

const FEEDBACK_FILTER: &str = r"
    WHERE ($1::shop.feedback_status IS NULL OR f.status = $1)
      AND ($2::shop.feedback_type IS NULL OR f.feedback_type = $2)
      AND ($3::integer IS NULL OR f.user_id = $3)
";

/// Repository for feedback tickets.
pub struct FeedbackRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FeedbackRepository<'a> {
    /// Create a new feedback repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, paginated tickets, newest first. `author` limits to one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &FeedbackFilter,
        author: Option<UserId>,
        page: Page,
    ) -> Result<Paginated<Feedback>, RepositoryError> {
        let count_sql = format!("SELECT COUNT(*) FROM shop.feedback f {FEEDBACK_FILTER}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.status)
            .bind(filter.feedback_type)
            .bind(author)
            .fetch_one(self.pool)
            .await?;

        let list_sql = format!(
            "{FEEDBACK_SELECT} {FEEDBACK_FILTER} ORDER BY f.created_at DESC, f.id DESC LIMIT $4 OFFSET $5"
        );
        let results = sqlx::query_as::<_, Feedback>(&list_sql)
            .bind(filter.status)
            .bind(filter.feedback_type)
            .bind(author)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a ticket, optionally scoped to its author.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no matching ticket exists.
    pub async fn get(&self, id: FeedbackId, owner: Option<UserId>) -> Result<Feedback, RepositoryError> {
        let sql = format!(
            "{FEEDBACK_SELECT} WHERE f.id = $1 AND ($2::integer IS NULL OR f.user_id = $2)"
        );
        sqlx::query_as::<_, Feedback>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Open a ticket.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, input))]
    pub async fn create(&self, user_id: UserId, input: &CreateFeedback) -> Result<Feedback, RepositoryError> {
        let id = sqlx::query_scalar::<_, FeedbackId>(
            r"
            INSERT INTO shop.feedback (user_id, feedback_type, title, content, images, contact)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(input.feedback_type)
        .bind(input.title.trim())
        .bind(input.content.trim())
        .bind(Json(&input.images))
        .bind(&input.contact)
        .fetch_one(self.pool)
        .await?;
        self.get(id, None).await
    }

    /// Store a reply and resolve the ticket.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket does not exist.
    pub async fn reply(
        &self,
        id: FeedbackId,
        admin_id: UserId,
        reply: &str,
    ) -> Result<Feedback, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.feedback
            SET reply = $2, replied_by = $3, replied_at = NOW(), status = 'resolved'
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(reply)
        .bind(admin_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id, None).await
    }

    /// Set the status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket does not exist.
    pub async fn set_status(&self, id: FeedbackId, status: FeedbackStatus) -> Result<Feedback, RepositoryError> {
        let result = sqlx::query("UPDATE shop.feedback SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id, None).await
    }
}
