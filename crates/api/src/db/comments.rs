//! Comment repository: product reviews and their likes.

use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use freshmilk_core::{CommentId, UserId};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::community::{Comment, CommentFilter, CreateComment};

const COMMENT_SELECT: &str = r"
    SELECT cm.*, u.username, u.avatar AS user_avatar, p.name AS product_name
    FROM shop.comment cm
    JOIN shop.user u ON u.id = cm.user_id
    JOIN shop.product p ON p.id = cm.product_id
";

const COMMENT_FILTER: &str = r"
    WHERE ($1::integer IS NULL OR cm.product_id = $1)
      AND ($2::boolean IS NULL OR cm.is_approved = $2)
      AND ($3::smallint IS NULL OR cm.rating = $3)
      AND ($4::smallint IS NULL OR cm.rating >= $4)
      AND ($5::smallint IS NULL OR cm.rating <= $5)
      AND ($6::boolean IS NULL OR (cm.reply <> '') = $6)
      AND ($7::boolean IS NULL OR (jsonb_array_length(cm.images) > 0) = $7)
      AND ($8::text IS NULL OR cm.content ILIKE $8 OR u.username ILIKE $8)
      AND ($9::integer IS NULL OR cm.user_id = $9)
";

/// Result of toggling a like.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i32,
}

/// Repository for product reviews.
pub struct CommentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CommentRepository<'a> {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, paginated reviews, newest first. `author` limits to one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &CommentFilter,
        author: Option<UserId>,
        page: Page,
    ) -> Result<Paginated<Comment>, RepositoryError> {
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(contains_pattern);

        let count_sql = format!(
            "SELECT COUNT(*) FROM shop.comment cm JOIN shop.user u ON u.id = cm.user_id {COMMENT_FILTER}"
        );
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.product_id)
            .bind(filter.is_approved)
            .bind(filter.rating)
            .bind(filter.rating_min)
            .bind(filter.rating_max)
            .bind(filter.has_reply)
            .bind(filter.has_images)
            .bind(&search)
            .bind(author)
            .fetch_one(self.pool)
            .await?;

        let list_sql = format!(
            "{COMMENT_SELECT} {COMMENT_FILTER} ORDER BY cm.created_at DESC, cm.id DESC LIMIT $10 OFFSET $11"
        );
        let results = sqlx::query_as::<_, Comment>(&list_sql)
            .bind(filter.product_id)
            .bind(filter.is_approved)
            .bind(filter.rating)
            .bind(filter.rating_min)
            .bind(filter.rating_max)
            .bind(filter.has_reply)
            .bind(filter.has_images)
            .bind(&search)
            .bind(author)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get(&self, id: CommentId) -> Result<Comment, RepositoryError> {
        let sql = format!("{COMMENT_SELECT} WHERE cm.id = $1");
        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Store a review. Ownership and order checks are the caller's.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn create(
        &self,
        user_id: UserId,
        input: &CreateComment,
    ) -> Result<Comment, RepositoryError> {
        let id = sqlx::query_scalar::<_, CommentId>(
            r"
            INSERT INTO shop.comment
                (user_id, product_id, order_id, rating, content, images, is_anonymous)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(input.product_id)
        .bind(input.order_id)
        .bind(input.rating)
        .bind(&input.content)
        .bind(Json(&input.images))
        .bind(input.is_anonymous)
        .fetch_one(self.pool)
        .await?;
        self.get(id).await
    }

    /// Like a review, or take the like back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self))]
    pub async fn toggle_like(
        &self,
        user_id: UserId,
        id: CommentId,
    ) -> Result<LikeState, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT likes FROM shop.comment WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let removed = sqlx::query("DELETE FROM shop.comment_like WHERE user_id = $1 AND comment_id = $2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let liked = removed == 0;
        if liked {
            sqlx::query("INSERT INTO shop.comment_like (user_id, comment_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let likes: i32 = sqlx::query_scalar(
            r"
            UPDATE shop.comment
            SET likes = GREATEST(0, likes + CASE WHEN $2 THEN 1 ELSE -1 END)
            WHERE id = $1
            RETURNING likes
            ",
        )
        .bind(id)
        .bind(liked)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LikeState { liked, likes })
    }

    /// Set the moderation flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    pub async fn set_approved(&self, id: CommentId, approved: bool) -> Result<Comment, RepositoryError> {
        let result = sqlx::query("UPDATE shop.comment SET is_approved = $2 WHERE id = $1")
            .bind(id)
            .bind(approved)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id).await
    }

    /// Store the shop's reply.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    pub async fn reply(&self, id: CommentId, reply: &str) -> Result<Comment, RepositoryError> {
        let result = sqlx::query("UPDATE shop.comment SET reply = $2, replied_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(reply)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id).await
    }

    /// Delete a review and its likes. `owner` restricts to the author.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no matching review exists.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: CommentId, owner: Option<UserId>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let found: Option<CommentId> = sqlx::query_scalar(
            "SELECT id FROM shop.comment WHERE id = $1 AND ($2::integer IS NULL OR user_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;
        if found.is_none() {
            return Err(RepositoryError::NotFound);
        }
        sqlx::query("DELETE FROM shop.comment_like WHERE comment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM shop.comment WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
