//! Post repository: community topics, posts, and likes.

use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use freshmilk_core::{PostId, TopicId, UserId};

use super::{Page, Paginated, RepositoryError};
use crate::models::community::{CreatePost, Post, PostFilter, Topic, TopicInput};

const POST_SELECT: &str = r"
    SELECT po.*, u.username, u.avatar AS user_avatar, t.name AS topic_name
    FROM shop.post po
    JOIN shop.user u ON u.id = po.user_id
    LEFT JOIN shop.topic t ON t.id = po.topic_id
";

const POST_FILTER: &str = r"
    WHERE ($1::shop.post_tab IS NULL OR po.tab = $1)
      AND ($2::integer IS NULL OR po.topic_id = $2)
      AND ($3::integer IS NULL OR po.user_id = $3)
      AND ($4::boolean IS NULL OR po.is_approved = $4)
";

/// Repository for the community board.
pub struct PostRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Topics
    // =========================================================================

    /// Topics by sort order. `active_only` hides disabled ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_topics(&self, active_only: bool) -> Result<Vec<Topic>, RepositoryError> {
        let rows = sqlx::query_as::<_, Topic>(
            "SELECT * FROM shop.topic WHERE is_active OR NOT $1 ORDER BY sort_order, id",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_topic(&self, id: TopicId) -> Result<Topic, RepositoryError> {
        sqlx::query_as::<_, Topic>("SELECT * FROM shop.topic WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_topic(&self, input: &TopicInput) -> Result<Topic, RepositoryError> {
        sqlx::query_as::<_, Topic>(
            r"
            INSERT INTO shop.topic (name, image, description, is_active, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(&input.name)
        .bind(&input.image)
        .bind(&input.description)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "话题名称已存在"))
    }

    /// Replace a topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update_topic(&self, id: TopicId, input: &TopicInput) -> Result<Topic, RepositoryError> {
        sqlx::query_as::<_, Topic>(
            r"
            UPDATE shop.topic
            SET name = $2, image = $3, description = $4, is_active = $5, sort_order = $6
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.image)
        .bind(&input.description)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "话题名称已存在"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a topic. Its posts stay, without a topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_topic(&self, id: TopicId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shop.post SET topic_id = NULL WHERE topic_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.topic WHERE id = $1")
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
    // Posts
    // =========================================================================

    /// Filtered, paginated posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &PostFilter, page: Page) -> Result<Paginated<Post>, RepositoryError> {
        let count_sql = format!("SELECT COUNT(*) FROM shop.post po {POST_FILTER}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.tab)
            .bind(filter.topic_id)
            .bind(filter.user_id)
            .bind(filter.is_approved)
            .fetch_one(self.pool)
            .await?;

        let list_sql = format!(
            "{POST_SELECT} {POST_FILTER} ORDER BY po.created_at DESC, po.id DESC LIMIT $5 OFFSET $6"
        );
        let results = sqlx::query_as::<_, Post>(&list_sql)
            .bind(filter.tab)
            .bind(filter.topic_id)
            .bind(filter.user_id)
            .bind(filter.is_approved)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Get a post. `approved_only` hides posts awaiting moderation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no matching post exists.
    pub async fn get(&self, id: PostId, approved_only: bool) -> Result<Post, RepositoryError> {
        let sql = format!("{POST_SELECT} WHERE po.id = $1 AND (po.is_approved OR NOT $2)");
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(approved_only)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Publish a post.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, input))]
    pub async fn create(&self, user_id: UserId, input: &CreatePost) -> Result<Post, RepositoryError> {
        let id = sqlx::query_scalar::<_, PostId>(
            r"
            INSERT INTO shop.post (user_id, topic_id, tab, content, image, images)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(input.topic_id)
        .bind(input.tab)
        .bind(&input.content)
        .bind(&input.image)
        .bind(Json(&input.images))
        .fetch_one(self.pool)
        .await?;
        self.get(id, false).await
    }

    /// Like a post. Liking twice changes nothing. Returns the like count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn like(&self, user_id: UserId, id: PostId) -> Result<i32, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let likes: i32 = sqlx::query_scalar("SELECT likes FROM shop.post WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let added = sqlx::query(
            r"
            INSERT INTO shop.post_like (user_id, post_id) VALUES ($1, $2)
            ON CONFLICT (user_id, post_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if added == 0 {
            return Ok(likes);
        }
        let likes: i32 =
            sqlx::query_scalar("UPDATE shop.post SET likes = likes + 1 WHERE id = $1 RETURNING likes")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(likes)
    }

    /// Take a like back. The count never drops below zero.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn unlike(&self, user_id: UserId, id: PostId) -> Result<i32, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let likes: i32 = sqlx::query_scalar("SELECT likes FROM shop.post WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let removed = sqlx::query("DELETE FROM shop.post_like WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Ok(likes);
        }
        let likes: i32 = sqlx::query_scalar(
            "UPDATE shop.post SET likes = GREATEST(0, likes - 1) WHERE id = $1 RETURNING likes",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(likes)
    }

    /// Set the moderation flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn set_approved(&self, id: PostId, approved: bool) -> Result<Post, RepositoryError> {
        let result = sqlx::query("UPDATE shop.post SET is_approved = $2 WHERE id = $1")
            .bind(id)
            .bind(approved)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(id, false).await
    }

    /// Delete a post and its likes. `owner` restricts to the author.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no matching post exists.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: PostId, owner: Option<UserId>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let found: Option<PostId> = sqlx::query_scalar(
            "SELECT id FROM shop.post WHERE id = $1 AND ($2::integer IS NULL OR user_id = $2) FOR UPDATE",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;
        if found.is_none() {
            return Err(RepositoryError::NotFound);
        }
        sqlx::query("DELETE FROM shop.post_like WHERE post_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM shop.post WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
