//! Notification repository: advertisements, announcements, and user inboxes.

use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{AdPosition, AdvertisementId, MessageId, UserId, UserMessageId};

use super::{Page, Paginated, RepositoryError};
use crate::models::notification::{
    Advertisement, AdvertisementInput, Message, MessageInput, UserMessage,
};

const USER_MESSAGE_SELECT: &str = r"
    SELECT um.id, um.user_id, um.message_id, m.title, m.content, m.message_type,
           m.image, m.link, um.is_read, um.read_at, um.created_at
    FROM shop.user_message um
    JOIN shop.message m ON m.id = um.message_id
";

/// Repository for notifications.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Advertisements
    // =========================================================================

    /// Active advertisements inside their display window. A null bound is open.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn live_advertisements(
        &self,
        position: Option<AdPosition>,
    ) -> Result<Vec<Advertisement>, RepositoryError> {
        let rows = sqlx::query_as::<_, Advertisement>(
            r"
            SELECT * FROM shop.advertisement
            WHERE is_active
              AND ($1::shop.ad_position IS NULL OR position = $1)
              AND (start_time IS NULL OR start_time <= NOW())
              AND (end_time IS NULL OR end_time >= NOW())
            ORDER BY sort_order, id
            ",
        )
        .bind(position)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every advertisement, for the admin console.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_advertisements(
        &self,
        position: Option<AdPosition>,
    ) -> Result<Vec<Advertisement>, RepositoryError> {
        let rows = sqlx::query_as::<_, Advertisement>(
            r"
            SELECT * FROM shop.advertisement
            WHERE ($1::shop.ad_position IS NULL OR position = $1)
            ORDER BY sort_order, id
            ",
        )
        .bind(position)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get an advertisement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_advertisement(&self, id: AdvertisementId) -> Result<Advertisement, RepositoryError> {
        sqlx::query_as::<_, Advertisement>("SELECT * FROM shop.advertisement WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Count a click. Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn click(&self, id: AdvertisementId) -> Result<i32, RepositoryError> {
        sqlx::query_scalar(
            "UPDATE shop.advertisement SET click_count = click_count + 1 WHERE id = $1 RETURNING click_count",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Create an advertisement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_advertisement(
        &self,
        input: &AdvertisementInput,
    ) -> Result<Advertisement, RepositoryError> {
        let row = sqlx::query_as::<_, Advertisement>(
            r"
            INSERT INTO shop.advertisement
                (title, image, link, link_type, link_id, position, sort_order,
                 start_time, end_time, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(&input.title)
        .bind(&input.image)
        .bind(&input.link)
        .bind(&input.link_type)
        .bind(input.link_id)
        .bind(input.position)
        .bind(input.sort_order)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Replace an advertisement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update_advertisement(
        &self,
        id: AdvertisementId,
        input: &AdvertisementInput,
    ) -> Result<Advertisement, RepositoryError> {
        sqlx::query_as::<_, Advertisement>(
            r"
            UPDATE shop.advertisement SET
                title = $2, image = $3, link = $4, link_type = $5, link_id = $6,
                position = $7, sort_order = $8, start_time = $9, end_time = $10,
                is_active = $11
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.image)
        .bind(&input.link)
        .bind(&input.link_type)
        .bind(input.link_id)
        .bind(input.position)
        .bind(input.sort_order)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Flip `is_active`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn toggle_advertisement(&self, id: AdvertisementId) -> Result<Advertisement, RepositoryError> {
        sqlx::query_as::<_, Advertisement>(
            "UPDATE shop.advertisement SET is_active = NOT is_active WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete an advertisement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_advertisement(&self, id: AdvertisementId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.advertisement WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Active global messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn announcements(&self) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query_as::<_, Message>(
            "SELECT * FROM shop.message WHERE is_active AND is_global ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every message, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_messages(&self, page: Page) -> Result<Paginated<Message>, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.message")
            .fetch_one(self.pool)
            .await?;
        let results = sqlx::query_as::<_, Message>(
            "SELECT * FROM shop.message ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;
        Ok(Paginated { count, results })
    }

    /// Get a message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get_message(&self, id: MessageId) -> Result<Message, RepositoryError> {
        sqlx::query_as::<_, Message>("SELECT * FROM shop.message WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_message(&self, input: &MessageInput) -> Result<Message, RepositoryError> {
        let row = sqlx::query_as::<_, Message>(
            r"
            INSERT INTO shop.message (title, content, message_type, image, link, is_global, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.message_type)
        .bind(&input.image)
        .bind(&input.link)
        .bind(input.is_global)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Replace a message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn update_message(
        &self,
        id: MessageId,
        input: &MessageInput,
    ) -> Result<Message, RepositoryError> {
        sqlx::query_as::<_, Message>(
            r"
            UPDATE shop.message SET
                title = $2, content = $3, message_type = $4, image = $5, link = $6,
                is_global = $7, is_active = $8
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.message_type)
        .bind(&input.image)
        .bind(&input.link)
        .bind(input.is_global)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Flip `is_active`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn toggle_message(&self, id: MessageId) -> Result<Message, RepositoryError> {
        sqlx::query_as::<_, Message>(
            "UPDATE shop.message SET is_active = NOT is_active WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a message and every inbox copy of it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn delete_message(&self, id: MessageId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shop.user_message WHERE message_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.message WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deliver a message to the given users. Users who already have it are
    /// skipped. Returns how many inbox rows were created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, user_ids), fields(recipients = user_ids.len()))]
    pub async fn push(&self, id: MessageId, user_ids: &[UserId]) -> Result<u64, RepositoryError> {
        let ids: Vec<i32> = user_ids.iter().map(|u| u.as_i32()).collect();
        let result = sqlx::query(
            r"
            INSERT INTO shop.user_message (user_id, message_id)
            SELECT u.id, $1 FROM shop.user u WHERE u.id = ANY($2)
            ON CONFLICT (user_id, message_id) DO NOTHING
            ",
        )
        .bind(id)
        .bind(&ids)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Inbox
    // =========================================================================

    /// A user's inbox, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn inbox(
        &self,
        user_id: UserId,
        is_read: Option<bool>,
        page: Page,
    ) -> Result<Paginated<UserMessage>, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.user_message
            WHERE user_id = $1 AND ($2::boolean IS NULL OR is_read = $2)
            ",
        )
        .bind(user_id)
        .bind(is_read)
        .fetch_one(self.pool)
        .await?;

        let sql = format!(
            r"{USER_MESSAGE_SELECT}
            WHERE um.user_id = $1 AND ($2::boolean IS NULL OR um.is_read = $2)
            ORDER BY um.created_at DESC, um.id DESC
            LIMIT $3 OFFSET $4"
        );
        let results = sqlx::query_as::<_, UserMessage>(&sql)
            .bind(user_id)
            .bind(is_read)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// Mark one inbox message read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user has no such message.
    pub async fn mark_read(&self, user_id: UserId, id: UserMessageId) -> Result<UserMessage, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.user_message
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        let sql = format!("{USER_MESSAGE_SELECT} WHERE um.id = $1");
        sqlx::query_as::<_, UserMessage>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Mark every unread message read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.user_message SET is_read = TRUE, read_at = NOW() WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Unread inbox messages.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.user_message WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
