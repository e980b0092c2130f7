//! Shipping address repository.

use sqlx::PgPool;

use freshmilk_core::{AddressId, UserId};

use super::RepositoryError;
use crate::models::user::{Address, AddressInput};

/// Repository for a user's shipping addresses.
pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All addresses of a user, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let rows = sqlx::query_as::<_, Address>(
            r"
            SELECT * FROM shop.user_address
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get one of the user's addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn get(&self, user_id: UserId, id: AddressId) -> Result<Address, RepositoryError> {
        sqlx::query_as::<_, Address>(
            "SELECT * FROM shop.user_address WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Create an address. The first address, or one flagged default,
    /// becomes the only default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let has_any: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM shop.user_address WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let is_default = input.is_default || !has_any;

        if is_default {
            clear_defaults(&mut tx, user_id).await?;
        }

        let address = sqlx::query_as::<_, Address>(
            r"
            INSERT INTO shop.user_address
                (user_id, receiver_name, receiver_phone, province, city, district,
                 detail_address, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(user_id)
        .bind(&input.receiver_name)
        .bind(&input.receiver_phone)
        .bind(&input.province)
        .bind(&input.city)
        .bind(&input.district)
        .bind(&input.detail_address)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(address)
    }

    /// Replace an address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn update(
        &self,
        user_id: UserId,
        id: AddressId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            clear_defaults(&mut tx, user_id).await?;
        }

        let address = sqlx::query_as::<_, Address>(
            r"
            UPDATE shop.user_address SET
                receiver_name = $3, receiver_phone = $4, province = $5, city = $6,
                district = $7, detail_address = $8, is_default = (is_default OR $9)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.receiver_name)
        .bind(&input.receiver_phone)
        .bind(&input.province)
        .bind(&input.city)
        .bind(&input.district)
        .bind(&input.detail_address)
        .bind(input.is_default)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(address)
    }

    /// Make an address the user's only default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn set_default(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        clear_defaults(&mut tx, user_id).await?;

        let address = sqlx::query_as::<_, Address>(
            r"
            UPDATE shop.user_address SET is_default = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING *
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(address)
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn delete(&self, user_id: UserId, id: AddressId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.user_address WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

async fn clear_defaults(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.user_address SET is_default = FALSE WHERE user_id = $1 AND is_default")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}
