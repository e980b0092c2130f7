//! Shopping cart repository.

use sqlx::{PgConnection, PgPool};

use freshmilk_core::{CartItemId, ProductId, UserId};

use super::RepositoryError;
use crate::models::order::{CartItem, CartSummary};

const CART_SELECT: &str = r"
    SELECT c.id, c.user_id, c.product_id, c.quantity, c.selected, c.created_at,
           p.name AS product_name, p.price AS product_price,
           p.cover_image AS product_cover_image, p.stock AS product_stock,
           p.is_active AS product_is_active,
           p.price * c.quantity AS total_price
    FROM shop.cart_item c
    JOIN shop.product p ON p.id = c.product_id
";

/// Repository for cart lines.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every line in the user's cart, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let sql = format!("{CART_SELECT} WHERE c.user_id = $1 ORDER BY c.created_at DESC, c.id DESC");
        let rows = sqlx::query_as::<_, CartItem>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Get one of the user's cart lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not belong to the user.
    pub async fn get(&self, user_id: UserId, id: CartItemId) -> Result<CartItem, RepositoryError> {
        let sql = format!("{CART_SELECT} WHERE c.id = $1 AND c.user_id = $2");
        sqlx::query_as::<_, CartItem>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Quantity of a product already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn quantity_of(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<i32, RepositoryError> {
        let quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM shop.cart_item WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(quantity.unwrap_or(0))
    }

    /// Add `quantity` of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let id: CartItemId = sqlx::query_scalar(
            r"
            INSERT INTO shop.cart_item (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = shop.cart_item.quantity + EXCLUDED.quantity, selected = TRUE
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(self.pool)
        .await?;
        self.get(user_id, id).await
    }

    /// Change a line's quantity and/or selection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not belong to the user.
    pub async fn update(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: Option<i32>,
        selected: Option<bool>,
    ) -> Result<CartItem, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.cart_item
            SET quantity = COALESCE($3, quantity), selected = COALESCE($4, selected)
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(quantity)
        .bind(selected)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get(user_id, id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line does not belong to the user.
    pub async fn remove(&self, user_id: UserId, id: CartItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Select or deselect every line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn select_all(&self, user_id: UserId, selected: bool) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE shop.cart_item SET selected = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(selected)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Empty the cart, or only its selected lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, user_id: UserId, selected_only: bool) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM shop.cart_item WHERE user_id = $1 AND (selected OR NOT $2)",
        )
        .bind(user_id)
        .bind(selected_only)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count and amount of the selected lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, user_id: UserId) -> Result<CartSummary, RepositoryError> {
        let summary = sqlx::query_as::<_, CartSummary>(
            r"
            SELECT COALESCE(SUM(c.quantity), 0)::bigint AS total_count,
                   COALESCE(SUM(p.price * c.quantity), 0)::numeric(10, 2) AS total_amount
            FROM shop.cart_item c
            JOIN shop.product p ON p.id = c.product_id
            WHERE c.user_id = $1 AND c.selected
            ",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(summary)
    }
}

/// Remove ordered products from a user's cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn remove_products(
    conn: &mut PgConnection,
    user_id: UserId,
    product_ids: &[ProductId],
) -> Result<(), RepositoryError> {
    let ids: Vec<i32> = product_ids.iter().map(ProductId::as_i32).collect();
    sqlx::query("DELETE FROM shop.cart_item WHERE user_id = $1 AND product_id = ANY($2)")
        .bind(user_id)
        .bind(ids)
        .execute(conn)
        .await?;
    Ok(())
}
