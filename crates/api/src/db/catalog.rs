//! Catalog repository: categories, products, and favourites.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use freshmilk_core::{CategoryId, FavoriteId, ProductId, UserId};

use super::{Page, Paginated, RepositoryError, contains_pattern};
use crate::models::catalog::{Category, CategoryInput, Favorite, Product, ProductFilter, ProductInput};

const PRODUCT_SELECT: &str = r"
    SELECT p.*, c.name AS category_name
    FROM shop.product p
    LEFT JOIN shop.category c ON c.id = p.category_id
";

const PRODUCT_FILTER: &str = r"
    WHERE ($1::integer IS NULL OR p.category_id = $1)
      AND ($2::boolean IS NULL OR p.is_hot = $2)
      AND ($3::boolean IS NULL OR p.is_new = $3)
      AND ($4::boolean IS NULL OR p.is_subscription = $4)
      AND ($5::boolean IS NULL OR p.is_active = $5)
      AND ($6::numeric IS NULL OR p.price >= $6)
      AND ($7::numeric IS NULL OR p.price <= $7)
      AND ($8::text IS NULL
           OR p.name ILIKE $8 OR p.subtitle ILIKE $8 OR p.description ILIKE $8)
";

/// Which curated product shelf to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shelf {
    /// `is_hot`, best sellers first.
    Hot,
    /// `is_new`, newest first.
    NewArrivals,
    /// Subscribable products.
    Subscription,
    /// Best sellers, then most viewed.
    Recommended,
}

impl Shelf {
    const fn query(self) -> &'static str {
        match self {
            Self::Hot => "WHERE p.is_active AND p.is_hot ORDER BY p.sales_count DESC, p.id LIMIT 10",
            Self::NewArrivals => {
                "WHERE p.is_active AND p.is_new ORDER BY p.created_at DESC, p.id DESC LIMIT 10"
            }
            Self::Subscription => {
                "WHERE p.is_active AND p.is_subscription ORDER BY p.sales_count DESC, p.id"
            }
            Self::Recommended => {
                "WHERE p.is_active ORDER BY p.sales_count DESC, p.view_count DESC, p.id LIMIT 10"
            }
        }
    }
}

/// Repository for catalog operations.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Categories by sort order. `active_only` hides disabled ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT * FROM shop.category WHERE is_active OR NOT $1 ORDER BY sort_order, id",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn get_category(&self, id: CategoryId) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>("SELECT * FROM shop.category WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            r"
            INSERT INTO shop.category (name, icon, description, sort_order, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(&input.name)
        .bind(&input.icon)
        .bind(&input.description)
        .bind(input.sort_order)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "分类名称已存在"))
    }

    /// Replace a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn update_category(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            r"
            UPDATE shop.category
            SET name = $2, icon = $3, description = $4, sort_order = $5, is_active = $6
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.icon)
        .bind(&input.description)
        .bind(input.sort_order)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "分类名称已存在"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a category; its products become uncategorised.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE shop.product SET category_id = NULL WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shop.category WHERE id = $1")
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
    // Products
    // =========================================================================

    /// Filtered, ordered, paginated product list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>, RepositoryError> {
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(contains_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM shop.product p {PRODUCT_FILTER}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.category_id)
            .bind(filter.is_hot)
            .bind(filter.is_new)
            .bind(filter.is_subscription)
            .bind(filter.is_active)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(&search)
            .fetch_one(self.pool)
            .await?;

        let list_sql = format!(
            "{PRODUCT_SELECT} {PRODUCT_FILTER} ORDER BY {} LIMIT $9 OFFSET $10",
            filter.ordering.sql()
        );
        let results = sqlx::query_as::<_, Product>(&list_sql)
            .bind(filter.category_id)
            .bind(filter.is_hot)
            .bind(filter.is_new)
            .bind(filter.is_subscription)
            .bind(filter.is_active)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(&search)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        Ok(Paginated { count, results })
    }

    /// A curated shelf of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn shelf(&self, shelf: Shelf) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("{PRODUCT_SELECT} {}", shelf.query());
        let rows = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Get a product regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = $1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get an active product and count the view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is missing or inactive.
    pub async fn view_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE shop.product SET view_count = view_count + 1 WHERE id = $1 AND is_active",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get_product(id).await
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let id: ProductId = sqlx::query_scalar(
            r"
            INSERT INTO shop.product
                (category_id, name, subtitle, price, original_price, specification, origin,
                 shelf_life, description, detail, cover_image, images, stock,
                 is_hot, is_new, is_subscription, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            ",
        )
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.subtitle)
        .bind(input.price)
        .bind(input.original_price)
        .bind(&input.specification)
        .bind(&input.origin)
        .bind(input.shelf_life)
        .bind(&input.description)
        .bind(&input.detail)
        .bind(&input.cover_image)
        .bind(Json(&input.images))
        .bind(input.stock.max(0))
        .bind(input.is_hot)
        .bind(input.is_new)
        .bind(input.is_subscription)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "商品名称已存在"))?;

        self.get_product(id).await
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product SET
                category_id = $2, name = $3, subtitle = $4, price = $5, original_price = $6,
                specification = $7, origin = $8, shelf_life = $9, description = $10,
                detail = $11, cover_image = $12, images = $13, stock = $14,
                is_hot = $15, is_new = $16, is_subscription = $17, is_active = $18
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.subtitle)
        .bind(input.price)
        .bind(input.original_price)
        .bind(&input.specification)
        .bind(&input.origin)
        .bind(input.shelf_life)
        .bind(&input.description)
        .bind(&input.detail)
        .bind(&input.cover_image)
        .bind(Json(&input.images))
        .bind(input.stock.max(0))
        .bind(input.is_hot)
        .bind(input.is_new)
        .bind(input.is_subscription)
        .bind(input.is_active)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "商品名称已存在"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get_product(id).await
    }

    /// Flip a product's `is_active` flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn toggle_active(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let result = sqlx::query("UPDATE shop.product SET is_active = NOT is_active WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get_product(id).await
    }

    /// Set absolute stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_stock(&self, id: ProductId, stock: i32) -> Result<Product, RepositoryError> {
        let result = sqlx::query("UPDATE shop.product SET stock = $2 WHERE id = $1")
            .bind(id)
            .bind(stock)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.get_product(id).await
    }

    /// Delete a product.
    ///
    /// Cart lines and favourites are removed; order lines and subscriptions
    /// keep their snapshot and lose the link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for sql in [
            "DELETE FROM shop.cart_item WHERE product_id = $1",
            "DELETE FROM shop.favorite WHERE product_id = $1",
            "UPDATE shop.order_item SET product_id = NULL WHERE product_id = $1",
            "UPDATE shop.subscription SET product_id = NULL WHERE product_id = $1",
            "DELETE FROM shop.comment_like WHERE comment_id IN
                (SELECT id FROM shop.comment WHERE product_id = $1)",
            "DELETE FROM shop.comment WHERE product_id = $1",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }

        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
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
    // Favorites
    // =========================================================================

    /// A user's favourites, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_favorites(&self, user_id: UserId) -> Result<Vec<Favorite>, RepositoryError> {
        let rows = sqlx::query_as::<_, Favorite>(
            r"
            SELECT f.id, f.user_id, f.product_id, f.created_at,
                   p.name AS product_name, p.price AS product_price,
                   p.cover_image AS product_cover_image, p.is_active AS product_is_active
            FROM shop.favorite f
            JOIN shop.product p ON p.id = f.product_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC, f.id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Add a favourite. Returns `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn add_favorite(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        self.get_product(product_id).await?;
        let result = sqlx::query(
            r"
            INSERT INTO shop.favorite (user_id, product_id) VALUES ($1, $2)
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a favourite by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not belong to the user.
    pub async fn remove_favorite(&self, user_id: UserId, id: FavoriteId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.favorite WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Toggle a favourite. Returns whether the product is now favourited.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn toggle_favorite(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let removed = sqlx::query("DELETE FROM shop.favorite WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;
        if removed.rows_affected() > 0 {
            return Ok(false);
        }
        self.add_favorite(user_id, product_id).await?;
        Ok(true)
    }
}

// =============================================================================
// Stock (transactional helpers)
// =============================================================================

/// Stock-relevant product fields, read under a row lock.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockedProduct {
    pub id: ProductId,
    pub name: String,
    pub price: rust_decimal::Decimal,
    pub cover_image: String,
    pub stock: i32,
    pub is_active: bool,
    pub is_subscription: bool,
}

/// Lock a product row for a stock change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_product(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<LockedProduct>, RepositoryError> {
    let row = sqlx::query_as::<_, LockedProduct>(
        r"
        SELECT id, name, price, cover_image, stock, is_active, is_subscription
        FROM shop.product WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Move `quantity` units out of stock and into sales (negative to reverse).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn adjust_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.product
        SET stock = stock - $2, sales_count = GREATEST(0, sales_count + $2)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(())
}
