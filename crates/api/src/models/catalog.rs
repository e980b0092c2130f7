//! Categories, products, and favourites.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use freshmilk_core::{CategoryId, FavoriteId, ProductId, UserId};

use super::user::default_true;

/// A product category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Category fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A sellable product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    /// Joined from the category.
    pub category_name: Option<String>,
    pub name: String,
    pub subtitle: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub specification: String,
    pub origin: String,
    /// Shelf life in days.
    pub shelf_life: i32,
    pub description: String,
    pub detail: String,
    pub cover_image: String,
    pub images: Json<Vec<String>>,
    pub stock: i32,
    pub sales_count: i32,
    pub view_count: i32,
    pub is_hot: bool,
    pub is_new: bool,
    pub is_subscription: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product fields for create; also the full replacement on update.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub category_id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub subtitle: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub specification: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default = "default_shelf_life")]
    pub shelf_life: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub is_hot: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_subscription: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_shelf_life() -> i32 {
    7
}

/// Sort order for product lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ProductOrdering {
    #[serde(rename = "price")]
    PriceAsc,
    #[serde(rename = "-price")]
    PriceDesc,
    #[serde(rename = "sales_count")]
    SalesAsc,
    #[serde(rename = "-sales_count")]
    SalesDesc,
    #[serde(rename = "created_at")]
    CreatedAsc,
    #[default]
    #[serde(rename = "-created_at")]
    CreatedDesc,
}

impl ProductOrdering {
    /// `ORDER BY` clause for this ordering.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::SalesAsc => "p.sales_count ASC, p.id",
            Self::SalesDesc => "p.sales_count DESC, p.id",
            Self::CreatedAsc => "p.created_at ASC, p.id",
            Self::CreatedDesc => "p.created_at DESC, p.id DESC",
        }
    }
}

/// Filters for product lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    pub is_hot: Option<bool>,
    pub is_new: Option<bool>,
    pub is_subscription: Option<bool>,
    /// Admin only; customer lists always see active products.
    pub is_active: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    #[serde(default)]
    pub ordering: ProductOrdering,
}

/// A favourited product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Favorite {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Decimal,
    pub product_cover_image: String,
    pub product_is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        ordering: ProductOrdering,
    }

    #[test]
    fn test_ordering_parses_django_style_values() {
        let w: Wrapper = serde_json::from_str(r#"{"ordering":"-price"}"#).unwrap();
        assert_eq!(w.ordering, ProductOrdering::PriceDesc);
        let w: Wrapper = serde_json::from_str("{}").unwrap();
        assert_eq!(w.ordering, ProductOrdering::CreatedDesc);
        assert!(serde_json::from_str::<Wrapper>(r#"{"ordering":"name"}"#).is_err());
    }
}
