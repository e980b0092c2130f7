//! Shopping cart handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{CartItemId, ProductId};

use super::MessageResponse;
use crate::db::cart::CartRepository;
use crate::db::catalog::CatalogRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::order::{CartItem, CartSummary};
use crate::services::not_found;
use crate::state::AppState;

/// Build the cart router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(list).post(add))
        .route("/cart/summary", get(summary))
        .route("/cart/select-all", post(select_all))
        .route("/cart/clear", post(clear))
        .route("/cart/clear-selected", post(clear_selected))
        .route("/cart/{id}", patch(update).put(update).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<CartItem>>> {
    Ok(Json(CartRepository::new(state.pool()).list(user.id).await?))
}

#[derive(Debug, Deserialize)]
struct AddToCartRequest {
    product_id: ProductId,
    #[serde(default = "one")]
    quantity: i32,
}

const fn one() -> i32 {
    1
}

/// Quantity of the cart line after adding, if it still fits in stock.
fn merged_quantity(in_cart: i32, adding: i32, stock: i32) -> Option<i32> {
    in_cart.checked_add(adding).filter(|merged| *merged <= stock)
}

/// Add a product, merging with an existing line. The merged quantity must
/// fit in stock.
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
async fn add(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartItem>)> {
    if body.quantity < 1 {
        return Err(AppError::bad_request("商品数量必须大于0"));
    }

    let product = CatalogRepository::new(state.pool())
        .get_product(body.product_id)
        .await
        .map_err(not_found("商品不存在或已下架"))?;
    if !product.is_active {
        return Err(AppError::not_found("商品不存在或已下架"));
    }

    let cart = CartRepository::new(state.pool());
    let in_cart = cart.quantity_of(user.id, product.id).await?;
    if merged_quantity(in_cart, body.quantity, product.stock).is_none() {
        return Err(AppError::bad_request(format!(
            "{}库存不足，当前库存{}",
            product.name, product.stock
        )));
    }

    let item = cart.add(user.id, product.id, body.quantity).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
struct UpdateCartRequest {
    quantity: Option<i32>,
    selected: Option<bool>,
}

async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<CartItemId>,
    Json(body): Json<UpdateCartRequest>,
) -> Result<Json<CartItem>> {
    let cart = CartRepository::new(state.pool());
    let item = cart
        .get(user.id, id)
        .await
        .map_err(not_found("购物车商品不存在"))?;

    if let Some(quantity) = body.quantity {
        if quantity < 1 {
            return Err(AppError::bad_request("商品数量必须大于0"));
        }
        if item.product_stock < quantity {
            return Err(AppError::bad_request(format!(
                "{}库存不足，当前库存{}",
                item.product_name, item.product_stock
            )));
        }
    }

    let item = cart
        .update(user.id, id, body.quantity, body.selected)
        .await
        .map_err(not_found("购物车商品不存在"))?;
    Ok(Json(item))
}

async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<CartItemId>,
) -> Result<StatusCode> {
    CartRepository::new(state.pool())
        .remove(user.id, id)
        .await
        .map_err(not_found("购物车商品不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SelectAllRequest {
    #[serde(default = "default_selected")]
    selected: bool,
}

const fn default_selected() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct AffectedResponse {
    message: String,
    count: u64,
}

async fn select_all(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<SelectAllRequest>,
) -> Result<Json<AffectedResponse>> {
    let count = CartRepository::new(state.pool())
        .select_all(user.id, body.selected)
        .await?;
    Ok(Json(AffectedResponse {
        message: if body.selected { "已全选" } else { "已取消全选" }.to_owned(),
        count,
    }))
}

async fn clear(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<MessageResponse>> {
    CartRepository::new(state.pool()).clear(user.id, false).await?;
    Ok(Json(MessageResponse::new("购物车已清空")))
}

async fn clear_selected(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<AffectedResponse>> {
    let count = CartRepository::new(state.pool()).clear(user.id, true).await?;
    Ok(Json(AffectedResponse {
        message: "已删除选中商品".to_owned(),
        count,
    }))
}

async fn summary(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<CartSummary>> {
    Ok(Json(CartRepository::new(state.pool()).summary(user.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_quantity_respects_stock() {
        assert_eq!(merged_quantity(0, 3, 5), Some(3));
        assert_eq!(merged_quantity(2, 3, 5), Some(5));
        assert_eq!(merged_quantity(3, 3, 5), None);
    }

    #[test]
    fn test_merged_quantity_overflow_is_rejected() {
        assert_eq!(merged_quantity(1, i32::MAX, i32::MAX), None);
        assert_eq!(merged_quantity(i32::MAX, 1, i32::MAX), None);
    }
}
