//! Category and product management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{CategoryId, ProductId};

use crate::db::Paginated;
use crate::db::catalog::CatalogRepository;
use crate::error::{AppError, Result};
use crate::models::catalog::{Category, CategoryInput, Product, ProductFilter, ProductInput};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category)
                .put(update_category)
                .patch(update_category)
                .delete(delete_category),
        )
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product)
                .put(update_product)
                .patch(update_product)
                .delete(delete_product),
        )
        .route("/products/{id}/toggle-active", post(toggle_active))
        .route("/products/{id}/update-stock", post(update_stock))
}

// =============================================================================
// Categories
// =============================================================================

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(
        CatalogRepository::new(state.pool())
            .list_categories(false)
            .await?,
    ))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Category>> {
    let category = CatalogRepository::new(state.pool())
        .get_category(id)
        .await
        .map_err(not_found("分类不存在"))?;
    Ok(Json(category))
}

async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>)> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("分类名称不能为空"));
    }
    let category = CatalogRepository::new(state.pool())
        .create_category(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Json(body): Json<CategoryInput>,
) -> Result<Json<Category>> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("分类名称不能为空"));
    }
    let category = CatalogRepository::new(state.pool())
        .update_category(id, &body)
        .await
        .map_err(not_found("分类不存在"))?;
    Ok(Json(category))
}

/// Delete a category; its products become uncategorised.
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<StatusCode> {
    CatalogRepository::new(state.pool())
        .delete_category(id)
        .await
        .map_err(not_found("分类不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Products
// =============================================================================

fn validate_product(input: &ProductInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::bad_request("商品名称不能为空"));
    }
    if input.price.is_sign_negative() {
        return Err(AppError::bad_request("商品价格不能为负数"));
    }
    if input.stock < 0 {
        return Err(AppError::bad_request("库存不能为负数"));
    }
    if input.shelf_life < 1 {
        return Err(AppError::bad_request("保质期必须大于0"));
    }
    Ok(())
}

/// Every product, active or not.
async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Paginated<Product>>> {
    Ok(Json(
        CatalogRepository::new(state.pool())
            .list_products(&filter, page.page())
            .await?,
    ))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = CatalogRepository::new(state.pool())
        .get_product(id)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(product))
}

async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    validate_product(&body)?;
    let product = CatalogRepository::new(state.pool())
        .create_product(&body)
        .await?;
    tracing::info!(product_id = %product.id, name = %product.name, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<ProductInput>,
) -> Result<Json<Product>> {
    validate_product(&body)?;
    let product = CatalogRepository::new(state.pool())
        .update_product(id, &body)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    CatalogRepository::new(state.pool())
        .delete_product(id)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_active(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = CatalogRepository::new(state.pool())
        .toggle_active(id)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
struct StockRequest {
    stock: i32,
}

async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<StockRequest>,
) -> Result<Json<Product>> {
    if body.stock < 0 {
        return Err(AppError::bad_request("库存不能为负数"));
    }
    let product = CatalogRepository::new(state.pool())
        .set_stock(id, body.stock)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(product))
}
