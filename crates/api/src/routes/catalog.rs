//! Category, product, and favourite handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{FavoriteId, ProductId};

use super::{MessageResponse, PageQuery};
use crate::db::Paginated;
use crate::db::catalog::{CatalogRepository, Shelf};
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::catalog::{Category, Favorite, Product, ProductFilter};
use crate::services::not_found;
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/products", get(list_products))
        .route("/products/hot", get(hot))
        .route("/products/new-arrivals", get(new_arrivals))
        .route("/products/subscription", get(subscribable))
        .route("/products/recommend", get(recommend))
        .route("/products/{id}", get(product_detail))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/toggle", post(toggle_favorite))
        .route("/favorites/{id}", delete(remove_favorite))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(
        CatalogRepository::new(state.pool())
            .list_categories(true)
            .await?,
    ))
}

/// Active products only, whatever `is_active` the client sends.
async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(mut filter): Query<ProductFilter>,
) -> Result<Json<Paginated<Product>>> {
    filter.is_active = Some(true);
    Ok(Json(
        CatalogRepository::new(state.pool())
            .list_products(&filter, page.page())
            .await?,
    ))
}

async fn shelf(state: &AppState, shelf: Shelf) -> Result<Json<Vec<Product>>> {
    Ok(Json(CatalogRepository::new(state.pool()).shelf(shelf).await?))
}

async fn hot(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    shelf(&state, Shelf::Hot).await
}

async fn new_arrivals(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    shelf(&state, Shelf::NewArrivals).await
}

async fn subscribable(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    shelf(&state, Shelf::Subscription).await
}

async fn recommend(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    shelf(&state, Shelf::Recommended).await
}

/// Product detail; counts a view.
async fn product_detail(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = CatalogRepository::new(state.pool())
        .view_product(id)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(product))
}

// =============================================================================
// Favourites
// =============================================================================

async fn list_favorites(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Favorite>>> {
    Ok(Json(
        CatalogRepository::new(state.pool())
            .list_favorites(user.id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct FavoriteRequest {
    product_id: ProductId,
}

async fn add_favorite(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<FavoriteRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let added = CatalogRepository::new(state.pool())
        .add_favorite(user.id, body.product_id)
        .await
        .map_err(not_found("商品不存在"))?;

    Ok(if added {
        (StatusCode::CREATED, Json(MessageResponse::new("收藏成功")))
    } else {
        (StatusCode::OK, Json(MessageResponse::new("已收藏")))
    })
}

async fn remove_favorite(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<FavoriteId>,
) -> Result<StatusCode> {
    CatalogRepository::new(state.pool())
        .remove_favorite(user.id, id)
        .await
        .map_err(not_found("收藏不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ToggleFavoriteResponse {
    favorited: bool,
}

async fn toggle_favorite(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<FavoriteRequest>,
) -> Result<Json<ToggleFavoriteResponse>> {
    let favorited = CatalogRepository::new(state.pool())
        .toggle_favorite(user.id, body.product_id)
        .await
        .map_err(not_found("商品不存在"))?;
    Ok(Json(ToggleFavoriteResponse { favorited }))
}
