//! Subscription oversight. Same transitions as the customer side, without
//! the ownership check.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use freshmilk_core::SubscriptionId;

use crate::db::Paginated;
use crate::db::subscriptions::SubscriptionRepository;
use crate::error::Result;
use crate::models::subscription::{DeliveryConfirmation, Subscription, SubscriptionFilter};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::services::subscriptions::SubscriptionService;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/subscriptions", get(list))
        .route("/subscriptions/{id}", get(detail))
        .route("/subscriptions/{id}/pause", post(pause))
        .route("/subscriptions/{id}/resume", post(resume))
        .route("/subscriptions/{id}/cancel", post(cancel))
        .route("/subscriptions/{id}/confirm-delivery", post(confirm_delivery))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<SubscriptionFilter>,
) -> Result<Json<Paginated<Subscription>>> {
    Ok(Json(
        SubscriptionRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    let subscription = SubscriptionRepository::new(state.pool())
        .get(id, None)
        .await
        .map_err(not_found("订阅不存在"))?;
    Ok(Json(subscription))
}

async fn pause(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(SubscriptionService::new(state.pool()).pause(id, None).await?))
}

async fn resume(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(SubscriptionService::new(state.pool()).resume(id, None).await?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(SubscriptionService::new(state.pool()).cancel(id, None).await?))
}

/// Record a delivery on the customer's behalf.
async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<DeliveryConfirmation>> {
    Ok(Json(
        SubscriptionService::new(state.pool())
            .confirm_delivery(id, None)
            .await?,
    ))
}
