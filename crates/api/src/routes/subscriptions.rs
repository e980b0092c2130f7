//! Customer subscription handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{SubscriptionId, SubscriptionStatus};

use super::PageQuery;
use crate::db::Paginated;
use crate::db::subscriptions::SubscriptionRepository;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::subscription::{
    CreateSubscription, DeliveryConfirmation, Subscription, SubscriptionFilter,
};
use crate::services::not_found;
use crate::services::subscriptions::SubscriptionService;
use crate::state::AppState;

/// Build the subscriptions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscriptions", get(list).post(create))
        .route("/subscriptions/{id}", get(detail))
        .route("/subscriptions/{id}/pause", post(pause))
        .route("/subscriptions/{id}/resume", post(resume))
        .route("/subscriptions/{id}/cancel", post(cancel))
        .route("/subscriptions/{id}/confirm-delivery", post(confirm_delivery))
}

#[derive(Debug, Default, Deserialize)]
struct StatusFilter {
    status: Option<SubscriptionStatus>,
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Paginated<Subscription>>> {
    let filter = SubscriptionFilter {
        status: filter.status,
        user_id: Some(user.id),
        subscription_no: None,
    };
    Ok(Json(
        SubscriptionRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn detail(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    let subscription = SubscriptionRepository::new(state.pool())
        .get(id, Some(user.id))
        .await
        .map_err(not_found("订阅不存在"))?;
    Ok(Json(subscription))
}

async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateSubscription>,
) -> Result<(StatusCode, Json<Subscription>)> {
    let subscription = SubscriptionService::new(state.pool())
        .create(user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn pause(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(
        SubscriptionService::new(state.pool())
            .pause(id, Some(user.id))
            .await?,
    ))
}

async fn resume(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(
        SubscriptionService::new(state.pool())
            .resume(id, Some(user.id))
            .await?,
    ))
}

async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>> {
    Ok(Json(
        SubscriptionService::new(state.pool())
            .cancel(id, Some(user.id))
            .await?,
    ))
}

async fn confirm_delivery(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<DeliveryConfirmation>> {
    Ok(Json(
        SubscriptionService::new(state.pool())
            .confirm_delivery(id, Some(user.id))
            .await?,
    ))
}
