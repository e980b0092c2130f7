//! Checkout and order handlers for customers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{OrderId, OrderStatus, PaymentMethod, UserAction};

use super::{PageQuery, log_action};
use crate::db::Paginated;
use crate::db::orders::OrderRepository;
use crate::error::Result;
use crate::middleware::{ClientInfo, RequireUser};
use crate::models::order::{CreateOrder, Order, OrderDetail, OrderFilter};
use crate::services::not_found;
use crate::services::orders::OrderService;
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list).post(create))
        .route("/orders/{id}", get(detail))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/orders/{id}/pay", post(pay))
        .route("/orders/{id}/confirm-receive", post(confirm_receive))
}

#[derive(Debug, Default, Deserialize)]
struct StatusFilter {
    status: Option<OrderStatus>,
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Paginated<Order>>> {
    let filter = OrderFilter {
        status: filter.status,
        order_no: None,
        user_id: Some(user.id),
    };
    Ok(Json(
        OrderRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn detail(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(user.id, id)
        .await
        .map_err(not_found("订单不存在"))?;
    Ok(Json(repo.detail(order).await?))
}

async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    client: ClientInfo,
    Json(body): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    let detail = OrderService::new(state.pool()).create(&user, &body).await?;
    log_action(&state, user.id, UserAction::Order, &client).await;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(
        OrderService::new(state.pool())
            .cancel(id, Some(user.id))
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct PayRequest {
    method: Option<PaymentMethod>,
}

/// Simulated payment. The body is optional.
async fn pay(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    client: ClientInfo,
    Path(id): Path<OrderId>,
    body: Option<Json<PayRequest>>,
) -> Result<Json<Order>> {
    let Json(body) = body.unwrap_or_default();
    let order = OrderService::new(state.pool())
        .pay(user.id, id, body.method)
        .await?;
    log_action(&state, user.id, UserAction::Pay, &client).await;
    Ok(Json(order))
}

async fn confirm_receive(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(
        OrderService::new(state.pool())
            .confirm_receive(&user, id)
            .await?,
    ))
}
