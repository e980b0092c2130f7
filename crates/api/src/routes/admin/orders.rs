//! Order, payment, and refund administration.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{OrderId, PaymentId, RefundId};

use crate::db::Paginated;
use crate::db::orders::OrderRepository;
use crate::db::refunds::RefundRepository;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::order::{
    Order, OrderDetail, OrderFilter, Payment, PaymentFilter, RefundFilter, RefundRequest,
};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::services::orders::OrderService;
use crate::services::refunds::RefundService;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/ship", post(ship))
        .route("/orders/{id}/deliver", post(deliver))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/payments", get(list_payments))
        .route("/payments/{id}", get(get_payment))
        .route("/refunds", get(list_refunds))
        .route("/refunds/{id}", get(get_refund))
        .route("/refunds/{id}/approve", post(approve_refund))
        .route("/refunds/{id}/reject", post(reject_refund))
        .route("/refunds/{id}/complete", post(complete_refund))
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Paginated<Order>>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let repo = OrderRepository::new(state.pool());
    let order = repo.get(id).await.map_err(not_found("订单不存在"))?;
    Ok(Json(repo.detail(order).await?))
}

#[derive(Debug, Deserialize)]
struct ShipRequest {
    express_company: String,
    express_no: String,
}

/// Ship with manually entered express details.
async fn ship(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<ShipRequest>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool())
        .ship(id, &body.express_company, &body.express_no)
        .await?;
    tracing::info!(order_no = %order.order_no, express_no = %body.express_no, "order shipped manually");
    Ok(Json(order))
}

async fn deliver(State(state): State<AppState>, Path(id): Path<OrderId>) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(state.pool()).deliver(id).await?))
}

async fn cancel(State(state): State<AppState>, Path(id): Path<OrderId>) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(state.pool()).cancel(id, None).await?))
}

// =============================================================================
// Payments (read-only)
// =============================================================================

async fn list_payments(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Paginated<Payment>>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .list_payments(&filter, page.page())
            .await?,
    ))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
) -> Result<Json<Payment>> {
    let payment = OrderRepository::new(state.pool())
        .get_payment(id)
        .await
        .map_err(not_found("支付记录不存在"))?;
    Ok(Json(payment))
}

// =============================================================================
// Refunds
// =============================================================================

async fn list_refunds(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<RefundFilter>,
) -> Result<Json<Paginated<RefundRequest>>> {
    Ok(Json(
        RefundRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn get_refund(
    State(state): State<AppState>,
    Path(id): Path<RefundId>,
) -> Result<Json<RefundRequest>> {
    let refund = RefundRepository::new(state.pool())
        .get(id)
        .await
        .map_err(not_found("退款申请不存在"))?;
    Ok(Json(refund))
}

#[derive(Debug, Default, Deserialize)]
struct ApproveRequest {
    #[serde(default)]
    admin_remark: String,
    return_address: Option<String>,
}

/// Approve a pending refund. Return requests default to the sender address.
async fn approve_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<RefundId>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<RefundRequest>> {
    let Json(body) = body.unwrap_or_default();
    let default_address = state.config().sender.full_address();
    let refund = RefundService::new(state.pool())
        .approve(
            admin.id,
            id,
            &body.admin_remark,
            body.return_address.as_deref(),
            &default_address,
        )
        .await?;
    tracing::info!(refund_no = %refund.refund_no, admin_id = %admin.id, "refund approved");
    Ok(Json(refund))
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    #[serde(default)]
    reject_reason: String,
}

async fn reject_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<RefundId>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(
        RefundService::new(state.pool())
            .reject(admin.id, id, &body.reject_reason)
            .await?,
    ))
}

async fn complete_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<RefundId>,
) -> Result<Json<RefundRequest>> {
    let refund = RefundService::new(state.pool()).complete(admin.id, id).await?;
    tracing::info!(refund_no = %refund.refund_no, amount = %refund.amount, "refund completed");
    Ok(Json(refund))
}
