//! Customer refund handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::RefundId;

use super::PageQuery;
use crate::db::Paginated;
use crate::db::refunds::RefundRepository;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::order::{CreateRefund, RefundRequest};
use crate::services::not_found;
use crate::services::refunds::RefundService;
use crate::state::AppState;

/// Build the refunds router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/refunds", get(list).post(create))
        .route("/refunds/{id}", get(detail))
        .route("/refunds/{id}/cancel", post(cancel))
        .route("/refunds/{id}/fill-return-express", post(fill_return_express))
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<RefundRequest>>> {
    Ok(Json(
        RefundRepository::new(state.pool())
            .list_for_user(user.id, page.page())
            .await?,
    ))
}

async fn detail(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<RefundId>,
) -> Result<Json<RefundRequest>> {
    let refund = RefundRepository::new(state.pool())
        .get_for_user(user.id, id)
        .await
        .map_err(not_found("退款申请不存在"))?;
    Ok(Json(refund))
}

async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateRefund>,
) -> Result<(StatusCode, Json<RefundRequest>)> {
    let refund = RefundService::new(state.pool()).create(user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<RefundId>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(RefundService::new(state.pool()).cancel(user.id, id).await?))
}

#[derive(Debug, Deserialize)]
struct ReturnExpressRequest {
    company: String,
    express_no: String,
}

async fn fill_return_express(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<RefundId>,
    Json(body): Json<ReturnExpressRequest>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(
        RefundService::new(state.pool())
            .fill_return_express(user.id, id, &body.company, &body.express_no)
            .await?,
    ))
}
