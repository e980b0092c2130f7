//! Feedback handling.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{FeedbackId, FeedbackStatus};

use crate::db::Paginated;
use crate::db::feedback::FeedbackRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::feedback::{Feedback, FeedbackFilter};
use crate::routes::{PageQuery, StatusUpdate};
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/feedback", get(list))
        .route("/feedback/{id}", get(detail))
        .route("/feedback/{id}/reply", post(reply))
        .route("/feedback/{id}/update-status", post(update_status))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<FeedbackFilter>,
) -> Result<Json<Paginated<Feedback>>> {
    Ok(Json(
        FeedbackRepository::new(state.pool())
            .list(&filter, None, page.page())
            .await?,
    ))
}

async fn detail(State(state): State<AppState>, Path(id): Path<FeedbackId>) -> Result<Json<Feedback>> {
    let feedback = FeedbackRepository::new(state.pool())
        .get(id, None)
        .await
        .map_err(not_found("反馈不存在"))?;
    Ok(Json(feedback))
}

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    #[serde(default)]
    reply: String,
}

/// Answer a ticket. Replying resolves it.
async fn reply(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<FeedbackId>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<Feedback>> {
    let text = body.reply.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("回复内容不能为空"));
    }
    let feedback = FeedbackRepository::new(state.pool())
        .reply(id, admin.id, text)
        .await
        .map_err(not_found("反馈不存在"))?;
    Ok(Json(feedback))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<FeedbackId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Feedback>> {
    let status: FeedbackStatus = body.parse()?;
    let feedback = FeedbackRepository::new(state.pool())
        .set_status(id, status)
        .await
        .map_err(not_found("反馈不存在"))?;
    Ok(Json(feedback))
}
