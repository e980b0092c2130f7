//! Customer feedback handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use freshmilk_core::FeedbackId;

use super::PageQuery;
use crate::db::Paginated;
use crate::db::feedback::FeedbackRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::feedback::{CreateFeedback, Feedback, FeedbackFilter};
use crate::services::not_found;
use crate::state::AppState;

/// Build the feedback router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feedback", get(list).post(create))
        .route("/feedback/{id}", get(detail))
}

async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Feedback>>> {
    Ok(Json(
        FeedbackRepository::new(state.pool())
            .list(&FeedbackFilter::default(), Some(user.id), page.page())
            .await?,
    ))
}

async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateFeedback>,
) -> Result<(StatusCode, Json<Feedback>)> {
    if body.title.trim().is_empty() || body.content.trim().is_empty() {
        return Err(AppError::bad_request("请填写反馈标题和内容"));
    }
    let feedback = FeedbackRepository::new(state.pool())
        .create(user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn detail(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<FeedbackId>,
) -> Result<Json<Feedback>> {
    let feedback = FeedbackRepository::new(state.pool())
        .get(id, Some(user.id))
        .await
        .map_err(not_found("反馈不存在"))?;
    Ok(Json(feedback))
}
