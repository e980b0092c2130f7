//! Advertisement slots and system messages.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{AdPosition, AdvertisementId, MessageId, UserId};

use crate::db::Paginated;
use crate::db::notifications::NotificationRepository;
use crate::db::users::UserRepository;
use crate::error::{AppError, Result};
use crate::models::notification::{Advertisement, AdvertisementInput, Message, MessageInput};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/advertisements", get(list_ads).post(create_ad))
        .route(
            "/advertisements/{id}",
            get(get_ad).put(update_ad).patch(update_ad).delete(delete_ad),
        )
        .route("/advertisements/{id}/toggle-active", post(toggle_ad))
        .route("/messages", get(list_messages).post(create_message))
        .route(
            "/messages/{id}",
            get(get_message)
                .put(update_message)
                .patch(update_message)
                .delete(delete_message),
        )
        .route("/messages/{id}/toggle-active", post(toggle_message))
        .route("/messages/{id}/push", post(push_message))
}

// =============================================================================
// Advertisements
// =============================================================================

fn validate_ad(input: &AdvertisementInput) -> Result<()> {
    if input.title.trim().is_empty() || input.image.trim().is_empty() {
        return Err(AppError::bad_request("广告标题和图片不能为空"));
    }
    if let (Some(start), Some(end)) = (input.start_time, input.end_time)
        && end <= start
    {
        return Err(AppError::bad_request("结束时间必须晚于开始时间"));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct PositionFilter {
    position: Option<AdPosition>,
}

async fn list_ads(
    State(state): State<AppState>,
    Query(filter): Query<PositionFilter>,
) -> Result<Json<Vec<Advertisement>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .list_advertisements(filter.position)
            .await?,
    ))
}

async fn get_ad(
    State(state): State<AppState>,
    Path(id): Path<AdvertisementId>,
) -> Result<Json<Advertisement>> {
    let ad = NotificationRepository::new(state.pool())
        .get_advertisement(id)
        .await
        .map_err(not_found("广告不存在"))?;
    Ok(Json(ad))
}

async fn create_ad(
    State(state): State<AppState>,
    Json(body): Json<AdvertisementInput>,
) -> Result<(StatusCode, Json<Advertisement>)> {
    validate_ad(&body)?;
    let ad = NotificationRepository::new(state.pool())
        .create_advertisement(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(ad)))
}

async fn update_ad(
    State(state): State<AppState>,
    Path(id): Path<AdvertisementId>,
    Json(body): Json<AdvertisementInput>,
) -> Result<Json<Advertisement>> {
    validate_ad(&body)?;
    let ad = NotificationRepository::new(state.pool())
        .update_advertisement(id, &body)
        .await
        .map_err(not_found("广告不存在"))?;
    Ok(Json(ad))
}

async fn toggle_ad(
    State(state): State<AppState>,
    Path(id): Path<AdvertisementId>,
) -> Result<Json<Advertisement>> {
    let ad = NotificationRepository::new(state.pool())
        .toggle_advertisement(id)
        .await
        .map_err(not_found("广告不存在"))?;
    Ok(Json(ad))
}

async fn delete_ad(
    State(state): State<AppState>,
    Path(id): Path<AdvertisementId>,
) -> Result<StatusCode> {
    NotificationRepository::new(state.pool())
        .delete_advertisement(id)
        .await
        .map_err(not_found("广告不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Messages
// =============================================================================

fn validate_message(input: &MessageInput) -> Result<()> {
    if input.title.trim().is_empty() || input.content.trim().is_empty() {
        return Err(AppError::bad_request("消息标题和内容不能为空"));
    }
    Ok(())
}

async fn list_messages(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Message>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .list_messages(page.page())
            .await?,
    ))
}

async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<Message>> {
    let message = NotificationRepository::new(state.pool())
        .get_message(id)
        .await
        .map_err(not_found("消息不存在"))?;
    Ok(Json(message))
}

async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    validate_message(&body)?;
    let message = NotificationRepository::new(state.pool())
        .create_message(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    Json(body): Json<MessageInput>,
) -> Result<Json<Message>> {
    validate_message(&body)?;
    let message = NotificationRepository::new(state.pool())
        .update_message(id, &body)
        .await
        .map_err(not_found("消息不存在"))?;
    Ok(Json(message))
}

async fn toggle_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<Message>> {
    let message = NotificationRepository::new(state.pool())
        .toggle_message(id)
        .await
        .map_err(not_found("消息不存在"))?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<StatusCode> {
    NotificationRepository::new(state.pool())
        .delete_message(id)
        .await
        .map_err(not_found("消息不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct PushRequest {
    #[serde(default)]
    user_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
struct PushResponse {
    message: String,
    count: u64,
}

/// Deliver a message to the listed users, or to every active user when the
/// list is empty. Users who already received it are skipped.
#[tracing::instrument(skip(state, body))]
async fn push_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    body: Option<Json<PushRequest>>,
) -> Result<Json<PushResponse>> {
    let Json(body) = body.unwrap_or_default();
    let repo = NotificationRepository::new(state.pool());
    let message = repo.get_message(id).await.map_err(not_found("消息不存在"))?;
    if !message.is_active {
        return Err(AppError::bad_request("消息已停用，无法推送"));
    }

    let recipients = if body.user_ids.is_empty() {
        UserRepository::new(state.pool()).active_ids().await?
    } else {
        body.user_ids
    };
    let count = repo.push(id, &recipients).await?;
    tracing::info!(count, "message pushed");
    Ok(Json(PushResponse {
        message: format!("已推送给{count}位用户"),
        count,
    }))
}
