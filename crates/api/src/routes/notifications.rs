//! Advertisements, announcements, and the user inbox.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{AdPosition, AdvertisementId, UserMessageId};

use super::PageQuery;
use crate::db::Paginated;
use crate::db::notifications::NotificationRepository;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::notification::{Advertisement, Message, UserMessage};
use crate::services::not_found;
use crate::state::AppState;

/// Build the notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/advertisements", get(advertisements))
        .route("/advertisements/{id}/click", post(click))
        .route("/messages/announcements", get(announcements))
        .route("/user-messages", get(inbox))
        .route("/user-messages/read-all", post(read_all))
        .route("/user-messages/unread-count", get(unread_count))
        .route("/user-messages/{id}/read", post(read))
}

#[derive(Debug, Default, Deserialize)]
struct PositionQuery {
    position: Option<AdPosition>,
}

/// Active advertisements inside their display window.
async fn advertisements(
    State(state): State<AppState>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<Vec<Advertisement>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .live_advertisements(query.position)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
struct ClickResponse {
    click_count: i32,
}

async fn click(
    State(state): State<AppState>,
    Path(id): Path<AdvertisementId>,
) -> Result<Json<ClickResponse>> {
    let click_count = NotificationRepository::new(state.pool())
        .click(id)
        .await
        .map_err(not_found("广告不存在"))?;
    Ok(Json(ClickResponse { click_count }))
}

async fn announcements(State(state): State<AppState>) -> Result<Json<Vec<Message>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .announcements()
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct InboxFilter {
    is_read: Option<bool>,
}

async fn inbox(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<InboxFilter>,
) -> Result<Json<Paginated<UserMessage>>> {
    Ok(Json(
        NotificationRepository::new(state.pool())
            .inbox(user.id, filter.is_read, page.page())
            .await?,
    ))
}

async fn read(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<UserMessageId>,
) -> Result<Json<UserMessage>> {
    let message = NotificationRepository::new(state.pool())
        .mark_read(user.id, id)
        .await
        .map_err(not_found("消息不存在"))?;
    Ok(Json(message))
}

#[derive(Debug, Serialize)]
struct ReadAllResponse {
    message: String,
    count: u64,
}

async fn read_all(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ReadAllResponse>> {
    let count = NotificationRepository::new(state.pool())
        .mark_all_read(user.id)
        .await?;
    Ok(Json(ReadAllResponse {
        message: format!("已将{count}条消息标记为已读"),
        count,
    }))
}

#[derive(Debug, Serialize)]
struct UnreadCount {
    count: i64,
}

async fn unread_count(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<UnreadCount>> {
    let count = NotificationRepository::new(state.pool())
        .unread_count(user.id)
        .await?;
    Ok(Json(UnreadCount { count }))
}
