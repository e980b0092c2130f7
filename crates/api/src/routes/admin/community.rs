//! Review and post moderation, plus topic management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{CommentId, PostId, TopicId};

use crate::db::Paginated;
use crate::db::comments::CommentRepository;
use crate::db::posts::PostRepository;
use crate::error::{AppError, Result};
use crate::models::community::{Comment, CommentFilter, Post, PostFilter, Topic, TopicInput};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments))
        .route("/comments/{id}", get(get_comment).delete(delete_comment))
        .route("/comments/{id}/approve", post(approve_comment))
        .route("/comments/{id}/reject", post(reject_comment))
        .route("/comments/{id}/reply", post(reply_comment))
        .route("/topics", get(list_topics).post(create_topic))
        .route(
            "/topics/{id}",
            get(get_topic)
                .put(update_topic)
                .patch(update_topic)
                .delete(delete_topic),
        )
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .route("/posts/{id}/approve", post(approve_post))
        .route("/posts/{id}/reject", post(reject_post))
}

// =============================================================================
// Reviews
// =============================================================================

async fn list_comments(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<Paginated<Comment>>> {
    Ok(Json(
        CommentRepository::new(state.pool())
            .list(&filter, None, page.page())
            .await?,
    ))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>> {
    let comment = CommentRepository::new(state.pool())
        .get(id)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(Json(comment))
}

async fn approve_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>> {
    let comment = CommentRepository::new(state.pool())
        .set_approved(id, true)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(Json(comment))
}

/// Hide a review from the product page without deleting it.
async fn reject_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>> {
    let comment = CommentRepository::new(state.pool())
        .set_approved(id, false)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(Json(comment))
}

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    #[serde(default)]
    reply: String,
}

async fn reply_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<Comment>> {
    let reply = body.reply.trim();
    if reply.is_empty() {
        return Err(AppError::bad_request("回复内容不能为空"));
    }
    let comment = CommentRepository::new(state.pool())
        .reply(id, reply)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<StatusCode> {
    CommentRepository::new(state.pool())
        .delete(id, None)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Topics
// =============================================================================

async fn list_topics(State(state): State<AppState>) -> Result<Json<Vec<Topic>>> {
    Ok(Json(PostRepository::new(state.pool()).list_topics(false).await?))
}

async fn get_topic(State(state): State<AppState>, Path(id): Path<TopicId>) -> Result<Json<Topic>> {
    let topic = PostRepository::new(state.pool())
        .get_topic(id)
        .await
        .map_err(not_found("话题不存在"))?;
    Ok(Json(topic))
}

async fn create_topic(
    State(state): State<AppState>,
    Json(body): Json<TopicInput>,
) -> Result<(StatusCode, Json<Topic>)> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("话题名称不能为空"));
    }
    let topic = PostRepository::new(state.pool()).create_topic(&body).await?;
    Ok((StatusCode::CREATED, Json(topic)))
}

async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<TopicId>,
    Json(body): Json<TopicInput>,
) -> Result<Json<Topic>> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("话题名称不能为空"));
    }
    let topic = PostRepository::new(state.pool())
        .update_topic(id, &body)
        .await
        .map_err(not_found("话题不存在"))?;
    Ok(Json(topic))
}

async fn delete_topic(State(state): State<AppState>, Path(id): Path<TopicId>) -> Result<StatusCode> {
    PostRepository::new(state.pool())
        .delete_topic(id)
        .await
        .map_err(not_found("话题不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Posts
// =============================================================================

async fn list_posts(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<PostFilter>,
) -> Result<Json<Paginated<Post>>> {
    Ok(Json(
        PostRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<Json<Post>> {
    let post = PostRepository::new(state.pool())
        .get(id, false)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(post))
}

async fn approve_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<Json<Post>> {
    let post = PostRepository::new(state.pool())
        .set_approved(id, true)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(post))
}

async fn reject_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<Json<Post>> {
    let post = PostRepository::new(state.pool())
        .set_approved(id, false)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(post))
}

async fn delete_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<StatusCode> {
    PostRepository::new(state.pool())
        .delete(id, None)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}
