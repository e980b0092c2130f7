//! Product reviews, topics, and community posts.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Serialize;

use freshmilk_core::{CommentId, OrderStatus, PostId};

use super::PageQuery;
use crate::db::Paginated;
use crate::db::comments::{CommentRepository, LikeState};
use crate::db::orders::OrderRepository;
use crate::db::posts::PostRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::community::{
    Comment, CommentFilter, CreateComment, CreatePost, Post, PostFilter, Topic,
};
use crate::services::not_found;
use crate::state::AppState;

/// Build the community router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .route("/comments/my", get(my_comments))
        .route("/comments/{id}", delete(delete_comment))
        .route("/comments/{id}/like", post(like_comment))
        .route("/topics", get(list_topics))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .route("/posts/{id}/like", post(like_post))
        .route("/posts/{id}/unlike", post(unlike_post))
}

// =============================================================================
// Reviews
// =============================================================================

/// Approved reviews, optionally for one product. Anonymous authors are masked.
async fn list_comments(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<Paginated<Comment>>> {
    let filter = CommentFilter {
        product_id: filter.product_id,
        is_approved: Some(true),
        ..CommentFilter::default()
    };
    let comments = CommentRepository::new(state.pool())
        .list(&filter, None, page.page())
        .await?;
    Ok(Json(comments.map(Comment::masked)))
}

async fn my_comments(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Comment>>> {
    Ok(Json(
        CommentRepository::new(state.pool())
            .list(&CommentFilter::default(), Some(user.id), page.page())
            .await?,
    ))
}

/// Review a product from one of the caller's finished orders.
#[tracing::instrument(skip(state, user, body), fields(user_id = %user.id, order_id = %body.order_id))]
async fn create_comment(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    if !(1..=5).contains(&body.rating) {
        return Err(AppError::bad_request("评分必须在1到5之间"));
    }
    if body.content.trim().is_empty() {
        return Err(AppError::bad_request("评价内容不能为空"));
    }

    let orders = OrderRepository::new(state.pool());
    let order = orders
        .get_for_user(user.id, body.order_id)
        .await
        .map_err(not_found("订单不存在"))?;
    if !matches!(order.status, OrderStatus::Completed | OrderStatus::Delivered) {
        return Err(AppError::bad_request("只能评价已完成的订单"));
    }
    if !orders.contains_product(order.id, body.product_id).await? {
        return Err(AppError::bad_request("该订单中没有此商品"));
    }

    let comment = CommentRepository::new(state.pool())
        .create(user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn like_comment(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<CommentId>,
) -> Result<Json<LikeState>> {
    let like = CommentRepository::new(state.pool())
        .toggle_like(user.id, id)
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(Json(like))
}

async fn delete_comment(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<CommentId>,
) -> Result<StatusCode> {
    CommentRepository::new(state.pool())
        .delete(id, Some(user.id))
        .await
        .map_err(not_found("评价不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Topics and posts
// =============================================================================

async fn list_topics(State(state): State<AppState>) -> Result<Json<Vec<Topic>>> {
    Ok(Json(PostRepository::new(state.pool()).list_topics(true).await?))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(mut filter): Query<PostFilter>,
) -> Result<Json<Paginated<Post>>> {
    filter.is_approved = Some(true);
    Ok(Json(
        PostRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Result<Json<Post>> {
    let post = PostRepository::new(state.pool())
        .get(id, true)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(post))
}

async fn create_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreatePost>,
) -> Result<(StatusCode, Json<Post>)> {
    if body.content.trim().is_empty() {
        return Err(AppError::bad_request("帖子内容不能为空"));
    }
    let post = PostRepository::new(state.pool())
        .create(user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn delete_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<PostId>,
) -> Result<StatusCode> {
    PostRepository::new(state.pool())
        .delete(id, Some(user.id))
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct LikesResponse {
    likes: i32,
}

/// Like a post. Liking twice changes nothing.
async fn like_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<PostId>,
) -> Result<Json<LikesResponse>> {
    let likes = PostRepository::new(state.pool())
        .like(user.id, id)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(LikesResponse { likes }))
}

async fn unlike_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<PostId>,
) -> Result<Json<LikesResponse>> {
    let likes = PostRepository::new(state.pool())
        .unlike(user.id, id)
        .await
        .map_err(not_found("帖子不存在"))?;
    Ok(Json(LikesResponse { likes }))
}
