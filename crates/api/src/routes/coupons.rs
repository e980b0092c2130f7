//! Coupon, activity, and user coupon handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;

use freshmilk_core::{CouponId, OrderId, UserCouponId, UserCouponStatus};

use super::PageQuery;
use crate::db::Paginated;
use crate::db::coupons::CouponRepository;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::coupon::{Coupon, CouponActivityDetail, CouponFilter, UsableCoupon, UserCoupon};
use crate::services::coupons::CouponService;
use crate::state::AppState;

/// Build the coupons router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/coupons", get(list))
        .route("/coupons/available", get(available))
        .route("/coupons/exchangeable", get(exchangeable))
        .route("/coupon-activities/current", get(current_activities))
        .route("/user-coupons", get(user_coupons))
        .route("/user-coupons/receive", post(receive))
        .route("/user-coupons/usable", get(usable))
        .route("/user-coupons/exchange", post(exchange))
        .route("/user-coupons/{id}/use", post(use_coupon))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<CouponFilter>,
) -> Result<Json<Paginated<Coupon>>> {
    Ok(Json(
        CouponRepository::new(state.pool())
            .list(&filter, page.page())
            .await?,
    ))
}

async fn available(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(CouponRepository::new(state.pool()).available().await?))
}

async fn exchangeable(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(CouponRepository::new(state.pool()).exchangeable().await?))
}

async fn current_activities(
    State(state): State<AppState>,
) -> Result<Json<Vec<CouponActivityDetail>>> {
    Ok(Json(
        CouponRepository::new(state.pool())
            .current_activities()
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct UserCouponFilter {
    status: Option<UserCouponStatus>,
}

/// The caller's coupons. Lapsed unused coupons are stored as expired first.
async fn user_coupons(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserCouponFilter>,
) -> Result<Json<Paginated<UserCoupon>>> {
    Ok(Json(
        CouponRepository::new(state.pool())
            .list_for_user(user.id, filter.status, page.page())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CouponRequest {
    coupon_id: CouponId,
}

async fn receive(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CouponRequest>,
) -> Result<(StatusCode, Json<UserCoupon>)> {
    let coupon = CouponService::new(state.pool())
        .receive(user.id, body.coupon_id)
        .await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// Buy a coupon with points.
async fn exchange(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CouponRequest>,
) -> Result<(StatusCode, Json<UserCoupon>)> {
    let coupon = CouponService::new(state.pool())
        .exchange(user.id, body.coupon_id)
        .await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

#[derive(Debug, Deserialize)]
struct UsableQuery {
    #[serde(default)]
    amount: Decimal,
}

async fn usable(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<UsableQuery>,
) -> Result<Json<Vec<UsableCoupon>>> {
    Ok(Json(
        CouponService::new(state.pool())
            .usable(user.id, query.amount)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct UseCouponRequest {
    order_id: OrderId,
}

async fn use_coupon(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<UserCouponId>,
    Json(body): Json<UseCouponRequest>,
) -> Result<Json<UserCoupon>> {
    Ok(Json(
        CouponService::new(state.pool())
            .use_coupon(user.id, id, body.order_id)
            .await?,
    ))
}
