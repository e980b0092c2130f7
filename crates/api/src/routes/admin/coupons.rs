//! Coupon templates, direct issuing, and promotional activities.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freshmilk_core::{CouponActivityId, CouponId, CouponType, UserId, coupon_code};

use crate::db::Paginated;
use crate::db::coupons::CouponRepository;
use crate::error::{AppError, Result};
use crate::models::coupon::{
    Coupon, CouponActivity, CouponActivityDetail, CouponActivityInput, CouponFilter, CouponInput,
};
use crate::routes::PageQuery;
use crate::services::coupons::CouponService;
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/coupons/{id}",
            get(get_coupon)
                .put(update_coupon)
                .patch(update_coupon)
                .delete(delete_coupon),
        )
        .route("/coupons/{id}/toggle-status", post(toggle_status))
        .route("/coupons/{id}/issue", post(issue))
        .route("/coupon-activities", get(list_activities).post(create_activity))
        .route(
            "/coupon-activities/{id}",
            get(get_activity)
                .put(update_activity)
                .patch(update_activity)
                .delete(delete_activity),
        )
}

fn validate_coupon(input: &CouponInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::bad_request("优惠券名称不能为空"));
    }
    if input.end_time <= input.start_time {
        return Err(AppError::bad_request("结束时间必须晚于开始时间"));
    }
    match input.coupon_type {
        CouponType::Discount => match input.discount_percent {
            Some(p) if p > Decimal::ZERO && p < Decimal::TEN => {}
            _ => return Err(AppError::bad_request("折扣券需要填写0到10之间的折扣")),
        },
        CouponType::Amount => match input.discount_amount {
            Some(a) if a > Decimal::ZERO => {}
            _ => return Err(AppError::bad_request("满减券需要填写优惠金额")),
        },
        CouponType::Shipping => {}
    }
    if input.total_count < 0 || input.per_user_limit < 1 {
        return Err(AppError::bad_request("发放数量或每人限领数量无效"));
    }
    if input.is_exchangeable && input.points_required < 1 {
        return Err(AppError::bad_request("可兑换的优惠券需要设置所需积分"));
    }
    Ok(())
}

async fn list_coupons(
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

async fn get_coupon(State(state): State<AppState>, Path(id): Path<CouponId>) -> Result<Json<Coupon>> {
    let coupon = CouponRepository::new(state.pool())
        .get(id)
        .await
        .map_err(not_found("优惠券不存在"))?;
    Ok(Json(coupon))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(body): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    validate_coupon(&body)?;
    let code = body
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map_or_else(coupon_code, str::to_owned);
    let coupon = CouponRepository::new(state.pool())
        .create(&code, &body)
        .await?;
    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(body): Json<CouponInput>,
) -> Result<Json<Coupon>> {
    validate_coupon(&body)?;
    let coupon = CouponRepository::new(state.pool())
        .update(id, &body)
        .await
        .map_err(not_found("优惠券不存在"))?;
    Ok(Json(coupon))
}

/// Delete a template nobody holds yet.
async fn delete_coupon(State(state): State<AppState>, Path(id): Path<CouponId>) -> Result<StatusCode> {
    CouponRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(not_found("优惠券不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_status(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<Json<Coupon>> {
    let coupon = CouponRepository::new(state.pool())
        .toggle_status(id)
        .await
        .map_err(not_found("优惠券不存在"))?;
    Ok(Json(coupon))
}

#[derive(Debug, Deserialize)]
struct IssueRequest {
    #[serde(default)]
    user_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
struct IssueResponse {
    message: String,
    count: usize,
}

async fn issue(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(body): Json<IssueRequest>,
) -> Result<Json<IssueResponse>> {
    let count = CouponService::new(state.pool())
        .issue(id, &body.user_ids)
        .await?;
    tracing::info!(coupon_id = %id, count, "coupon issued");
    Ok(Json(IssueResponse {
        message: format!("成功发放{count}张优惠券"),
        count,
    }))
}

// =============================================================================
// Activities
// =============================================================================

fn validate_activity(input: &CouponActivityInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::bad_request("活动名称不能为空"));
    }
    if input.end_time <= input.start_time {
        return Err(AppError::bad_request("结束时间必须晚于开始时间"));
    }
    Ok(())
}

async fn list_activities(State(state): State<AppState>) -> Result<Json<Vec<CouponActivity>>> {
    Ok(Json(
        CouponRepository::new(state.pool()).list_activities().await?,
    ))
}

async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<CouponActivityId>,
) -> Result<Json<CouponActivityDetail>> {
    let activity = CouponRepository::new(state.pool())
        .get_activity(id)
        .await
        .map_err(not_found("活动不存在"))?;
    Ok(Json(activity))
}

async fn create_activity(
    State(state): State<AppState>,
    Json(body): Json<CouponActivityInput>,
) -> Result<(StatusCode, Json<CouponActivityDetail>)> {
    validate_activity(&body)?;
    let activity = CouponRepository::new(state.pool())
        .create_activity(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<CouponActivityId>,
    Json(body): Json<CouponActivityInput>,
) -> Result<Json<CouponActivityDetail>> {
    validate_activity(&body)?;
    let activity = CouponRepository::new(state.pool())
        .update_activity(id, &body)
        .await
        .map_err(not_found("活动不存在"))?;
    Ok(Json(activity))
}

async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<CouponActivityId>,
) -> Result<StatusCode> {
    CouponRepository::new(state.pool())
        .delete_activity(id)
        .await
        .map_err(not_found("活动不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}
