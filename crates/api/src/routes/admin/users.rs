//! User accounts, action logs, and membership plans.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{MAX_PLAN_DURATION_DAYS, MembershipPlanId, PointsSource, PointsType, UserId};

use crate::db::membership::MembershipRepository;
use crate::db::users::UserRepository;
use crate::db::{Paginated, points};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::user::{
    MembershipPlan, MembershipPlanInput, PointsChange, PointsRecord, UserFilter, UserLog,
    UserLogFilter, UserView,
};
use crate::routes::PageQuery;
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/toggle-active", post(toggle_active))
        .route("/users/{id}/points-records", get(points_records))
        .route("/users/{id}/adjust-points", post(adjust_points))
        .route("/logs", get(list_logs))
        .route("/membership-plans", get(list_plans).post(create_plan))
        .route(
            "/membership-plans/{id}",
            get(get_plan)
                .put(update_plan)
                .patch(update_plan)
                .delete(delete_plan),
        )
}

async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Paginated<UserView>>> {
    let users = UserRepository::new(state.pool())
        .list(&filter, page.page())
        .await?;
    Ok(Json(users.map(UserView::from)))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<UserView>> {
    let user = UserRepository::new(state.pool())
        .require(id)
        .await
        .map_err(not_found("用户不存在"))?;
    Ok(Json(user.into()))
}

/// Enable or disable an account. Admins cannot disable themselves.
#[tracing::instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn toggle_active(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>> {
    let repo = UserRepository::new(state.pool());
    let user = repo.require(id).await.map_err(not_found("用户不存在"))?;
    if user.id == admin.id && user.is_active {
        return Err(AppError::bad_request("不能禁用自己的账号"));
    }
    let user = repo.set_active(id, !user.is_active).await?;
    tracing::info!(user_id = %id, is_active = user.is_active, "user activity toggled");
    Ok(Json(user.into()))
}

async fn points_records(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<PointsRecord>>> {
    Ok(Json(points::list_for_user(state.pool(), id, page.page()).await?))
}

#[derive(Debug, Deserialize)]
struct AdjustPointsRequest {
    points: i32,
    #[serde(default)]
    remark: String,
}

/// Add or remove points by hand. The balance never drops below zero.
#[tracing::instrument(skip(state, admin, body), fields(admin_id = %admin.id, points = body.points))]
async fn adjust_points(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(body): Json<AdjustPointsRequest>,
) -> Result<(StatusCode, Json<PointsRecord>)> {
    if body.points == 0 {
        return Err(AppError::bad_request("调整积分不能为0"));
    }
    let remark = if body.remark.trim().is_empty() {
        format!("管理员{}调整积分", admin.username)
    } else {
        body.remark.trim().to_owned()
    };

    let mut tx = state.pool().begin().await?;
    let record = points::apply(
        &mut tx,
        &PointsChange {
            user_id: id,
            points: body.points,
            record_type: PointsType::Adjust,
            source: PointsSource::Admin,
            order_id: None,
            subscription_id: None,
            remark,
        },
    )
    .await
    .map_err(not_found("用户不存在"))?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserLogFilter>,
) -> Result<Json<Paginated<UserLog>>> {
    Ok(Json(
        UserRepository::new(state.pool())
            .list_logs(&filter, page.page())
            .await?,
    ))
}

// =============================================================================
// Membership plans
// =============================================================================

fn validate_plan(input: &MembershipPlanInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::bad_request("套餐名称不能为空"));
    }
    if input.duration_days < 1 {
        return Err(AppError::bad_request("有效天数必须大于0"));
    }
    if input.duration_days > MAX_PLAN_DURATION_DAYS {
        return Err(AppError::bad_request(format!(
            "有效天数不能超过{MAX_PLAN_DURATION_DAYS}天"
        )));
    }
    if input.price.is_sign_negative() || input.original_price.is_sign_negative() {
        return Err(AppError::bad_request("价格不能为负数"));
    }
    Ok(())
}

async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<MembershipPlan>>> {
    Ok(Json(MembershipRepository::new(state.pool()).list_plans(false).await?))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<MembershipPlanId>,
) -> Result<Json<MembershipPlan>> {
    let plan = MembershipRepository::new(state.pool())
        .get_plan(id)
        .await
        .map_err(not_found("会员套餐不存在"))?;
    Ok(Json(plan))
}

async fn create_plan(
    State(state): State<AppState>,
    Json(body): Json<MembershipPlanInput>,
) -> Result<(StatusCode, Json<MembershipPlan>)> {
    validate_plan(&body)?;
    let plan = MembershipRepository::new(state.pool())
        .create_plan(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<MembershipPlanId>,
    Json(body): Json<MembershipPlanInput>,
) -> Result<Json<MembershipPlan>> {
    validate_plan(&body)?;
    let plan = MembershipRepository::new(state.pool())
        .update_plan(id, &body)
        .await
        .map_err(not_found("会员套餐不存在"))?;
    Ok(Json(plan))
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<MembershipPlanId>,
) -> Result<StatusCode> {
    MembershipRepository::new(state.pool())
        .delete_plan(id)
        .await
        .map_err(not_found("会员套餐不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use freshmilk_core::MemberLevel;
    use rust_decimal::Decimal;

    use super::*;

    fn plan(duration_days: i32) -> MembershipPlanInput {
        MembershipPlanInput {
            name: "黄金年卡".to_owned(),
            level: MemberLevel::Gold,
            duration_days,
            original_price: Decimal::new(39_900, 2),
            price: Decimal::new(29_900, 2),
            description: String::new(),
            benefits: Vec::new(),
            is_active: true,
            sort_order: 0,
        }
    }

    #[test]
    fn test_plan_duration_bounds() {
        assert!(validate_plan(&plan(365)).is_ok());
        assert!(validate_plan(&plan(MAX_PLAN_DURATION_DAYS)).is_ok());
        assert!(validate_plan(&plan(0)).is_err());
        assert!(validate_plan(&plan(MAX_PLAN_DURATION_DAYS + 1)).is_err());
        assert!(validate_plan(&plan(i32::MAX)).is_err());
    }
}
