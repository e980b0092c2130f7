//! Profile, password, points, address, and membership handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use freshmilk_core::{
    AddressId, DocumentPrefix, Email, MembershipOrderId, MembershipPlanId, Phone, UserAction,
};

use super::{MessageResponse, PageQuery, log_action};
use crate::db::addresses::AddressRepository;
use crate::db::membership::MembershipRepository;
use crate::db::users::UserRepository;
use crate::db::{Paginated, points};
use crate::error::{AppError, Result};
use crate::middleware::{ClientInfo, RequireUser};
use crate::models::user::{
    Address, AddressInput, MembershipOrder, MembershipPlan, PointsRecord, UpdateProfile, UserView,
};
use crate::services::auth::AuthService;
use crate::services::membership::MembershipService;
use crate::services::not_found;
use crate::state::AppState;

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me).patch(update_me))
        .route("/users/change-password", post(change_password))
        .route("/users/points-records", get(points_records))
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/{id}",
            get(get_address).put(update_address).patch(update_address).delete(delete_address),
        )
        .route("/addresses/{id}/set-default", post(set_default_address))
        .route("/membership/plans", get(list_plans))
        .route("/membership/orders", get(list_membership_orders).post(create_membership_order))
        .route("/membership/orders/{id}", get(get_membership_order))
        .route("/membership/orders/{id}/pay", post(pay_membership_order))
        .route("/membership/orders/{id}/cancel", post(cancel_membership_order))
}

// =============================================================================
// Profile
// =============================================================================

async fn me(State(state): State<AppState>, RequireUser(user): RequireUser) -> Result<Json<UserView>> {
    let user = UserRepository::new(state.pool()).require(user.id).await?;
    Ok(Json(user.into()))
}

/// Update the caller's profile. Phone and email are validated and
/// normalised; an empty string clears nothing.
#[tracing::instrument(skip(state, user, body), fields(user_id = %user.id))]
async fn update_me(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(mut body): Json<UpdateProfile>,
) -> Result<Json<UserView>> {
    if let Some(phone) = body.phone.take().filter(|p| !p.trim().is_empty()) {
        let phone = Phone::parse(&phone).map_err(|e| AppError::bad_request(e.to_string()))?;
        body.phone = Some(phone.into_inner());
    }
    if let Some(email) = body.email.take().filter(|e| !e.trim().is_empty()) {
        let email = Email::parse(&email).map_err(|e| AppError::bad_request(e.to_string()))?;
        body.email = Some(email.as_str().to_owned());
    }
    if body.gender.is_some_and(|g| !(0..=2).contains(&g)) {
        return Err(AppError::bad_request("性别取值无效"));
    }

    let user = UserRepository::new(state.pool())
        .update_profile(user.id, &body)
        .await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    AuthService::new(state.pool(), state.tokens())
        .change_password(user.id, &body.old_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("密码修改成功")))
}

async fn points_records(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<PointsRecord>>> {
    Ok(Json(points::list_for_user(state.pool(), user.id, page.page()).await?))
}

// =============================================================================
// Addresses
// =============================================================================

fn validate_address(input: &AddressInput) -> Result<()> {
    if input.receiver_name.trim().is_empty() || input.detail_address.trim().is_empty() {
        return Err(AppError::bad_request("请填写收货人和详细地址"));
    }
    Phone::parse(&input.receiver_phone).map_err(|e| AppError::bad_request(e.to_string()))?;
    Ok(())
}

async fn list_addresses(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(AddressRepository::new(state.pool()).list(user.id).await?))
}

async fn create_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<AddressInput>,
) -> Result<(StatusCode, Json<Address>)> {
    validate_address(&body)?;
    let address = AddressRepository::new(state.pool())
        .create(user.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn get_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<AddressId>,
) -> Result<Json<Address>> {
    let address = AddressRepository::new(state.pool())
        .get(user.id, id)
        .await
        .map_err(not_found("收货地址不存在"))?;
    Ok(Json(address))
}

async fn update_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<AddressId>,
    Json(body): Json<AddressInput>,
) -> Result<Json<Address>> {
    validate_address(&body)?;
    let address = AddressRepository::new(state.pool())
        .update(user.id, id, &body)
        .await
        .map_err(not_found("收货地址不存在"))?;
    Ok(Json(address))
}

async fn delete_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<AddressId>,
) -> Result<StatusCode> {
    AddressRepository::new(state.pool())
        .delete(user.id, id)
        .await
        .map_err(not_found("收货地址不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<AddressId>,
) -> Result<Json<Address>> {
    let address = AddressRepository::new(state.pool())
        .set_default(user.id, id)
        .await
        .map_err(not_found("收货地址不存在"))?;
    Ok(Json(address))
}

// =============================================================================
// Membership
// =============================================================================

async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<MembershipPlan>>> {
    Ok(Json(MembershipRepository::new(state.pool()).list_plans(true).await?))
}

async fn list_membership_orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<MembershipOrder>>> {
    Ok(Json(
        MembershipRepository::new(state.pool())
            .list_orders(user.id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CreateMembershipOrderRequest {
    plan_id: MembershipPlanId,
}

#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
async fn create_membership_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<CreateMembershipOrderRequest>,
) -> Result<(StatusCode, Json<MembershipOrder>)> {
    let repo = MembershipRepository::new(state.pool());
    let plan = repo
        .get_plan(body.plan_id)
        .await
        .map_err(not_found("会员套餐不存在或已下架"))?;
    if !plan.is_active {
        return Err(AppError::not_found("会员套餐不存在或已下架"));
    }

    let order = repo
        .create_order(&DocumentPrefix::Membership.generate(), user.id, &plan)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_membership_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<MembershipOrderId>,
) -> Result<Json<MembershipOrder>> {
    let order = MembershipRepository::new(state.pool())
        .get_order(user.id, id)
        .await
        .map_err(not_found("会员订单不存在"))?;
    Ok(Json(order))
}

async fn pay_membership_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    client: ClientInfo,
    Path(id): Path<MembershipOrderId>,
) -> Result<Json<MembershipOrder>> {
    let order = MembershipService::new(state.pool()).pay(&user, id).await?;
    log_action(&state, user.id, UserAction::Pay, &client).await;
    Ok(Json(order))
}

async fn cancel_membership_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<MembershipOrderId>,
) -> Result<Json<MembershipOrder>> {
    let order = MembershipRepository::new(state.pool())
        .cancel_order(user.id, id)
        .await
        .map_err(not_found("会员订单不存在"))?;
    Ok(Json(order))
}
