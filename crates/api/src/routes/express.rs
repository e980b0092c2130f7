//! Shipment tracking and express administration.
//!
//! Customer routes live at `/express/*`. The back-office routes live at
//! `/express/admin/*` behind their own admin guard, since they sit outside
//! the `/admin` nest.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use serde::Deserialize;

use freshmilk_core::{ExpressCode, ExpressCompanyId, ExpressOrderId, OrderId};

use super::MessageResponse;
use crate::db::express::ExpressRepository;
use crate::error::Result;
use crate::middleware::{RequireUser, require_admin};
use crate::models::express::{
    ExpressCompany, ExpressCompanyInput, ExpressCompanySummary, ExpressOrder, ExpressOrderDetail,
};
use crate::services::express::{PickupBooking, PickupDay, Waybill};
use crate::services::not_found;
use crate::services::shipping::ShippingService;
use crate::state::AppState;

/// Build the customer express router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/express/companies", get(companies))
        .route("/express/orders", get(my_shipments))
        .route("/express/orders/{id}/trace", get(trace))
        .route("/express/by-order/{key}", get(by_order))
}

/// Build the admin express router, guarded by [`require_admin`].
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/express/admin/ship/{order_id}", post(ship))
        .route(
            "/express/admin/companies",
            get(list_companies).post(create_company),
        )
        .route(
            "/express/admin/companies/{id}",
            patch(update_company).put(update_company).delete(delete_company),
        )
        .route("/express/admin/trace/{order_id}", post(refresh_trace))
        .route("/express/admin/waybill/{order_id}", get(waybill))
        .route("/express/admin/pickup/{order_id}", post(book_pickup))
        .route("/express/admin/cancel-pickup/{order_id}", post(cancel_pickup))
        .route("/express/admin/pickup-times", get(pickup_times))
        .route("/express/admin/cancel/{order_id}", post(cancel))
        .route_layer(middleware::from_fn(require_admin))
}

fn shipping(state: &AppState) -> ShippingService<'_> {
    ShippingService::new(
        state.pool(),
        state.http(),
        &state.config().sender,
        state.config().demo_mode,
    )
}

// =============================================================================
// Customer
// =============================================================================

async fn companies(State(state): State<AppState>) -> Result<Json<Vec<ExpressCompanySummary>>> {
    Ok(Json(
        ExpressRepository::new(state.pool())
            .list_active_companies()
            .await?,
    ))
}

async fn my_shipments(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<ExpressOrder>>> {
    Ok(Json(
        ExpressRepository::new(state.pool())
            .list_for_user(user.id)
            .await?,
    ))
}

async fn trace(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<ExpressOrderId>,
) -> Result<Json<ExpressOrderDetail>> {
    Ok(Json(shipping(&state).trace(&user, id).await?))
}

/// Tracking by order ID or order number.
async fn by_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(key): Path<String>,
) -> Result<Json<ExpressOrderDetail>> {
    Ok(Json(shipping(&state).by_order(&user, &key).await?))
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ShipRequest {
    company_code: Option<ExpressCode>,
    #[serde(default)]
    remark: String,
}

async fn ship(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    body: Option<Json<ShipRequest>>,
) -> Result<(StatusCode, Json<ExpressOrderDetail>)> {
    let Json(body) = body.unwrap_or_default();
    let detail = shipping(&state)
        .ship(order_id, body.company_code, &body.remark)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_companies(State(state): State<AppState>) -> Result<Json<Vec<ExpressCompany>>> {
    Ok(Json(ExpressRepository::new(state.pool()).list_companies().await?))
}

async fn create_company(
    State(state): State<AppState>,
    Json(body): Json<ExpressCompanyInput>,
) -> Result<(StatusCode, Json<ExpressCompany>)> {
    let company = ExpressRepository::new(state.pool())
        .create_company(&body)
        .await?;
    Ok((StatusCode::CREATED, Json(company)))
}

async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<ExpressCompanyId>,
    Json(body): Json<ExpressCompanyInput>,
) -> Result<Json<ExpressCompany>> {
    let company = ExpressRepository::new(state.pool())
        .update_company(id, &body)
        .await
        .map_err(not_found("快递公司不存在"))?;
    Ok(Json(company))
}

async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<ExpressCompanyId>,
) -> Result<StatusCode> {
    ExpressRepository::new(state.pool())
        .delete_company(id)
        .await
        .map_err(not_found("快递公司不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_trace(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<ExpressOrderDetail>> {
    Ok(Json(shipping(&state).refresh(order_id).await?))
}

async fn waybill(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Waybill>> {
    Ok(Json(shipping(&state).waybill(order_id).await?))
}

#[derive(Debug, Deserialize)]
struct PickupRequest {
    pickup_time: String,
    #[serde(default)]
    remark: String,
}

async fn book_pickup(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    Json(body): Json<PickupRequest>,
) -> Result<Json<PickupBooking>> {
    Ok(Json(
        shipping(&state)
            .book_pickup(order_id, &body.pickup_time, &body.remark)
            .await?,
    ))
}

async fn cancel_pickup(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<MessageResponse>> {
    shipping(&state).cancel_pickup(order_id).await?;
    Ok(Json(MessageResponse::new("已取消预约取件")))
}

#[derive(Debug, Default, Deserialize)]
struct PickupTimesQuery {
    company: Option<ExpressCode>,
}

async fn pickup_times(
    State(state): State<AppState>,
    Query(query): Query<PickupTimesQuery>,
) -> Result<Json<Vec<PickupDay>>> {
    Ok(Json(shipping(&state).pickup_times(query.company).await?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<ExpressOrder>> {
    Ok(Json(shipping(&state).cancel(order_id).await?))
}
