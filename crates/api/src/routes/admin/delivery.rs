//! Courier roster, delivery assignments, and daily routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use freshmilk_core::{
    DeliveryPersonId, DeliveryPersonStatus, DeliveryRecordId, DeliveryRouteId, DeliveryStatus,
    Phone,
};

use crate::db::Paginated;
use crate::db::delivery::DeliveryRepository;
use crate::error::{AppError, Result};
use crate::models::delivery::{
    CreateDeliveryRecord, CreateDeliveryRoute, DeliveryPerson, DeliveryPersonInput,
    DeliveryPersonStats, DeliveryRecord, DeliveryRecordFilter, DeliveryRoute, DeliveryRouteDetail,
    DeliveryRouteFilter,
};
use crate::routes::{PageQuery, StatusUpdate};
use crate::services::not_found;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/delivery-persons", get(list_persons).post(create_person))
        .route(
            "/delivery-persons/{id}",
            get(get_person)
                .put(update_person)
                .patch(update_person)
                .delete(delete_person),
        )
        .route("/delivery-persons/{id}/update-status", post(update_person_status))
        .route("/delivery-persons/{id}/statistics", get(person_statistics))
        .route("/delivery-records", get(list_records).post(create_record))
        .route("/delivery-records/{id}", get(get_record))
        .route("/delivery-records/{id}/update-status", post(update_record_status))
        .route("/delivery-routes", get(list_routes).post(create_route))
        .route("/delivery-routes/{id}", get(get_route).delete(delete_route))
}

// =============================================================================
// Couriers
// =============================================================================

fn validate_person(input: &mut DeliveryPersonInput) -> Result<()> {
    if input.employee_no.trim().is_empty() || input.name.trim().is_empty() {
        return Err(AppError::bad_request("工号和姓名不能为空"));
    }
    input.phone = Phone::parse(&input.phone)
        .map_err(|e| AppError::bad_request(e.to_string()))?
        .into_inner();
    Ok(())
}

async fn list_persons(State(state): State<AppState>) -> Result<Json<Vec<DeliveryPerson>>> {
    Ok(Json(DeliveryRepository::new(state.pool()).list_persons().await?))
}

async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<DeliveryPersonId>,
) -> Result<Json<DeliveryPerson>> {
    let person = DeliveryRepository::new(state.pool())
        .get_person(id)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok(Json(person))
}

async fn create_person(
    State(state): State<AppState>,
    Json(mut body): Json<DeliveryPersonInput>,
) -> Result<(StatusCode, Json<DeliveryPerson>)> {
    validate_person(&mut body)?;
    let person = DeliveryRepository::new(state.pool())
        .create_person(&body)
        .await?;
    tracing::info!(courier_id = %person.id, employee_no = %person.employee_no, "courier created");
    Ok((StatusCode::CREATED, Json(person)))
}

async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<DeliveryPersonId>,
    Json(mut body): Json<DeliveryPersonInput>,
) -> Result<Json<DeliveryPerson>> {
    validate_person(&mut body)?;
    let person = DeliveryRepository::new(state.pool())
        .update_person(id, &body)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok(Json(person))
}

/// Couriers with delivery history are kept; the repository reports a conflict.
async fn delete_person(
    State(state): State<AppState>,
    Path(id): Path<DeliveryPersonId>,
) -> Result<StatusCode> {
    DeliveryRepository::new(state.pool())
        .delete_person(id)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_person_status(
    State(state): State<AppState>,
    Path(id): Path<DeliveryPersonId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<DeliveryPerson>> {
    let status: DeliveryPersonStatus = body.parse()?;
    let person = DeliveryRepository::new(state.pool())
        .set_person_status(id, status)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok(Json(person))
}

async fn person_statistics(
    State(state): State<AppState>,
    Path(id): Path<DeliveryPersonId>,
) -> Result<Json<DeliveryPersonStats>> {
    let stats = DeliveryRepository::new(state.pool())
        .person_stats(id)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok(Json(stats))
}

// =============================================================================
// Records
// =============================================================================

async fn list_records(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<DeliveryRecordFilter>,
) -> Result<Json<Paginated<DeliveryRecord>>> {
    Ok(Json(
        DeliveryRepository::new(state.pool())
            .list_records(&filter, page.page())
            .await?,
    ))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<DeliveryRecordId>,
) -> Result<Json<DeliveryRecord>> {
    let record = DeliveryRepository::new(state.pool())
        .get_record(id, None)
        .await
        .map_err(not_found("配送记录不存在"))?;
    Ok(Json(record))
}

/// Assign a paid or shipped order to a courier.
async fn create_record(
    State(state): State<AppState>,
    Json(body): Json<CreateDeliveryRecord>,
) -> Result<(StatusCode, Json<DeliveryRecord>)> {
    let record = DeliveryRepository::new(state.pool())
        .create_record(&body)
        .await
        .map_err(not_found("订单或配送员不存在"))?;
    tracing::info!(
        record_id = %record.id,
        order_no = %record.order_no,
        courier = %record.delivery_person_name,
        "delivery assigned"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record_status(
    State(state): State<AppState>,
    Path(id): Path<DeliveryRecordId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<DeliveryRecord>> {
    let status: DeliveryStatus = body.parse()?;
    let record = DeliveryRepository::new(state.pool())
        .set_record_status(id, status, None)
        .await
        .map_err(not_found("配送记录不存在"))?;
    Ok(Json(record))
}

// =============================================================================
// Routes
// =============================================================================

async fn list_routes(
    State(state): State<AppState>,
    Query(filter): Query<DeliveryRouteFilter>,
) -> Result<Json<Vec<DeliveryRoute>>> {
    Ok(Json(
        DeliveryRepository::new(state.pool())
            .list_routes(&filter)
            .await?,
    ))
}

async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<DeliveryRouteId>,
) -> Result<Json<DeliveryRouteDetail>> {
    let route = DeliveryRepository::new(state.pool())
        .get_route(id)
        .await
        .map_err(not_found("配送路线不存在"))?;
    Ok(Json(route))
}

async fn create_route(
    State(state): State<AppState>,
    Json(body): Json<CreateDeliveryRoute>,
) -> Result<(StatusCode, Json<DeliveryRouteDetail>)> {
    let route = DeliveryRepository::new(state.pool())
        .create_route(&body)
        .await
        .map_err(not_found("配送员不存在"))?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<DeliveryRouteId>,
) -> Result<StatusCode> {
    DeliveryRepository::new(state.pool())
        .delete_route(id)
        .await
        .map_err(not_found("配送路线不存在"))?;
    Ok(StatusCode::NO_CONTENT)
}
