//! Courier self-service handlers.
//!
//! Only users linked to an active delivery person get past
//! [`RequireCourier`]; every lookup is scoped to that courier.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use freshmilk_core::{DeliveryRecordId, DeliveryStatus};

use super::{PageQuery, StatusUpdate};
use crate::db::Paginated;
use crate::db::delivery::DeliveryRepository;
use crate::error::Result;
use crate::middleware::RequireCourier;
use crate::models::delivery::{
    DeliveryPerson, DeliveryPersonStats, DeliveryRecord, DeliveryRecordFilter,
};
use crate::services::not_found;
use crate::state::AppState;

/// Build the courier router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/delivery/me", get(me))
        .route("/delivery/me/records", get(my_records))
        .route("/delivery/records/{id}/status", post(update_status))
}

#[derive(Debug, Serialize)]
struct CourierProfile {
    #[serde(flatten)]
    person: DeliveryPerson,
    statistics: DeliveryPersonStats,
}

async fn me(
    State(state): State<AppState>,
    courier: RequireCourier,
) -> Result<Json<CourierProfile>> {
    let repo = DeliveryRepository::new(state.pool());
    let person = repo
        .get_person(courier.courier_id)
        .await
        .map_err(not_found("配送员不存在"))?;
    let statistics = repo.person_stats(courier.courier_id).await?;
    Ok(Json(CourierProfile { person, statistics }))
}

#[derive(Debug, Default, Deserialize)]
struct RecordStatusFilter {
    status: Option<DeliveryStatus>,
}

async fn my_records(
    State(state): State<AppState>,
    courier: RequireCourier,
    Query(page): Query<PageQuery>,
    Query(filter): Query<RecordStatusFilter>,
) -> Result<Json<Paginated<DeliveryRecord>>> {
    let filter = DeliveryRecordFilter {
        status: filter.status,
        delivery_person: Some(courier.courier_id),
    };
    Ok(Json(
        DeliveryRepository::new(state.pool())
            .list_records(&filter, page.page())
            .await?,
    ))
}

#[tracing::instrument(skip(state, courier, body), fields(courier_id = %courier.courier_id))]
async fn update_status(
    State(state): State<AppState>,
    courier: RequireCourier,
    Path(id): Path<DeliveryRecordId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<DeliveryRecord>> {
    let status: DeliveryStatus = body.parse()?;
    let record = DeliveryRepository::new(state.pool())
        .set_record_status(id, status, Some(courier.courier_id))
        .await
        .map_err(not_found("配送记录不存在"))?;
    Ok(Json(record))
}
