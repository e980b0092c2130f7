//! In-house couriers, delivery records, and daily routes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freshmilk_core::{
    DeliveryPersonId, DeliveryPersonStatus, DeliveryRecordId, DeliveryRouteId, DeliveryStatus,
    OrderId, UserId,
};

use super::user::default_true;

/// A courier employed by the shop.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryPerson {
    pub id: DeliveryPersonId,
    pub user_id: Option<UserId>,
    pub employee_no: String,
    pub name: String,
    pub phone: String,
    pub id_card: String,
    pub vehicle_type: String,
    pub delivery_area: String,
    pub status: DeliveryPersonStatus,
    pub total_deliveries: i32,
    pub rating: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Courier fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryPersonInput {
    pub user_id: Option<UserId>,
    pub employee_no: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub id_card: String,
    #[serde(default = "default_vehicle")]
    pub vehicle_type: String,
    #[serde(default)]
    pub delivery_area: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_vehicle() -> String {
    "电动车".to_owned()
}

/// Workload figures for one courier.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryPersonStats {
    pub total_deliveries: i32,
    pub rating: Decimal,
    pub today_total: i64,
    pub today_completed: i64,
}

/// One order assigned to a courier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryRecord {
    pub id: DeliveryRecordId,
    pub order_id: OrderId,
    pub order_no: String,
    pub delivery_person_id: DeliveryPersonId,
    pub delivery_person_name: String,
    pub status: DeliveryStatus,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub assigned_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub remark: String,
    pub customer_remark: String,
}

/// Assignment request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeliveryRecord {
    pub order_id: OrderId,
    pub delivery_person_id: DeliveryPersonId,
    #[serde(default)]
    pub remark: String,
}

/// Filters for delivery record lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryRecordFilter {
    pub status: Option<DeliveryStatus>,
    pub delivery_person: Option<DeliveryPersonId>,
}

/// A courier's route for one day.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryRoute {
    pub id: DeliveryRouteId,
    pub delivery_person_id: DeliveryPersonId,
    pub delivery_person_name: String,
    pub date: NaiveDate,
    pub total_orders: i32,
    /// Recomputed from the route's records on read.
    pub completed_orders: i64,
    pub created_at: DateTime<Utc>,
}

/// A route with its records.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRouteDetail {
    #[serde(flatten)]
    pub route: DeliveryRoute,
    pub records: Vec<DeliveryRecord>,
}

/// Route creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeliveryRoute {
    pub delivery_person_id: DeliveryPersonId,
    pub date: NaiveDate,
    #[serde(default)]
    pub record_ids: Vec<DeliveryRecordId>,
}

/// Filters for route lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryRouteFilter {
    pub date: Option<NaiveDate>,
    pub delivery_person: Option<DeliveryPersonId>,
}
