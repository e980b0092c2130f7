//! Courier companies, shipments, and tracking events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use freshmilk_core::{
    ExpressCode, ExpressCompanyId, ExpressOrderId, ExpressStatus, ExpressTraceId, OrderId,
};

use super::user::default_true;

/// A courier company and its API credentials.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpressCompany {
    pub id: ExpressCompanyId,
    pub code: ExpressCode,
    pub name: String,
    pub app_id: String,
    pub app_key: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub customer_code: String,
    pub api_url: String,
    pub is_active: bool,
    pub is_default: bool,
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_province: String,
    pub sender_city: String,
    pub sender_district: String,
    pub sender_address: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ExpressCompany {
    /// Whether enough credentials are stored to call the carrier.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty() && (!self.app_key.is_empty() || !self.app_secret.is_empty())
    }

    /// Sender street address including province, city, and district.
    #[must_use]
    pub fn sender_full_address(&self) -> String {
        format!(
            "{}{}{}{}",
            self.sender_province, self.sender_city, self.sender_district, self.sender_address
        )
    }
}

/// What customers see of a company.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpressCompanySummary {
    pub id: ExpressCompanyId,
    pub code: ExpressCode,
    pub name: String,
    pub is_default: bool,
}

/// Company fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpressCompanyInput {
    pub code: ExpressCode,
    pub name: Option<String>,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub customer_code: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_phone: String,
    #[serde(default)]
    pub sender_province: String,
    #[serde(default)]
    pub sender_city: String,
    #[serde(default)]
    pub sender_district: String,
    #[serde(default)]
    pub sender_address: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// A shipment handed to a courier company.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpressOrder {
    pub id: ExpressOrderId,
    pub order_id: OrderId,
    pub order_no: String,
    pub company_id: Option<ExpressCompanyId>,
    pub company_code: Option<ExpressCode>,
    pub company_name: Option<String>,
    pub express_no: String,
    pub status: ExpressStatus,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub freight: Decimal,
    pub pickup_time: Option<String>,
    pub pickup_code: String,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub collected_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
}

/// A tracking event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpressTrace {
    pub id: ExpressTraceId,
    pub express_order_id: ExpressOrderId,
    pub trace_time: DateTime<Utc>,
    pub status: String,
    pub description: String,
    pub location: String,
}

/// A shipment with its tracking history.
#[derive(Debug, Clone, Serialize)]
pub struct ExpressOrderDetail {
    #[serde(flatten)]
    pub express_order: ExpressOrder,
    pub traces: Vec<ExpressTrace>,
}
