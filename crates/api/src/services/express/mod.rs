//! Courier adapters.
//!
//! Every carrier implements [`ExpressProvider`]: create a shipment, query its
//! tracking events, cancel it, and (where the carrier supports it) render a
//! waybill and book a pickup. [`select_carrier`] decides which adapter serves
//! a company; demo mode and companies without credentials get the
//! deterministic [`mock::MockCarrier`].

pub mod mock;
pub mod sf;
pub mod yto;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use freshmilk_core::{ExpressCode, ExpressStatus};

use crate::config::SenderConfig;
use crate::models::express::ExpressCompany;

/// Errors raised by courier adapters.
#[derive(Debug, Error)]
pub enum ExpressError {
    /// The carrier could not be reached.
    #[error("courier request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The carrier answered with something unreadable.
    #[error("courier response unreadable: {0}")]
    Parse(String),

    /// The carrier refused the request.
    #[error("{0}")]
    Rejected(String),

    /// The operation is unavailable for this carrier or company.
    #[error("{0}")]
    NotConfigured(String),
}

/// Sender or receiver of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Party {
    pub name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub address: String,
}

impl Party {
    /// Province, city, district, and street on one line.
    #[must_use]
    pub fn full_address(&self) -> String {
        format!(
            "{}{}{}{}",
            self.province, self.city, self.district, self.address
        )
    }

    /// Sender details of a company, falling back to `default` when the
    /// company has no sender name.
    #[must_use]
    pub fn sender(company: Option<&ExpressCompany>, default: &SenderConfig) -> Self {
        match company {
            Some(c) if !c.sender_name.trim().is_empty() => Self {
                name: c.sender_name.clone(),
                phone: c.sender_phone.clone(),
                province: c.sender_province.clone(),
                city: c.sender_city.clone(),
                district: c.sender_district.clone(),
                address: c.sender_address.clone(),
            },
            _ => Self {
                name: default.name.clone(),
                phone: default.phone.clone(),
                province: default.province.clone(),
                city: default.city.clone(),
                district: default.district.clone(),
                address: default.address.clone(),
            },
        }
    }
}

/// One line of goods on a shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goods {
    pub name: String,
    pub quantity: i32,
}

/// A shipment to create.
#[derive(Debug, Clone)]
pub struct CreateRequest<'r> {
    pub order_no: &'r str,
    pub sender: &'r Party,
    pub receiver: &'r Party,
    pub goods: &'r [Goods],
    pub remark: &'r str,
}

/// A shipment the carrier accepted.
#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub express_no: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// One tracking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub time: DateTime<Utc>,
    /// Carrier-specific event code, or the status name for the mock.
    pub status: String,
    pub description: String,
    pub location: String,
}

/// Tracking state of a shipment.
#[derive(Debug, Clone, Serialize)]
pub struct Tracking {
    pub status: ExpressStatus,
    pub traces: Vec<TraceEvent>,
}

/// A rendered waybill.
#[derive(Debug, Clone, Serialize)]
pub struct Waybill {
    /// Base64 image data.
    pub image_data: String,
    /// `png` or `svg+xml`.
    pub image_type: String,
}

/// A pickup to book.
#[derive(Debug, Clone)]
pub struct PickupRequest<'r> {
    pub pickup_time: &'r str,
    pub contact: &'r Party,
    pub remark: &'r str,
}

/// A booked pickup.
#[derive(Debug, Clone, Serialize)]
pub struct PickupBooking {
    pub pickup_code: String,
    pub message: String,
}

/// Bookable pickup windows on one day.
#[derive(Debug, Clone, Serialize)]
pub struct PickupDay {
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

/// A courier company API.
#[async_trait]
pub trait ExpressProvider: Send + Sync {
    /// Place a shipment and return its tracking number.
    async fn create_order(&self, request: &CreateRequest<'_>) -> Result<Created, ExpressError>;

    /// Current status and tracking events of a shipment.
    async fn query_trace(&self, express_no: &str) -> Result<Tracking, ExpressError>;

    /// Cancel a shipment.
    async fn cancel_order(&self, express_no: &str) -> Result<(), ExpressError>;

    /// Render the waybill of a shipment.
    async fn waybill(&self, _express_no: &str, _order_no: &str) -> Result<Waybill, ExpressError> {
        Err(unsupported())
    }

    /// Book a courier pickup.
    async fn book_pickup(
        &self,
        _express_no: &str,
        _request: &PickupRequest<'_>,
    ) -> Result<PickupBooking, ExpressError> {
        Err(unsupported())
    }

    /// Cancel a booked pickup.
    async fn cancel_pickup(&self, _express_no: &str) -> Result<(), ExpressError> {
        Err(unsupported())
    }

    /// Bookable pickup windows for an address.
    async fn pickup_times(&self, _address: &str) -> Result<Vec<PickupDay>, ExpressError> {
        Err(unsupported())
    }
}

fn unsupported() -> ExpressError {
    ExpressError::NotConfigured("该快递公司暂不支持此功能".to_owned())
}

/// Which adapter serves a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    Sf,
    Yto,
    Mock,
}

/// Pick the adapter for a company code.
///
/// Demo mode, missing credentials, and carriers without an integration all
/// use the mock.
#[must_use]
pub const fn select_carrier(code: ExpressCode, has_credentials: bool, demo_mode: bool) -> Carrier {
    if demo_mode || !has_credentials {
        return Carrier::Mock;
    }
    match code {
        ExpressCode::Sf => Carrier::Sf,
        ExpressCode::Yto => Carrier::Yto,
        ExpressCode::Zto | ExpressCode::Yd | ExpressCode::Jtsd => Carrier::Mock,
    }
}

/// Build the adapter serving `company`. Without a company the mock answers
/// under `fallback_code`.
#[must_use]
pub fn provider_for(
    company: Option<&ExpressCompany>,
    fallback_code: ExpressCode,
    demo_mode: bool,
    http: &reqwest::Client,
) -> Box<dyn ExpressProvider> {
    let Some(company) = company else {
        return Box::new(mock::MockCarrier::new(fallback_code));
    };
    match select_carrier(company.code, company.has_credentials(), demo_mode) {
        Carrier::Sf => Box::new(sf::SfClient::new(http.clone(), company)),
        Carrier::Yto => Box::new(yto::YtoClient::new(http.clone(), company)),
        Carrier::Mock => Box::new(mock::MockCarrier::new(company.code)),
    }
}

/// Locally generated tracking number used when a carrier call fails:
/// `{CODE}{yyyymmddHHMMSS}{4 digits}`.
#[must_use]
pub fn placeholder_express_no(code: ExpressCode, now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::rng().random_range(1000..10_000);
    format!("{}{}{suffix}", code.as_str(), now.format("%Y%m%d%H%M%S"))
}

/// Parse a carrier timestamp (`YYYY-MM-DD HH:MM:SS`, China time).
#[must_use]
pub fn parse_carrier_time(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let china = FixedOffset::east_opt(8 * 3600)?;
    china
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_carrier() {
        assert_eq!(select_carrier(ExpressCode::Sf, true, false), Carrier::Sf);
        assert_eq!(select_carrier(ExpressCode::Yto, true, false), Carrier::Yto);
        assert_eq!(select_carrier(ExpressCode::Sf, true, true), Carrier::Mock);
        assert_eq!(select_carrier(ExpressCode::Sf, false, false), Carrier::Mock);
        assert_eq!(select_carrier(ExpressCode::Zto, true, false), Carrier::Mock);
    }

    #[test]
    fn test_placeholder_express_no_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 5).unwrap();
        let no = placeholder_express_no(ExpressCode::Yto, now);
        assert!(no.starts_with("YTO20260301083005"));
        assert_eq!(no.len(), "YTO".len() + 14 + 4);
        assert!(no.get(3..).unwrap().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_parse_carrier_time_is_china_time() {
        let t = parse_carrier_time("2026-03-01 08:00:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(parse_carrier_time("yesterday").is_none());
    }

    #[test]
    fn test_sender_falls_back_to_default() {
        let default = SenderConfig::default();
        let party = Party::sender(None, &default);
        assert_eq!(party.name, "鲜奶配送中心");
        assert_eq!(party.full_address(), default.full_address());
    }
}
