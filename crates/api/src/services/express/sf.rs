//! SF Express open-platform adapter.
//!
//! Requests are form posts carrying `msgData` (JSON) and
//! `msgDigest = base64(md5(msgData + timestamp + checkword))`.
//! `apiResultCode == "A1000"` marks success.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use md5::{Digest, Md5};
use serde_json::{Value, json};
use tracing::instrument;
use uuid::Uuid;

use freshmilk_core::ExpressStatus;

use super::{
    CreateRequest, Created, ExpressError, ExpressProvider, PickupBooking, PickupDay,
    PickupRequest, TraceEvent, Tracking, Waybill, parse_carrier_time,
};
use crate::models::express::ExpressCompany;

const PROD_URL: &str = "https://bspgw.sf-express.com/std/service";
const SUCCESS: &str = "A1000";

/// SF Express client.
pub struct SfClient {
    http: reqwest::Client,
    partner_id: String,
    checkword: String,
    monthly_card: String,
    api_url: String,
}

impl SfClient {
    /// Build a client from a company's credentials.
    #[must_use]
    pub fn new(http: reqwest::Client, company: &ExpressCompany) -> Self {
        let api_url = if company.api_url.is_empty() {
            PROD_URL.to_owned()
        } else {
            company.api_url.clone()
        };
        Self {
            http,
            partner_id: company.app_id.clone(),
            checkword: company.app_secret.clone(),
            monthly_card: company.customer_code.clone(),
            api_url,
        }
    }

    async fn call(&self, service_code: &str, msg_data: &Value) -> Result<Value, ExpressError> {
        let msg_data = msg_data.to_string();
        let timestamp = Utc::now().timestamp().to_string();
        let digest = sign(&msg_data, &timestamp, &self.checkword);
        let request_id = Uuid::new_v4().simple().to_string();

        let body: Value = self
            .http
            .post(&self.api_url)
            .form(&[
                ("partnerID", self.partner_id.as_str()),
                ("requestID", request_id.as_str()),
                ("serviceCode", service_code),
                ("timestamp", timestamp.as_str()),
                ("msgDigest", digest.as_str()),
                ("msgData", msg_data.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        if body.get("apiResultCode").and_then(Value::as_str) != Some(SUCCESS) {
            let message = body
                .get("apiErrorMsg")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("顺丰接口调用失败")
                .to_owned();
            tracing::warn!(service_code, %message, "sf request rejected");
            return Err(ExpressError::Rejected(message));
        }

        result_data(&body)
    }
}

/// `msgDigest` for a request.
#[must_use]
pub fn sign(msg_data: &str, timestamp: &str, checkword: &str) -> String {
    let digest = Md5::digest(format!("{msg_data}{timestamp}{checkword}").as_bytes());
    STANDARD.encode(digest)
}

/// `apiResultData` arrives either as an object or as a JSON string.
fn result_data(body: &Value) -> Result<Value, ExpressError> {
    match body.get("apiResultData") {
        Some(Value::String(s)) => {
            serde_json::from_str(s).map_err(|e| ExpressError::Parse(e.to_string()))
        }
        Some(other) => Ok(other.clone()),
        None => Ok(Value::Null),
    }
}

/// Shipment status implied by an SF route operation code.
#[must_use]
pub fn status_for_op_code(op_code: &str) -> Option<ExpressStatus> {
    match op_code {
        "50" | "51" => Some(ExpressStatus::Collected),
        "30" | "31" | "36" => Some(ExpressStatus::InTransit),
        "44" | "45" => Some(ExpressStatus::Delivering),
        "80" => Some(ExpressStatus::Signed),
        _ => None,
    }
}

fn str_field<'v>(value: &'v Value, key: &str) -> &'v str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Turn a route query result into tracking state. Routes run oldest first.
fn parse_routes(data: &Value) -> Tracking {
    let routes = data
        .pointer("/routeResps/0/routes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut status = ExpressStatus::Created;
    let mut traces = Vec::with_capacity(routes.len());
    for route in &routes {
        let op_code = str_field(route, "opCode");
        if let Some(next) = status_for_op_code(op_code) {
            status = next;
        }
        let Some(time) = parse_carrier_time(str_field(route, "acceptTime")) else {
            continue;
        };
        traces.push(TraceEvent {
            time,
            status: op_code.to_owned(),
            description: str_field(route, "remark").to_owned(),
            location: str_field(route, "acceptAddress").to_owned(),
        });
    }
    traces.reverse();
    Tracking { status, traces }
}

#[async_trait]
impl ExpressProvider for SfClient {
    #[instrument(skip(self, request), fields(order_no = request.order_no))]
    async fn create_order(&self, request: &CreateRequest<'_>) -> Result<Created, ExpressError> {
        let contact = |kind: u8, party: &super::Party| {
            json!({
                "contactType": kind,
                "contact": party.name,
                "tel": party.phone,
                "province": party.province,
                "city": party.city,
                "county": party.district,
                "address": party.address,
            })
        };
        let cargo: Vec<Value> = request
            .goods
            .iter()
            .map(|g| json!({ "name": g.name, "count": g.quantity }))
            .collect();

        let data = self
            .call(
                "EXP_RECE_CREATE_ORDER",
                &json!({
                    "language": "zh-CN",
                    "orderId": request.order_no,
                    "cargoDetails": cargo,
                    "monthlyCard": self.monthly_card,
                    "payMethod": 1,
                    "expressTypeId": 2,
                    "isReturnRoutelabel": 1,
                    "contactInfoList": [contact(1, request.sender), contact(2, request.receiver)],
                    "remark": request.remark,
                }),
            )
            .await?;

        let express_no = data
            .pointer("/waybillNoInfoList/0/waybillNo")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExpressError::Parse("missing waybillNo".to_owned()))?
            .to_owned();

        Ok(Created {
            express_no,
            message: "下单成功".to_owned(),
            data,
        })
    }

    #[instrument(skip(self))]
    async fn query_trace(&self, express_no: &str) -> Result<Tracking, ExpressError> {
        let data = self
            .call(
                "EXP_RECE_SEARCH_ROUTES",
                &json!({
                    "language": "zh-CN",
                    "trackingType": 1,
                    "trackingNumber": [express_no],
                    "methodType": 1,
                }),
            )
            .await?;
        Ok(parse_routes(&data))
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, express_no: &str) -> Result<(), ExpressError> {
        self.call(
            "EXP_RECE_UPDATE_ORDER",
            &json!({ "language": "zh-CN", "orderId": express_no, "dealType": 2 }),
        )
        .await?;
        Ok(())
    }

    async fn waybill(&self, express_no: &str, order_no: &str) -> Result<Waybill, ExpressError> {
        let data = self
            .call(
                "EXP_RECE_SEARCH_WAYBILL_IMAGE",
                &json!({
                    "language": "zh-CN",
                    "waybillNo": express_no,
                    "orderId": order_no,
                    "imageType": 1,
                    "imageSize": "180x180",
                }),
            )
            .await?;
        let image = data
            .pointer("/images/0/image")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExpressError::Rejected("未获取到面单图片".to_owned()))?;
        Ok(Waybill {
            image_data: image.to_owned(),
            image_type: "png".to_owned(),
        })
    }

    async fn book_pickup(
        &self,
        express_no: &str,
        request: &PickupRequest<'_>,
    ) -> Result<PickupBooking, ExpressError> {
        let remark = if request.remark.is_empty() {
            "请准时上门取件"
        } else {
            request.remark
        };
        let data = self
            .call(
                "EXP_RECE_CREATE_PICKUP",
                &json!({
                    "language": "zh-CN",
                    "orderId": express_no,
                    "expectPickupTime": request.pickup_time,
                    "contactName": request.contact.name,
                    "contactPhone": request.contact.phone,
                    "pickupAddress": request.contact.full_address(),
                    "remark": remark,
                }),
            )
            .await?;
        Ok(PickupBooking {
            pickup_code: str_field(&data, "pickupCode").to_owned(),
            message: "预约成功，快递员将在预约时间上门取件".to_owned(),
        })
    }

    async fn cancel_pickup(&self, express_no: &str) -> Result<(), ExpressError> {
        self.call(
            "EXP_RECE_CANCEL_PICKUP",
            &json!({ "language": "zh-CN", "orderId": express_no }),
        )
        .await?;
        Ok(())
    }

    async fn pickup_times(&self, address: &str) -> Result<Vec<PickupDay>, ExpressError> {
        let data = self
            .call(
                "EXP_RECE_SEARCH_PICKUP_TIME",
                &json!({ "language": "zh-CN", "address": address }),
            )
            .await?;
        let days = data
            .get("pickupTimeList")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|day| {
                        let date = chrono::NaiveDate::parse_from_str(str_field(day, "date"), "%Y-%m-%d").ok()?;
                        let slots = day
                            .get("slots")
                            .and_then(Value::as_array)
                            .map(|s| s.iter().filter_map(Value::as_str).map(str::to_owned).collect())
                            .unwrap_or_default();
                        Some(PickupDay { date, slots })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_matches_reference_digest() {
        assert_eq!(
            sign(r#"{"orderId":"FM1"}"#, "1700000000", "checkword123"),
            "66AFHPna1o7SGs1e8qsMdw=="
        );
    }

    #[test]
    fn test_status_for_op_code() {
        assert_eq!(status_for_op_code("50"), Some(ExpressStatus::Collected));
        assert_eq!(status_for_op_code("36"), Some(ExpressStatus::InTransit));
        assert_eq!(status_for_op_code("44"), Some(ExpressStatus::Delivering));
        assert_eq!(status_for_op_code("80"), Some(ExpressStatus::Signed));
        assert_eq!(status_for_op_code("99"), None);
    }

    #[test]
    fn test_parse_routes_tracks_latest_status() {
        let data = json!({
            "routeResps": [{
                "routes": [
                    { "opCode": "50", "acceptTime": "2026-03-01 09:00:00", "remark": "已揽件", "acceptAddress": "上海" },
                    { "opCode": "30", "acceptTime": "2026-03-01 18:00:00", "remark": "运输中", "acceptAddress": "杭州" },
                    { "opCode": "44", "acceptTime": "2026-03-02 08:00:00", "remark": "派送中", "acceptAddress": "杭州" }
                ]
            }]
        });
        let tracking = parse_routes(&data);
        assert_eq!(tracking.status, ExpressStatus::Delivering);
        assert_eq!(tracking.traces.len(), 3);
        assert_eq!(tracking.traces.first().map(|t| t.status.as_str()), Some("44"));
    }

    #[test]
    fn test_parse_routes_without_routes_is_created() {
        let tracking = parse_routes(&json!({ "routeResps": [] }));
        assert_eq!(tracking.status, ExpressStatus::Created);
        assert!(tracking.traces.is_empty());
    }

    #[test]
    fn test_result_data_accepts_string_payload() {
        let body = json!({ "apiResultCode": "A1000", "apiResultData": "{\"a\":1}" });
        assert_eq!(result_data(&body).ok(), Some(json!({ "a": 1 })));
    }
}
