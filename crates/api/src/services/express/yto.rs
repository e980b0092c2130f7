//! YTO Express open-platform adapter.
//!
//! Parameters are signed with
//! `upper(md5(secret + k1 + v1 + k2 + v2 + ... + secret))` over the keys in
//! ascending order. Business payloads travel as a JSON string in `param`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use md5::{Digest, Md5};
use serde_json::{Value, json};
use tracing::instrument;

use freshmilk_core::ExpressStatus;

use super::{
    CreateRequest, Created, ExpressError, ExpressProvider, Party, TraceEvent, Tracking,
    parse_carrier_time,
};
use crate::models::express::ExpressCompany;

const PROD_URL: &str = "https://openapi.yto.net.cn/open/api";

/// YTO Express client.
pub struct YtoClient {
    http: reqwest::Client,
    app_key: String,
    app_secret: String,
    customer_code: String,
    api_url: String,
}

impl YtoClient {
    /// Build a client from a company's credentials.
    ///
    /// YTO issues an app key rather than an app id; either column is
    /// accepted.
    #[must_use]
    pub fn new(http: reqwest::Client, company: &ExpressCompany) -> Self {
        let app_key = if company.app_key.is_empty() {
            company.app_id.clone()
        } else {
            company.app_key.clone()
        };
        let api_url = if company.api_url.is_empty() {
            PROD_URL.to_owned()
        } else {
            company.api_url.clone()
        };
        Self {
            http,
            app_key,
            app_secret: company.app_secret.clone(),
            customer_code: company.customer_code.clone(),
            api_url,
        }
    }

    async fn call(&self, method: &str, param: &Value) -> Result<Value, ExpressError> {
        let china = FixedOffset::east_opt(8 * 3600)
            .ok_or_else(|| ExpressError::Parse("invalid offset".to_owned()))?;
        let timestamp = Utc::now()
            .with_timezone(&china)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        params.insert("app_key", self.app_key.clone());
        params.insert("method", method.to_owned());
        params.insert("timestamp", timestamp);
        params.insert("format", "JSON".to_owned());
        params.insert("v", "1.0".to_owned());
        params.insert("param", param.to_string());
        let signature = sign(&params, &self.app_secret);
        params.insert("sign", signature);

        let body: Value = self
            .http
            .post(&self.api_url)
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("errorMsg")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("圆通接口调用失败")
                .to_owned();
            tracing::warn!(method, %message, "yto request rejected");
            return Err(ExpressError::Rejected(message));
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Signature over the request parameters, excluding `sign` itself.
#[must_use]
pub fn sign(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let mut plain = String::from(secret);
    for (key, value) in params.iter().filter(|(k, _)| **k != "sign") {
        plain.push_str(key);
        plain.push_str(value);
    }
    plain.push_str(secret);
    hex::encode_upper(Md5::digest(plain.as_bytes()))
}

/// Shipment status implied by a YTO scan type.
#[must_use]
pub fn status_for_scan(scan_type: &str) -> Option<ExpressStatus> {
    match scan_type {
        "GOT" => Some(ExpressStatus::Collected),
        "ARRIVAL" | "DEPARTURE" => Some(ExpressStatus::InTransit),
        "SENT_SCAN" => Some(ExpressStatus::Delivering),
        "SIGNED" => Some(ExpressStatus::Signed),
        _ => None,
    }
}

fn str_field<'v>(value: &'v Value, key: &str) -> &'v str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn party_json(party: &Party) -> Value {
    json!({
        "name": party.name,
        "phone": party.phone,
        "mobile": party.phone,
        "prov": party.province,
        "city": party.city,
        "county": party.district,
        "address": party.address,
    })
}

/// Turn a trace query result into tracking state. Scans run oldest first.
fn parse_traces(data: &Value) -> Tracking {
    let scans = data
        .get("traces")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut status = ExpressStatus::Created;
    let mut traces = Vec::with_capacity(scans.len());
    for scan in &scans {
        let scan_type = str_field(scan, "scanType");
        if let Some(next) = status_for_scan(scan_type) {
            status = next;
        }
        let Some(time) = parse_carrier_time(str_field(scan, "scanTime")) else {
            continue;
        };
        traces.push(TraceEvent {
            time,
            status: scan_type.to_owned(),
            description: str_field(scan, "desc").to_owned(),
            location: str_field(scan, "scanStation").to_owned(),
        });
    }
    traces.reverse();
    Tracking { status, traces }
}

#[async_trait]
impl ExpressProvider for YtoClient {
    #[instrument(skip(self, request), fields(order_no = request.order_no))]
    async fn create_order(&self, request: &CreateRequest<'_>) -> Result<Created, ExpressError> {
        let item_name = request
            .goods
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join("、");
        let quantity: i32 = request.goods.iter().map(|g| g.quantity).sum();

        let data = self
            .call(
                "yto.open.order.create",
                &json!({
                    "clientID": self.customer_code,
                    "logisticProviderID": "YTO",
                    "txLogisticID": request.order_no,
                    "tradeNo": request.order_no,
                    "totalServiceFee": 0,
                    "codSplitFee": 0,
                    "sender": party_json(request.sender),
                    "receiver": party_json(request.receiver),
                    "itemsValue": 0,
                    "items": [{ "itemName": item_name, "number": quantity, "itemValue": 0 }],
                    "special": 0,
                    "remark": request.remark,
                }),
            )
            .await?;

        let express_no = data
            .get("waybillNo")
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
            .call("yto.open.waybill.trace.query", &json!({ "waybillNo": express_no }))
            .await?;
        Ok(parse_traces(&data))
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, express_no: &str) -> Result<(), ExpressError> {
        self.call(
            "yto.open.order.cancel",
            &json!({ "waybillNo": express_no, "reason": "商户取消" }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_matches_reference_digest() {
        let mut params = BTreeMap::new();
        params.insert("app_key", "k1".to_owned());
        params.insert("method", "yto.open.order.cancel".to_owned());
        params.insert("timestamp", "2026-03-01 08:00:00".to_owned());
        params.insert("format", "JSON".to_owned());
        params.insert("v", "1.0".to_owned());
        params.insert("param", r#"{"waybillNo":"YT1"}"#.to_owned());
        assert_eq!(sign(&params, "sec"), "C592447E875E3F960A01A9B151AC4DD2");

        params.insert("sign", "ignored".to_owned());
        assert_eq!(sign(&params, "sec"), "C592447E875E3F960A01A9B151AC4DD2");
    }

    #[test]
    fn test_status_for_scan() {
        assert_eq!(status_for_scan("GOT"), Some(ExpressStatus::Collected));
        assert_eq!(status_for_scan("DEPARTURE"), Some(ExpressStatus::InTransit));
        assert_eq!(status_for_scan("SENT_SCAN"), Some(ExpressStatus::Delivering));
        assert_eq!(status_for_scan("SIGNED"), Some(ExpressStatus::Signed));
        assert_eq!(status_for_scan("OTHER"), None);
    }

    #[test]
    fn test_parse_traces_newest_first() {
        let data = json!({
            "traces": [
                { "scanType": "GOT", "scanTime": "2026-03-01 09:00:00", "desc": "已揽收", "scanStation": "上海" },
                { "scanType": "SIGNED", "scanTime": "2026-03-02 12:00:00", "desc": "已签收", "scanStation": "杭州" }
            ]
        });
        let tracking = parse_traces(&data);
        assert_eq!(tracking.status, ExpressStatus::Signed);
        assert_eq!(tracking.traces.first().map(|t| t.location.as_str()), Some("杭州"));
    }
}
