//! Simulated carrier for demo mode and companies without credentials.
//!
//! Tracking is derived from an RNG seeded by the tracking number, so the same
//! shipment always shows the same couriers, route, and relative timeline.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use freshmilk_core::{ExpressCode, ExpressStatus};

use super::{
    CreateRequest, Created, ExpressError, ExpressProvider, PickupBooking, PickupDay,
    PickupRequest, TraceEvent, Tracking, Waybill,
};

const COURIER_NAMES: &[&str] = &[
    "王建国", "李明", "张伟", "刘洋", "陈强", "杨帆", "赵磊", "周杰", "吴斌", "郑浩", "孙鹏",
    "马超", "朱军", "胡涛", "林峰", "何勇",
];

/// (city, districts)
const CITIES: &[(&str, &[&str])] = &[
    ("北京", &["朝阳区", "海淀区", "东城区", "西城区", "丰台区"]),
    ("上海", &["浦东新区", "徐汇区", "静安区", "黄浦区", "长宁区"]),
    ("广州", &["天河区", "越秀区", "海珠区", "白云区", "番禺区"]),
    ("深圳", &["南山区", "福田区", "罗湖区", "宝安区", "龙岗区"]),
    ("杭州", &["西湖区", "上城区", "拱墅区", "滨江区", "余杭区"]),
    ("南京", &["玄武区", "秦淮区", "鼓楼区", "建邺区", "江宁区"]),
];

const BRANCH_TYPES: &[&str] = &["营业点", "集散中心", "转运中心", "快递站", "服务点"];

const PHONE_PREFIXES: &[&str] = &[
    "138", "139", "150", "151", "152", "158", "159", "186", "187", "188",
];

const PICKUP_SLOTS: [&str; 3] = ["09:00-12:00", "14:00-18:00", "18:00-21:00"];

/// Mock carrier answering under a company code.
#[derive(Debug, Clone, Copy)]
pub struct MockCarrier {
    code: ExpressCode,
}

impl MockCarrier {
    #[must_use]
    pub const fn new(code: ExpressCode) -> Self {
        Self { code }
    }

    /// Simulated tracking with the newest event at `now`.
    #[must_use]
    pub fn traces_at(&self, express_no: &str, now: DateTime<Utc>) -> Tracking {
        let mut rng = StdRng::seed_from_u64(seed_for(express_no));

        let stops = rng.random_range(2..=4);
        let cities: Vec<_> = CITIES.choose_multiple(&mut rng, stops).collect();
        let route: Vec<String> = cities
            .into_iter()
            .map(|(city, districts)| {
                let district = districts.choose(&mut rng).copied().unwrap_or_default();
                let branch = BRANCH_TYPES.choose(&mut rng).copied().unwrap_or_default();
                format!("{city}{district}{branch}")
            })
            .collect();
        let first = route.first().cloned().unwrap_or_default();
        let last = route.last().cloned().unwrap_or_default();

        let courier = courier_name(&mut rng);
        let courier_phone = phone(&mut rng);
        let picker = courier_name(&mut rng);
        let picker_phone = phone(&mut rng);

        let mut traces = Vec::new();
        let mut at = now;
        let mut push = |at: DateTime<Utc>, status: ExpressStatus, description: String, location: &str| {
            traces.push(TraceEvent {
                time: at,
                status: status.as_str().to_owned(),
                description,
                location: location.to_owned(),
            });
        };

        push(
            at,
            ExpressStatus::Delivering,
            format!("【派送中】快递员 {courier} ({courier_phone}) 正在为您派送，请保持电话畅通"),
            &last,
        );
        at -= Duration::hours(rng.random_range(1..=3));

        push(
            at,
            ExpressStatus::Delivering,
            format!("快件已到达【{last}】，快递员 {courier} 正在安排派送"),
            &last,
        );
        at -= Duration::hours(rng.random_range(2..=5));

        for i in (1..route.len().saturating_sub(1)).rev() {
            let (Some(here), Some(prev)) = (route.get(i), route.get(i - 1)) else {
                continue;
            };
            push(
                at,
                ExpressStatus::InTransit,
                format!("快件已到达【{here}】"),
                here,
            );
            at -= Duration::hours(rng.random_range(3..=8));
            push(
                at,
                ExpressStatus::InTransit,
                format!("快件已从【{prev}】发出，正发往【{here}】"),
                prev,
            );
            at -= Duration::hours(rng.random_range(2..=4));
        }

        push(
            at,
            ExpressStatus::Collected,
            format!("【已揽收】快递员 {picker} ({picker_phone}) 已揽件"),
            &first,
        );
        at -= Duration::hours(rng.random_range(1..=3));

        push(
            at,
            ExpressStatus::Created,
            format!("{} 已收到订单信息，等待揽收", self.code.display_name()),
            &first,
        );

        Tracking {
            status: ExpressStatus::Delivering,
            traces,
        }
    }

    /// SVG waybill for a shipment.
    #[must_use]
    pub fn render_waybill(&self, express_no: &str, order_no: &str, printed_at: DateTime<Utc>) -> String {
        let company = self.code.display_name();
        let printed = printed_at.format("%Y-%m-%d %H:%M");
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="320" viewBox="0 0 400 320">
<rect width="400" height="320" fill="#ffffff" stroke="#333333"/>
<rect width="400" height="48" fill="#E60012"/>
<text x="20" y="32" font-size="20" fill="#ffffff" font-weight="bold">{company}</text>
<text x="300" y="32" font-size="14" fill="#ffffff">标准快递</text>
<text x="20" y="78" font-size="14">快递单号: {express_no}</text>
<text x="20" y="102" font-size="12">订单编号: {order_no}</text>
<line x1="0" y1="118" x2="400" y2="118" stroke="#cccccc"/>
<text x="20" y="146" font-size="13">寄件人: 鲜奶配送中心 13800138000</text>
<text x="20" y="176" font-size="13">收件人: 客户 138****8888</text>
<rect x="290" y="190" width="90" height="90" fill="none" stroke="#333333"/>
<text x="315" y="240" font-size="12">二维码</text>
<text x="20" y="300" font-size="11" fill="#666666">打印时间: {printed}</text>
</svg>"##
        )
    }
}

/// RNG seed derived from the first 32 bits of the tracking number's MD5.
#[must_use]
pub fn seed_for(express_no: &str) -> u64 {
    let digest = Md5::digest(express_no.as_bytes());
    digest
        .as_slice()
        .first_chunk::<4>()
        .map_or(0, |bytes| u64::from(u32::from_be_bytes(*bytes)))
}

fn courier_name(rng: &mut StdRng) -> &'static str {
    COURIER_NAMES.choose(rng).copied().unwrap_or("王建国")
}

fn phone(rng: &mut StdRng) -> String {
    let prefix = PHONE_PREFIXES.choose(rng).copied().unwrap_or("138");
    format!("{prefix}{:08}", rng.random_range(0..100_000_000_u32))
}

#[async_trait]
impl ExpressProvider for MockCarrier {
    async fn create_order(&self, request: &CreateRequest<'_>) -> Result<Created, ExpressError> {
        let digits: u32 = rand::rng().random_range(100_000..1_000_000);
        let express_no = format!(
            "{}{}{digits}",
            self.code.as_str(),
            Utc::now().format("%Y%m%d")
        );
        tracing::info!(order_no = request.order_no, %express_no, "mock shipment created");
        Ok(Created {
            express_no,
            message: "下单成功（模拟）".to_owned(),
            data: serde_json::Value::Null,
        })
    }

    async fn query_trace(&self, express_no: &str) -> Result<Tracking, ExpressError> {
        Ok(self.traces_at(express_no, Utc::now()))
    }

    async fn cancel_order(&self, _express_no: &str) -> Result<(), ExpressError> {
        Ok(())
    }

    async fn waybill(&self, express_no: &str, order_no: &str) -> Result<Waybill, ExpressError> {
        let svg = self.render_waybill(express_no, order_no, Utc::now());
        Ok(Waybill {
            image_data: STANDARD.encode(svg),
            image_type: "svg+xml".to_owned(),
        })
    }

    async fn book_pickup(
        &self,
        _express_no: &str,
        _request: &PickupRequest<'_>,
    ) -> Result<PickupBooking, ExpressError> {
        let code = format!("PK{:06}", rand::rng().random_range(0..1_000_000_u32));
        Ok(PickupBooking {
            message: format!("预约成功，快递员将于预约时间上门取件，取件码: {code}"),
            pickup_code: code,
        })
    }

    async fn cancel_pickup(&self, _express_no: &str) -> Result<(), ExpressError> {
        Ok(())
    }

    async fn pickup_times(&self, _address: &str) -> Result<Vec<PickupDay>, ExpressError> {
        let today = Utc::now().date_naive();
        Ok((0..3)
            .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset)))
            .map(|date| PickupDay {
                date,
                slots: PICKUP_SLOTS.iter().map(|s| (*s).to_owned()).collect(),
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_seed_is_stable() {
        assert_eq!(seed_for("SF1234567890"), seed_for("SF1234567890"));
        assert_ne!(seed_for("SF1234567890"), seed_for("SF1234567891"));
        assert!(seed_for("anything") <= u64::from(u32::MAX));
    }

    #[test]
    fn test_traces_are_deterministic() {
        let carrier = MockCarrier::new(ExpressCode::Sf);
        let a = carrier.traces_at("SF1234567890", now());
        let b = carrier.traces_at("SF1234567890", now());
        assert_eq!(a.traces, b.traces);
    }

    #[test]
    fn test_traces_run_newest_first_from_created() {
        let carrier = MockCarrier::new(ExpressCode::Yto);
        let tracking = carrier.traces_at("YTO2026030112345", now());

        assert_eq!(tracking.status, ExpressStatus::Delivering);
        assert_eq!(tracking.traces.first().unwrap().time, now());
        assert_eq!(tracking.traces.first().unwrap().status, "delivering");

        let oldest = tracking.traces.last().unwrap();
        assert_eq!(oldest.status, "created");
        assert!(oldest.description.starts_with("圆通速递"));

        assert!(tracking.traces.windows(2).all(|w| w[0].time > w[1].time));
        // 2 delivering + 2 per intermediate stop + collected + created
        assert!((4..=8).contains(&tracking.traces.len()));
    }

    #[test]
    fn test_waybill_svg_carries_numbers() {
        let svg = MockCarrier::new(ExpressCode::Sf).render_waybill("SF1", "FM20260301", now());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("顺丰速运"));
        assert!(svg.contains("SF1"));
        assert!(svg.contains("FM20260301"));
    }

    #[tokio::test]
    async fn test_mock_create_order_number_format() {
        let carrier = MockCarrier::new(ExpressCode::Zto);
        let party = super::super::Party::default();
        let created = carrier
            .create_order(&CreateRequest {
                order_no: "FM1",
                sender: &party,
                receiver: &party,
                goods: &[],
                remark: "",
            })
            .await
            .unwrap();
        assert!(created.express_no.starts_with("ZTO"));
        assert_eq!(created.express_no.len(), 3 + 8 + 6);
    }

    #[tokio::test]
    async fn test_mock_pickup_times_cover_three_days() {
        let days = MockCarrier::new(ExpressCode::Sf).pickup_times("").await.unwrap();
        assert_eq!(days.len(), 3);
        assert!(days.iter().all(|d| d.slots.len() == 3));
    }
}
