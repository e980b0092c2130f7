//! Mock courier behaviour relied on by demo mode.

use chrono::{DateTime, Utc};
use freshmilk_api::services::express::mock::{MockCarrier, seed_for};
use freshmilk_api::services::express::{
    Carrier, parse_carrier_time, placeholder_express_no, select_carrier,
};
use freshmilk_core::{ExpressCode, ExpressStatus};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default()
}

#[test]
fn test_same_number_same_route() {
    let carrier = MockCarrier::new(ExpressCode::Sf);
    let first = carrier.traces_at("SF1234567890", now());
    let again = carrier.traces_at("SF1234567890", now());

    let first_descriptions: Vec<_> = first.traces.iter().map(|t| &t.description).collect();
    let again_descriptions: Vec<_> = again.traces.iter().map(|t| &t.description).collect();
    assert_eq!(first_descriptions, again_descriptions);
    assert_eq!(seed_for("SF1234567890"), seed_for("SF1234567890"));
}

#[test]
fn test_traces_newest_first_and_delivering() {
    let tracking = MockCarrier::new(ExpressCode::Yto).traces_at("YT0000000001", now());
    assert_eq!(tracking.status, ExpressStatus::Delivering);
    assert!(tracking.traces.len() >= 4);

    let newest = tracking.traces.first().map(|t| t.time);
    assert_eq!(newest, Some(now()));
    assert!(tracking.traces.windows(2).all(|w| match w {
        [a, b] => a.time > b.time,
        _ => true,
    }));

    let oldest = tracking.traces.last().map(|t| t.status.as_str());
    assert_eq!(oldest, Some(ExpressStatus::Created.as_str()));
}

#[test]
fn test_different_numbers_usually_differ() {
    let seeds: std::collections::HashSet<u64> = (0..20)
        .map(|i| seed_for(&format!("ZTO{i:010}")))
        .collect();
    assert!(seeds.len() > 15);
}

#[test]
fn test_demo_mode_always_uses_mock() {
    for code in ExpressCode::ALL {
        assert_eq!(select_carrier(*code, true, true), Carrier::Mock);
        assert_eq!(select_carrier(*code, false, false), Carrier::Mock);
    }
    assert_eq!(select_carrier(ExpressCode::Zto, true, false), Carrier::Mock);
}

#[test]
fn test_placeholder_number_shape() {
    let number = placeholder_express_no(ExpressCode::Sf, now());
    let stamp = now().format("%Y%m%d%H%M%S").to_string();
    let prefix = format!("SF{stamp}");
    assert!(number.starts_with(&prefix));
    let suffix = number.trim_start_matches(&prefix);
    assert_eq!(suffix.len(), 4);
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_carrier_time_is_china_time() {
    let parsed = parse_carrier_time("2026-03-02 08:30:00");
    let expected = DateTime::parse_from_rfc3339("2026-03-02T00:30:00Z")
        .ok()
        .map(|t| t.with_timezone(&Utc));
    assert_eq!(parsed, expected);
    assert!(parse_carrier_time("yesterday").is_none());
    assert_eq!(parse_carrier_time(" 2026-03-02 08:30:00 "), expected);
}
