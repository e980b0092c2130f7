//! Client address and user agent of a request.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

/// Forwarding headers checked in order for the real client address.
const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Client address from proxy headers. For `X-Forwarded-For` the first entry
/// of the chain wins.
#[must_use]
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    FORWARDED_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    })
}

/// Client address of a request: proxy headers first, then the peer address
/// recorded by `into_make_service_with_connect_info`.
#[must_use]
pub fn client_ip(parts: &Parts) -> Option<IpAddr> {
    forwarded_ip(&parts.headers).or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Who sent a request, as stored in the user action log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: String,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        Ok(Self {
            ip: client_ip(parts).map(|ip| ip.to_string()),
            user_agent,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{HeaderValue, Request};

    use super::*;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(forwarded_ip(&headers), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(forwarded_ip(&headers), Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_uses_peer_address() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(client_ip(&parts), None);

        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        parts.extensions.insert(ConnectInfo(peer));
        assert_eq!(client_ip(&parts), Some(peer.ip()));
    }
}
