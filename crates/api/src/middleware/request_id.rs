//! Request ID middleware for request tracing and correlation.
//!
//! Uses the `x-request-id` sent by an upstream proxy, or generates a UUID v4.
//! The ID is recorded in the current tracing span, tagged on the Sentry
//! scope, and echoed in the response headers.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream ID accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Middleware that ensures every request has a unique request ID.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(accept_upstream_id)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", &request_id);

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Upstream IDs end up in logs; only short token-like values are kept.
fn accept_upstream_id(id: &str) -> Option<&str> {
    let id = id.trim();
    let token_like = id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'));
    (!id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN && token_like).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_proxy_ids() {
        assert_eq!(
            accept_upstream_id("8c1f2a7e-cf-ray:abc"),
            Some("8c1f2a7e-cf-ray:abc")
        );
        assert_eq!(accept_upstream_id(" abc123 "), Some("abc123"));
    }

    #[test]
    fn test_rejects_junk_ids() {
        assert_eq!(accept_upstream_id(""), None);
        assert_eq!(accept_upstream_id("two words"), None);
        assert_eq!(accept_upstream_id("line\nbreak"), None);
        assert_eq!(accept_upstream_id(&"a".repeat(MAX_REQUEST_ID_LEN + 1)), None);
    }
}
