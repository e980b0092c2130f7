//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (`http_request` span)
//! 3. Request ID
//! 4. CORS
//! 5. Bearer authentication (`/api/v1` only)
//! 6. Admin check (`/api/v1/admin` only)
//! 7. Rate limiting (`/api/v1/auth` only)

pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod request_id;

pub use auth::{
    OptionalUser, RequireAdmin, RequireCourier, RequireUser, authenticate, require_admin,
};
pub use client::ClientInfo;
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
