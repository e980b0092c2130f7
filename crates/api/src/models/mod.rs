//! Domain models for the shop schema.
//!
//! Row types derive `sqlx::FromRow` and serialise directly as API
//! responses. Input types derive `Deserialize` and carry request bodies and
//! query filters into the repositories.

pub mod catalog;
pub mod community;
pub mod coupon;
pub mod delivery;
pub mod express;
pub mod feedback;
pub mod notification;
pub mod order;
pub mod subscription;
pub mod user;

pub use catalog::*;
pub use community::*;
pub use coupon::*;
pub use delivery::*;
pub use express::*;
pub use feedback::*;
pub use notification::*;
pub use order::*;
pub use subscription::*;
pub use user::*;
