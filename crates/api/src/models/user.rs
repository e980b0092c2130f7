//! Accounts, authorization context, addresses, points, and membership.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use freshmilk_core::{
    AddressId, DeliveryPersonId, MemberLevel, Membership, MembershipOrderId,
    MembershipOrderStatus, MembershipPlanId, OrderId, PointsRecordId, PointsSource, PointsType,
    SubscriptionId, UserAction, UserId, UserLogId,
};

/// A customer or staff account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub nickname: String,
    /// 0 unknown, 1 male, 2 female.
    pub gender: i16,
    pub birthday: Option<NaiveDate>,
    pub avatar: String,
    pub address: String,
    pub member_level: MemberLevel,
    pub member_expire_at: Option<DateTime<Utc>>,
    pub points: i32,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(skip)]
    pub openid: Option<String>,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// The user's membership tier and expiry.
    #[must_use]
    pub const fn membership(&self) -> Membership {
        Membership::new(self.member_level, self.member_expire_at)
    }
}

/// A user as returned to clients, with derived membership fields.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub member_level_display: &'static str,
    pub is_member_valid: bool,
    pub discount_rate: Decimal,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let now = Utc::now();
        let membership = user.membership();
        Self {
            member_level_display: user.member_level.label(),
            is_member_valid: membership.is_valid(now),
            discount_rate: membership.discount_rate(now),
            user,
        }
    }
}

/// What an authenticated caller is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Any active signed-in user.
    Customer,
    /// A user linked to an active delivery person.
    Courier,
    /// Staff with `is_admin`.
    Admin,
}

/// The authenticated caller, resolved once per request by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub membership: Membership,
    pub courier_id: Option<DeliveryPersonId>,
}

impl CurrentUser {
    /// Whether the caller holds `capability`.
    #[must_use]
    pub const fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Customer => true,
            Capability::Courier => self.courier_id.is_some(),
            Capability::Admin => self.is_admin,
        }
    }
}

/// Row loaded by the auth middleware.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthRow {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub member_level: MemberLevel,
    pub member_expire_at: Option<DateTime<Utc>>,
    pub courier_id: Option<DeliveryPersonId>,
}

impl From<AuthRow> for CurrentUser {
    fn from(row: AuthRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            is_admin: row.is_admin,
            membership: Membership::new(row.member_level, row.member_expire_at),
            courier_id: row.courier_id,
        }
    }
}

/// Fields for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Option<String>,
    pub phone: Option<String>,
    pub nickname: String,
    pub avatar: String,
    pub openid: Option<String>,
    pub unionid: Option<String>,
    pub session_key: Option<String>,
    pub is_admin: bool,
}

/// Profile fields a user may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<i16>,
    pub birthday: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Admin filter for the user list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub username: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

/// One activity log entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserLog {
    pub id: UserLogId,
    pub user_id: UserId,
    pub username: String,
    pub action: UserAction,
    pub ip: Option<String>,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Admin filter for the activity log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLogFilter {
    pub user_id: Option<UserId>,
    pub action: Option<UserAction>,
}

/// A shipping address.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// Province, city, district, and street on one line.
    #[must_use]
    pub fn full_address(&self) -> String {
        format!(
            "{}{}{}{}",
            self.province, self.city, self.district, self.detail_address
        )
    }
}

/// Address fields submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub receiver_name: String,
    pub receiver_phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
    #[serde(default)]
    pub is_default: bool,
}

/// One entry in a user's points ledger.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PointsRecord {
    pub id: PointsRecordId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub record_type: PointsType,
    pub source: PointsSource,
    pub points: i32,
    pub balance: i32,
    pub order_id: Option<OrderId>,
    pub subscription_id: Option<SubscriptionId>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

/// A points movement to apply.
#[derive(Debug, Clone)]
pub struct PointsChange {
    pub user_id: UserId,
    /// Signed change; the balance never drops below zero.
    pub points: i32,
    pub record_type: PointsType,
    pub source: PointsSource,
    pub order_id: Option<OrderId>,
    pub subscription_id: Option<SubscriptionId>,
    pub remark: String,
}

/// A purchasable membership plan.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MembershipPlan {
    pub id: MembershipPlanId,
    pub name: String,
    pub level: MemberLevel,
    pub duration_days: i32,
    pub original_price: Decimal,
    pub price: Decimal,
    pub description: String,
    pub benefits: Json<Vec<String>>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Membership plan fields for create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipPlanInput {
    pub name: String,
    pub level: MemberLevel,
    pub duration_days: i32,
    pub original_price: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

/// A purchase of a membership plan.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MembershipOrder {
    pub id: MembershipOrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub plan_id: Option<MembershipPlanId>,
    pub plan_name: String,
    pub level: MemberLevel,
    pub duration_days: i32,
    pub amount: Decimal,
    pub status: MembershipOrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const fn default_true() -> bool {
    true
}
