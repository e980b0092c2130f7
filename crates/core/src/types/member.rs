//! Membership tiers, discounts, and expiry arithmetic.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::define_status;

define_status!(
    /// Membership tier.
    ///
    /// `Regular` never expires; paid tiers are valid until `member_expire_at`.
    MemberLevel, "shop.member_level" {
        Regular => "regular",
        Silver => "silver",
        Gold => "gold",
        Platinum => "platinum",
    }
);

/// Longest duration a membership plan may grant.
pub const MAX_PLAN_DURATION_DAYS: i32 = 3650;

impl MemberLevel {
    /// Price multiplier applied at checkout while the tier is valid.
    #[must_use]
    pub const fn discount_rate(&self) -> Decimal {
        match self {
            Self::Regular => Decimal::ONE,
            Self::Silver => Decimal::from_parts(95, 0, 0, false, 2),
            Self::Gold => Decimal::from_parts(90, 0, 0, false, 2),
            Self::Platinum => Decimal::from_parts(85, 0, 0, false, 2),
        }
    }

    /// Points multiplier applied when an order is completed.
    #[must_use]
    pub const fn points_multiplier(&self) -> Decimal {
        match self {
            Self::Regular | Self::Silver => Decimal::ONE,
            Self::Gold => Decimal::from_parts(15, 0, 0, false, 1),
            Self::Platinum => Decimal::TWO,
        }
    }

    /// Human-readable tier name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Regular => "普通会员",
            Self::Silver => "银卡会员",
            Self::Gold => "金卡会员",
            Self::Platinum => "铂金会员",
        }
    }
}

/// A user's membership at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// Current tier.
    pub level: MemberLevel,
    /// Expiry of a paid tier.
    pub expire_at: Option<DateTime<Utc>>,
}

impl Membership {
    /// Create a membership snapshot.
    #[must_use]
    pub const fn new(level: MemberLevel, expire_at: Option<DateTime<Utc>>) -> Self {
        Self { level, expire_at }
    }

    /// Whether the tier is currently in effect.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.level {
            MemberLevel::Regular => true,
            _ => self.expire_at.is_some_and(|expire_at| expire_at > now),
        }
    }

    /// Checkout price multiplier, falling back to full price when expired.
    #[must_use]
    pub fn discount_rate(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_valid(now) {
            self.level.discount_rate()
        } else {
            Decimal::ONE
        }
    }

    /// Points multiplier, falling back to 1 when expired.
    #[must_use]
    pub fn points_multiplier(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_valid(now) {
            self.level.points_multiplier()
        } else {
            Decimal::ONE
        }
    }

    /// Apply a purchased plan and return the resulting membership.
    ///
    /// Buying the tier you already hold extends from the current expiry.
    /// Any other purchase (upgrade, downgrade, or after expiry) starts from
    /// `now`. Returns `None` when the new expiry is out of range.
    #[must_use]
    pub fn extend(
        &self,
        plan_level: MemberLevel,
        duration_days: i32,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let base = match self.expire_at {
            Some(expire_at) if self.level == plan_level && self.is_valid(now) => expire_at,
            _ => now,
        };
        let expire_at = base.checked_add_signed(Duration::try_days(i64::from(duration_days))?)?;

        Some(Self {
            level: plan_level,
            expire_at: Some(expire_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default()
    }

    #[test]
    fn test_regular_is_always_valid() {
        let membership = Membership::new(MemberLevel::Regular, None);
        assert!(membership.is_valid(now()));
        assert_eq!(membership.discount_rate(now()), Decimal::ONE);
    }

    #[test]
    fn test_paid_tier_requires_future_expiry() {
        let valid = Membership::new(MemberLevel::Gold, Some(now() + Duration::days(1)));
        let expired = Membership::new(MemberLevel::Gold, Some(now() - Duration::days(1)));
        let missing = Membership::new(MemberLevel::Gold, None);

        assert!(valid.is_valid(now()));
        assert!(!expired.is_valid(now()));
        assert!(!missing.is_valid(now()));
    }

    #[test]
    fn test_discount_rates() {
        let later = Some(now() + Duration::days(10));
        assert_eq!(
            Membership::new(MemberLevel::Silver, later).discount_rate(now()),
            Decimal::new(95, 2)
        );
        assert_eq!(
            Membership::new(MemberLevel::Gold, later).discount_rate(now()),
            Decimal::new(90, 2)
        );
        assert_eq!(
            Membership::new(MemberLevel::Platinum, later).discount_rate(now()),
            Decimal::new(85, 2)
        );
    }

    #[test]
    fn test_expired_tier_pays_full_price() {
        let expired = Membership::new(MemberLevel::Platinum, Some(now() - Duration::seconds(1)));
        assert_eq!(expired.discount_rate(now()), Decimal::ONE);
        assert_eq!(expired.points_multiplier(now()), Decimal::ONE);
    }

    #[test]
    fn test_extend_same_tier_stacks() {
        let current = Membership::new(MemberLevel::Silver, Some(now() + Duration::days(5)));
        let extended = current.extend(MemberLevel::Silver, 30, now());
        assert_eq!(
            extended.and_then(|m| m.expire_at),
            Some(now() + Duration::days(35))
        );
    }

    #[test]
    fn test_extend_upgrade_starts_now() {
        let current = Membership::new(MemberLevel::Silver, Some(now() + Duration::days(5)));
        let upgraded = current.extend(MemberLevel::Gold, 90, now());
        assert_eq!(upgraded.map(|m| m.level), Some(MemberLevel::Gold));
        assert_eq!(
            upgraded.and_then(|m| m.expire_at),
            Some(now() + Duration::days(90))
        );
    }

    #[test]
    fn test_extend_after_expiry_starts_now() {
        let current = Membership::new(MemberLevel::Gold, Some(now() - Duration::days(5)));
        let renewed = current.extend(MemberLevel::Gold, 90, now());
        assert_eq!(
            renewed.and_then(|m| m.expire_at),
            Some(now() + Duration::days(90))
        );
    }

    #[test]
    fn test_extend_out_of_range_is_none() {
        let current = Membership::new(MemberLevel::Gold, Some(now() + Duration::days(5)));
        assert_eq!(current.extend(MemberLevel::Gold, i32::MAX, now()), None);

        let far = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let near_limit = Membership::new(MemberLevel::Gold, Some(far));
        assert_eq!(near_limit.extend(MemberLevel::Gold, 30, now()), None);
        assert!(near_limit.extend(MemberLevel::Silver, 30, now()).is_some());
    }

    #[test]
    fn test_longest_plan_fits() {
        let current = Membership::new(MemberLevel::Regular, None);
        assert!(
            current
                .extend(MemberLevel::Platinum, MAX_PLAN_DURATION_DAYS, now())
                .is_some()
        );
    }
}
