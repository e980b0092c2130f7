//! Human-facing document numbers (order numbers, refund numbers, ...).
//!
//! Numbers have the shape `{PREFIX}{yyyymmddHHMMSS}{6 upper-case hex}`. The
//! hex suffix comes from a random UUID, so two documents created in the same
//! second still get distinct numbers; the unique index on each column is the
//! final guard.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Prefix identifying the document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPrefix {
    /// Product order (`FM`).
    Order,
    /// Payment (`PAY`).
    Payment,
    /// Refund request (`RF`).
    Refund,
    /// Subscription (`SUB`).
    Subscription,
    /// Membership purchase (`VIP`).
    Membership,
}

impl DocumentPrefix {
    /// The literal prefix.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "FM",
            Self::Payment => "PAY",
            Self::Refund => "RF",
            Self::Subscription => "SUB",
            Self::Membership => "VIP",
        }
    }

    /// Generate a new number at `now`.
    #[must_use]
    pub fn generate_at(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}{}",
            self.as_str(),
            now.format("%Y%m%d%H%M%S"),
            random_hex(6)
        )
    }

    /// Generate a new number at the current time.
    #[must_use]
    pub fn generate(&self) -> String {
        self.generate_at(Utc::now())
    }
}

/// Generate a coupon code: `FM` followed by 8 upper-case hex characters.
#[must_use]
pub fn coupon_code() -> String {
    format!("FM{}", random_hex(8))
}

fn random_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_shape() {
        let at = DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default();
        let number = DocumentPrefix::Order.generate_at(at);

        assert!(number.starts_with("FM20251009"));
        assert_eq!(number.len(), 2 + 14 + 6);
        assert!(
            number[16..]
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
        );
    }

    #[test]
    fn test_prefixes() {
        assert!(DocumentPrefix::Payment.generate().starts_with("PAY"));
        assert!(DocumentPrefix::Refund.generate().starts_with("RF"));
        assert!(DocumentPrefix::Subscription.generate().starts_with("SUB"));
        assert!(DocumentPrefix::Membership.generate().starts_with("VIP"));
    }

    #[test]
    fn test_numbers_are_distinct() {
        let a = DocumentPrefix::Order.generate();
        let b = DocumentPrefix::Order.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_coupon_code_shape() {
        let code = coupon_code();
        assert_eq!(code.len(), 10);
        assert!(code.starts_with("FM"));
    }
}
