//! Short-lived password reset codes.
//!
//! Codes are six digits, keyed by phone number, and expire after five minutes.
//! Issuing a new code replaces the previous one.

use std::time::Duration;

use moka::future::Cache;
use rand::Rng;

/// How long a reset code stays valid.
pub const RESET_CODE_TTL: Duration = Duration::from_secs(300);

/// In-memory store of outstanding reset codes.
#[derive(Clone)]
pub struct ResetCodeStore {
    codes: Cache<String, String>,
}

impl ResetCodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(RESET_CODE_TTL)
    }

    /// Create an empty store with a custom time-to-live.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            codes: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Generate and remember a new code for `phone`.
    pub async fn issue(&self, phone: &str) -> String {
        let code = generate_code();
        self.codes.insert(phone.to_owned(), code.clone()).await;
        code
    }

    /// Whether `code` is the outstanding code for `phone`.
    pub async fn verify(&self, phone: &str, code: &str) -> bool {
        self.codes
            .get(phone)
            .await
            .is_some_and(|stored| stored == code.trim())
    }

    /// Verify and invalidate in one step.
    pub async fn consume(&self, phone: &str, code: &str) -> bool {
        if self.verify(phone, code).await {
            self.codes.invalidate(phone).await;
            true
        } else {
            false
        }
    }
}

impl Default for ResetCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a 6-digit verification code.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_format() {
        let code = generate_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let store = ResetCodeStore::new();
        let code = store.issue("13800138000").await;

        assert!(!store.verify("13800138000", "000000x").await);
        assert!(store.verify("13800138000", &code).await);
        assert!(store.consume("13800138000", &code).await);
        assert!(!store.consume("13800138000", &code).await);
    }

    #[tokio::test]
    async fn test_codes_are_per_phone() {
        let store = ResetCodeStore::new();
        let code = store.issue("13800138000").await;
        assert!(!store.verify("13900139000", &code).await);
    }

    #[tokio::test]
    async fn test_code_expires() {
        let store = ResetCodeStore::with_ttl(Duration::from_millis(20));
        let code = store.issue("13800138000").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!store.verify("13800138000", &code).await);
    }
}
