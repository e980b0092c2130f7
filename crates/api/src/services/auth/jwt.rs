//! Access and refresh tokens.
//!
//! Both token kinds are HS256 JWTs signed with `JWT_SECRET`. The `token_type`
//! claim keeps a refresh token from being used as an access token.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freshmilk_core::UserId;

use super::AuthError;
use crate::config::JwtConfig;

/// Which of the two token kinds a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    /// Unique token ID
    pub jti: String,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// Build a token service from configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::minutes(config.access_minutes),
            refresh_ttl: Duration::days(config.refresh_days),
        }
    }

    /// Issue an access and a refresh token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenEncoding` if signing fails.
    pub fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenType::Access)?,
            refresh: self.issue(user_id, TokenType::Refresh)?,
        })
    }

    /// Issue a single token of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenEncoding` if signing fails.
    pub fn issue(&self, user_id: UserId, token_type: TokenType) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }

    /// Verify a token and return the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired`, `InvalidToken`, or `WrongTokenType`.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<UserId, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        if data.claims.token_type != expected {
            return Err(AuthError::WrongTokenType);
        }

        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Extract the token from an `Authorization: Bearer <token>` header value.
    #[must_use]
    pub fn extract_bearer(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn service(access_minutes: i64) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: SecretString::from("q8Z!r2Lx#7vN@4tW%9mK&1pB^6sD*3hF"),
            access_minutes,
            refresh_days: 7,
        })
    }

    #[test]
    fn test_access_token_round_trip() {
        let tokens = service(120);
        let pair = tokens.issue_pair(UserId::new(42)).unwrap();
        assert_eq!(
            tokens.verify(&pair.access, TokenType::Access).unwrap(),
            UserId::new(42)
        );
        assert_eq!(
            tokens.verify(&pair.refresh, TokenType::Refresh).unwrap(),
            UserId::new(42)
        );
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let tokens = service(120);
        let pair = tokens.issue_pair(UserId::new(7)).unwrap();
        assert!(matches!(
            tokens.verify(&pair.refresh, TokenType::Access),
            Err(AuthError::WrongTokenType)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = service(-5);
        let token = tokens.issue(UserId::new(1), TokenType::Access).unwrap();
        assert!(matches!(
            tokens.verify(&token, TokenType::Access),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = TokenService::new(&JwtConfig {
            secret: SecretString::from("Zt5$wQ1!nB8@kL3#xV6%rM9^cJ2&hG4*"),
            access_minutes: 120,
            refresh_days: 7,
        });
        let token = other.issue(UserId::new(1), TokenType::Access).unwrap();
        assert!(matches!(
            service(120).verify(&token, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(TokenService::extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(TokenService::extract_bearer("Basic abc"), None);
        assert_eq!(TokenService::extract_bearer("Bearer "), None);
    }
}
