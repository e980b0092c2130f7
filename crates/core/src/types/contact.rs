//! Contact details: mainland mobile numbers and email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("手机号不能为空")]
    Empty,
    /// Not an 11-digit number starting with `1[3-9]`.
    #[error("手机号格式不正确")]
    InvalidFormat,
}

/// A mainland China mobile number.
///
/// ## Constraints
///
/// - Exactly 11 ASCII digits
/// - First digit `1`, second digit `3`-`9`
///
/// ## Examples
///
/// ```
/// use freshmilk_core::Phone;
///
/// assert!(Phone::parse("13800138000").is_ok());
/// assert!(Phone::parse(" 13800138000 ").is_ok());
/// assert!(Phone::parse("12800138000").is_err());
/// assert!(Phone::parse("1380013800").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Parse a `Phone`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a mobile number.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }

        let bytes = s.as_bytes();
        let valid = bytes.len() == 11
            && bytes.iter().all(u8::is_ascii_digit)
            && bytes.first() == Some(&b'1')
            && bytes.get(1).is_some_and(|b| (b'3'..=b'9').contains(b));

        if !valid {
            return Err(PhoneError::InvalidFormat);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Phone` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The number with the middle four digits hidden (`138****8000`).
    #[must_use]
    pub fn masked(&self) -> String {
        let (head, rest) = self.0.split_at(3);
        let tail = rest.get(4..).unwrap_or_default();
        format!("{head}****{tail}")
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("邮箱不能为空")]
    Empty,
    /// Longer than [`Email::MAX_LENGTH`].
    #[error("邮箱长度不能超过{max}个字符")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// Missing `@`, or an empty local part or domain.
    #[error("邮箱格式不正确")]
    InvalidFormat,
}

/// An email address with basic structural validation.
///
/// ```
/// use freshmilk_core::Email;
///
/// assert!(Email::parse("milk@example.com").is_ok());
/// assert!(Email::parse("@example.com").is_err());
/// assert!(Email::parse("milk@").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, or malformed.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        match s.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(s.to_owned()))
            }
            _ => Err(EmailError::InvalidFormat),
        }
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_valid() {
        let phone = Phone::parse("13912345678");
        assert_eq!(phone.map(Phone::into_inner), Ok("13912345678".to_owned()));
    }

    #[test]
    fn test_phone_rejects_bad_input() {
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
        assert_eq!(Phone::parse("23912345678"), Err(PhoneError::InvalidFormat));
        assert_eq!(Phone::parse("1391234567a"), Err(PhoneError::InvalidFormat));
        assert_eq!(Phone::parse("139123456789"), Err(PhoneError::InvalidFormat));
    }

    #[test]
    fn test_phone_masked() {
        let phone = Phone::parse("13800138000").map(|p| p.masked());
        assert_eq!(phone, Ok("138****8000".to_owned()));
    }

    #[test]
    fn test_email_rules() {
        assert!(Email::parse("a@b.cn").is_ok());
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("a@b@c"), Err(EmailError::InvalidFormat));
        assert_eq!(
            Email::parse(&format!("{}@b.cn", "a".repeat(260))),
            Err(EmailError::TooLong { max: 254 })
        );
    }
}
