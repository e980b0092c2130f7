//! WeChat mini-program login.
//!
//! Exchanges a `wx.login()` code for the user's `openid` via `jscode2session`.
//! Without configured credentials the openid is derived from the code so the
//! flow can be exercised locally.

use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::instrument;
use url::Url;

use super::auth::AuthError;
use crate::config::WechatConfig;

const JSCODE2SESSION_URL: &str = "https://api.weixin.qq.com/sns/jscode2session";

/// Identity returned by WeChat for a login code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WechatSession {
    pub openid: String,
    pub unionid: Option<String>,
    pub session_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    openid: Option<String>,
    unionid: Option<String>,
    session_key: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Client for the WeChat login API.
#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    config: Option<WechatConfig>,
}

impl WechatClient {
    /// Create a client; `None` credentials select the local mock.
    #[must_use]
    pub const fn new(http: reqwest::Client, config: Option<WechatConfig>) -> Self {
        Self { http, config }
    }

    /// Exchange a login code for a session.
    ///
    /// # Errors
    ///
    /// Returns `WechatRejected` when WeChat returns an error code and
    /// `WechatUnavailable` when the request itself fails.
    #[instrument(skip(self, code))]
    pub async fn code_to_session(&self, code: &str) -> Result<WechatSession, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::WechatRejected("code 不能为空".to_owned()));
        }

        let Some(config) = &self.config else {
            return Ok(mock_session(code));
        };

        let url = session_url(&config.app_id, config.app_secret.expose_secret(), code)
            .map_err(|e| AuthError::WechatUnavailable(e.to_string()))?;
        let response: SessionResponse = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::WechatUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::WechatUnavailable(e.to_string()))?;

        if response.errcode != 0 {
            tracing::warn!(errcode = response.errcode, errmsg = %response.errmsg, "jscode2session rejected");
            return Err(AuthError::WechatRejected(response.errmsg));
        }

        match (response.openid, response.session_key) {
            (Some(openid), Some(session_key)) => Ok(WechatSession {
                openid,
                unionid: response.unionid,
                session_key,
            }),
            _ => Err(AuthError::WechatRejected("未返回 openid".to_owned())),
        }
    }
}

/// `jscode2session` request URL with the query parameters encoded.
fn session_url(app_id: &str, app_secret: &str, code: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        JSCODE2SESSION_URL,
        &[
            ("appid", app_id),
            ("secret", app_secret),
            ("js_code", code),
            ("grant_type", "authorization_code"),
        ],
    )
}

/// Deterministic stand-in session for an unconfigured app.
#[must_use]
pub fn mock_session(code: &str) -> WechatSession {
    let digest = hex::encode(Sha256::digest(code.as_bytes()));
    WechatSession {
        openid: format!("mock_{}", digest.get(..16).unwrap_or_default()),
        unionid: None,
        session_key: format!("mock_session_{}", digest.get(16..32).unwrap_or_default()),
    }
}

/// Username assigned to a user created through WeChat login.
#[must_use]
pub fn username_for_openid(openid: &str) -> String {
    let tail: String = openid
        .trim_start_matches("mock_")
        .chars()
        .take(8)
        .collect();
    format!("wx_{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_session_is_deterministic() {
        let a = mock_session("081abc");
        let b = mock_session("081abc");
        assert_eq!(a, b);
        assert!(a.openid.starts_with("mock_"));
        assert_eq!(a.openid.len(), "mock_".len() + 16);
        assert_ne!(mock_session("081abd").openid, a.openid);
    }

    #[test]
    fn test_username_for_openid() {
        assert_eq!(username_for_openid("oAbCdEfGh12345"), "wx_oAbCdEfG");
        assert_eq!(username_for_openid("mock_0123456789abcdef"), "wx_01234567");
    }

    #[test]
    fn test_session_url_encodes_code() {
        let url = session_url("wx123", "s3cret", "a+b&c").map(String::from);
        assert_eq!(
            url.as_deref(),
            Ok("https://api.weixin.qq.com/sns/jscode2session?appid=wx123&secret=s3cret&js_code=a%2Bb%26c&grant_type=authorization_code")
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_uses_mock() {
        let client = WechatClient::new(reqwest::Client::new(), None);
        let session = client.code_to_session("code-1").await;
        assert!(matches!(session, Ok(s) if s.openid.starts_with("mock_")));
    }
}
