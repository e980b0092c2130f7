//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::auth::jwt::TokenService;
use crate::services::reset_codes::ResetCodeStore;
use crate::services::wechat::WechatClient;

/// Timeout for outbound calls to courier companies and WeChat.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenService,
    reset_codes: ResetCodeStore,
    http: reqwest::Client,
    wechat: WechatClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - API configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: ApiConfig, pool: PgPool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        let tokens = TokenService::new(&config.jwt);
        let wechat = WechatClient::new(http.clone(), config.wechat.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                reset_codes: ResetCodeStore::new(),
                http,
                wechat,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the JWT issuer.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// Get a reference to the outstanding password reset codes.
    #[must_use]
    pub fn reset_codes(&self) -> &ResetCodeStore {
        &self.inner.reset_codes
    }

    /// Get a reference to the shared outbound HTTP client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Get a reference to the WeChat mini-program client.
    #[must_use]
    pub fn wechat(&self) -> &WechatClient {
        &self.inner.wechat
    }
}
