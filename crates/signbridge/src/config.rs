// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for signbridge.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

/// OAuth client credentials and endpoints for one platform.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered with the platform (authorization-code flow only)
    pub redirect_uri: Option<Url>,
    /// Authorization endpoint (authorization-code flow only)
    pub authorize_url: Option<Url>,
    /// Token endpoint used for code exchange and refresh
    pub token_url: Url,
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Base URL of the construction-management REST API
    pub construction_api_base: Url,
    /// OAuth settings for the construction-management platform
    pub construction_oauth: OAuthSettings,
    /// OAuth settings for the signature platform (refresh only)
    pub signature_oauth: Option<OAuthSettings>,
    /// Pre-issued signature platform access token
    pub signature_access_token: Option<String>,
    /// Pre-issued signature platform refresh token
    pub signature_refresh_token: Option<String>,
    /// Maximum number of export poll attempts (default: 7)
    pub export_retry_limit: u32,
    /// Fixed delay between export poll attempts (default: 2000ms)
    pub export_retry_delay: Duration,
    /// Timeout applied to every outbound HTTP call (default: 30s)
    pub http_timeout: Duration,
    /// Allowed CORS origins; empty means any origin
    pub cors_allowed_origins: Vec<String>,
    /// Where to send the browser after a successful OAuth callback
    pub post_login_redirect: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `CONSTRUCTION_CLIENT_ID`
    /// - `CONSTRUCTION_CLIENT_SECRET`
    /// - `CONSTRUCTION_REDIRECT_URI`
    ///
    /// # Optional Environment Variables
    /// - `SIGNBRIDGE_PORT` - HTTP port (default: 8080)
    /// - `CONSTRUCTION_API_BASE` - REST API base (default: `https://api.procore.com`)
    /// - `CONSTRUCTION_LOGIN_BASE` - OAuth base (default: `https://login.procore.com`)
    /// - `SIGNATURE_TOKEN_URL`, `SIGNATURE_CLIENT_ID`, `SIGNATURE_CLIENT_SECRET`
    /// - `SIGNATURE_ACCESS_TOKEN`, `SIGNATURE_REFRESH_TOKEN`
    /// - `EXPORT_RETRY_LIMIT` (default: 7), `EXPORT_RETRY_DELAY_MS` (default: 2000)
    /// - `HTTP_TIMEOUT_MS` (default: 30000)
    /// - `CORS_ALLOWED_ORIGINS` - comma separated
    /// - `POST_LOGIN_REDIRECT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = parse_var("SIGNBRIDGE_PORT", 8080)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let construction_api_base = url_var("CONSTRUCTION_API_BASE")?
            .unwrap_or_else(|| default_url("https://api.procore.com"));
        let login_base = url_var("CONSTRUCTION_LOGIN_BASE")?
            .unwrap_or_else(|| default_url("https://login.procore.com"));

        let redirect_uri = url_var("CONSTRUCTION_REDIRECT_URI")?
            .ok_or(ConfigError::MissingEnvVar("CONSTRUCTION_REDIRECT_URI"))?;

        let construction_oauth = OAuthSettings {
            client_id: required("CONSTRUCTION_CLIENT_ID")?,
            client_secret: required("CONSTRUCTION_CLIENT_SECRET")?,
            redirect_uri: Some(redirect_uri),
            authorize_url: Some(join(&login_base, "oauth/authorize", "CONSTRUCTION_LOGIN_BASE")?),
            token_url: join(&login_base, "oauth/token", "CONSTRUCTION_LOGIN_BASE")?,
        };

        let signature_oauth = match url_var("SIGNATURE_TOKEN_URL")? {
            Some(token_url) => Some(OAuthSettings {
                client_id: required("SIGNATURE_CLIENT_ID")?,
                client_secret: required("SIGNATURE_CLIENT_SECRET")?,
                redirect_uri: None,
                authorize_url: None,
                token_url,
            }),
            None => None,
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            http_addr,
            construction_api_base,
            construction_oauth,
            signature_oauth,
            signature_access_token: optional("SIGNATURE_ACCESS_TOKEN"),
            signature_refresh_token: optional("SIGNATURE_REFRESH_TOKEN"),
            export_retry_limit: parse_var("EXPORT_RETRY_LIMIT", 7)?,
            export_retry_delay: Duration::from_millis(parse_var("EXPORT_RETRY_DELAY_MS", 2000)?),
            http_timeout: Duration::from_millis(parse_var("HTTP_TIMEOUT_MS", 30_000)?),
            cors_allowed_origins,
            post_login_redirect: optional("POST_LOGIN_REDIRECT"),
        })
    }

    /// Create a configuration pointing both platforms at `base` (tests, local mocks).
    pub fn for_base_url(base: &Url) -> Self {
        let at = |path: &str| base.join(path).unwrap_or_else(|_| base.clone());
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            construction_api_base: base.clone(),
            construction_oauth: OAuthSettings {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                redirect_uri: Some(at("callback")),
                authorize_url: Some(at("oauth/authorize")),
                token_url: at("oauth/token"),
            },
            signature_oauth: None,
            signature_access_token: None,
            signature_refresh_token: None,
            export_retry_limit: 7,
            export_retry_delay: Duration::from_millis(2000),
            http_timeout: Duration::from_secs(30),
            cors_allowed_origins: Vec::new(),
            post_login_redirect: None,
        }
    }

    /// Set the HTTP listen address.
    pub fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Set the export retry limit and delay.
    pub fn with_export_retry(mut self, limit: u32, delay: Duration) -> Self {
        self.export_retry_limit = limit;
        self.export_retry_delay = delay;
        self
    }

    /// Set the redirect target used after a successful OAuth callback.
    pub fn with_post_login_redirect(mut self, target: impl Into<String>) -> Self {
        self.post_login_redirect = Some(target.into());
        self
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingEnvVar(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn url_var(name: &'static str) -> Result<Option<Url>, ConfigError> {
    optional(name)
        .map(|raw| {
            Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn join(base: &Url, path: &str, var: &'static str) -> Result<Url, ConfigError> {
    base.join(path).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn default_url(raw: &str) -> Url {
    Url::parse(raw).expect("valid default URL")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Parse failure
        reason: String,
    },
}
