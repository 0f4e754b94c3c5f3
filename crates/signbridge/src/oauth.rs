// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OAuth2 token endpoint client.
//!
//! Both platforms use the standard form-encoded token endpoint. The
//! construction platform additionally goes through the authorization-code
//! flow; the signature platform is only ever refreshed.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::OAuthSettings;
use crate::error::ApiError;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Token response from a platform token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// Rotated refresh token; platforms may omit rotation
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Lifetime in seconds, falling back to [`DEFAULT_EXPIRES_IN_SECS`].
    pub fn lifetime_secs(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)
    }
}

/// A token endpoint the session coordinator can exchange grants against.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// `grant_type=refresh_token`
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError>;

    /// `grant_type=authorization_code`
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ApiError>;
}

/// reqwest-backed [`TokenEndpoint`].
pub struct OAuthClient {
    settings: OAuthSettings,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a client for the given platform settings.
    pub fn new(settings: OAuthSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    /// Build the authorization URL the browser is redirected to.
    ///
    /// Returns `None` when the platform has no authorization-code flow configured.
    pub fn authorization_url(&self, state: &str) -> Option<Url> {
        let mut url = self.settings.authorize_url.clone()?;
        let redirect_uri = self.settings.redirect_uri.as_ref()?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("state", state);
        Some(url)
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, ApiError> {
        let response = self
            .http
            .post(self.settings.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(ApiError::http(operation))?;

        let response = ApiError::check(response, operation).await?;
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ApiError::Decode {
                operation,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ApiError> {
        let redirect_uri = self
            .settings
            .redirect_uri
            .as_ref()
            .map(Url::as_str)
            .unwrap_or_default();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];
        self.token_request(&params, "token exchange").await
    }
}
