// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OAuth sessions and the token refresh coordinator.
//!
//! [`SessionStore`] holds one [`Session`] per [`Platform`]. It can be read by
//! anyone but is only written through [`TokenCoordinator`], which funnels every
//! refresh for a platform through a single-flight slot: callers that observe
//! an expired token while a refresh is already in progress wait for it and
//! reuse its result instead of issuing their own token request.
//!
//! ```text
//!   ensure_valid(p) ──► valid? ──yes──► token
//!                          │no
//!                          ▼
//!                 lock flight(p) ──► refresh finished while waiting? ──yes──► reuse result
//!                          │no
//!                          ▼
//!            refresh_token? ──no──► ReauthRequired
//!                          │yes
//!                          ▼
//!         POST token endpoint ──err──► RefreshFailed (session untouched)
//!                          │ok
//!                          ▼
//!           replace access/refresh/expiry ──► token
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::oauth::{TokenEndpoint, TokenResponse};

/// External platform a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Construction-management platform (documents, commitments)
    Construction,
    /// Digital-signature platform (signing workflows)
    Signature,
}

impl Platform {
    /// Stable lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Signature => "signature",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// OAuth credentials for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for API calls
    pub access_token: Option<String>,
    /// Long-lived token used to obtain a new access token
    pub refresh_token: Option<String>,
    /// Access token expiry, epoch milliseconds
    pub expires_at: Option<i64>,
}

impl Session {
    /// A session is valid iff it has an access token and `now < expires_at`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now_ms < expires_at,
            _ => false,
        }
    }

    /// Apply a token endpoint response on top of this session.
    ///
    /// The refresh token is kept when the platform does not rotate it.
    pub fn updated_with(&self, response: &TokenResponse, now_ms: i64) -> Session {
        let lifetime_ms = i64::try_from(response.lifetime_secs())
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Session {
            access_token: Some(response.access_token.clone()),
            refresh_token: response
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            expires_at: Some(now_ms.saturating_add(lifetime_ms)),
        }
    }
}

/// Access token handed to callers of [`TokenCoordinator::ensure_valid`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Authentication state reported by the status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    /// Whether the platform currently has a usable access token
    pub authenticated: bool,
    /// Expiry of the current (possibly stale) access token
    pub expires_at: Option<i64>,
}

/// Errors from obtaining a usable access token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No refresh token (or no token endpoint); a user has to log in again.
    #[error("{platform} session requires re-authentication")]
    ReauthRequired {
        /// Platform without a refreshable session
        platform: Platform,
    },

    /// The refresh-grant exchange failed; the stale session was left in place.
    #[error("{platform} token refresh failed: {reason}")]
    RefreshFailed {
        /// Platform whose refresh failed
        platform: Platform,
        /// HTTP status from the token endpoint, if it answered
        status: Option<u16>,
        /// Failure description
        reason: String,
    },

    /// The authorization-code exchange failed.
    #[error("{platform} authorization code exchange failed: {reason}")]
    ExchangeFailed {
        /// Platform the code was issued by
        platform: Platform,
        /// Failure description
        reason: String,
    },
}

/// Process-wide OAuth sessions, one per platform.
#[derive(Debug, Default)]
pub struct SessionStore {
    construction: RwLock<Session>,
    signature: RwLock<Session>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, platform: Platform) -> &RwLock<Session> {
        match platform {
            Platform::Construction => &self.construction,
            Platform::Signature => &self.signature,
        }
    }

    /// Copy of the current session.
    pub async fn snapshot(&self, platform: Platform) -> Session {
        self.slot(platform).read().await.clone()
    }

    /// The access token, if the session is valid at `now_ms`.
    pub async fn valid_token(&self, platform: Platform, now_ms: i64) -> Option<AccessToken> {
        let session = self.slot(platform).read().await;
        if session.is_valid_at(now_ms) {
            session.access_token.clone().map(AccessToken)
        } else {
            None
        }
    }

    pub(crate) async fn replace(&self, platform: Platform, session: Session) {
        *self.slot(platform).write().await = session;
    }

    pub(crate) async fn apply(
        &self,
        platform: Platform,
        response: &TokenResponse,
        now_ms: i64,
    ) -> Session {
        let mut session = self.slot(platform).write().await;
        *session = session.updated_with(response, now_ms);
        session.clone()
    }
}

/// Single-flight slot for one platform's refreshes.
#[derive(Default)]
struct RefreshFlight {
    /// Completed refresh attempts
    attempts: AtomicU64,
    /// Result of the most recent attempt
    last: Mutex<Option<Result<AccessToken, AuthError>>>,
}

/// Ensures valid access tokens exist before outbound calls.
///
/// The only writer of the [`SessionStore`].
pub struct TokenCoordinator {
    store: Arc<SessionStore>,
    construction: Arc<dyn TokenEndpoint>,
    signature: Option<Arc<dyn TokenEndpoint>>,
    construction_flight: RefreshFlight,
    signature_flight: RefreshFlight,
}

impl TokenCoordinator {
    /// Create a coordinator with the construction platform's token endpoint.
    pub fn new(store: Arc<SessionStore>, construction: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            construction,
            signature: None,
            construction_flight: RefreshFlight::default(),
            signature_flight: RefreshFlight::default(),
        }
    }

    /// Enable refreshes for the signature platform.
    pub fn with_signature_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.signature = Some(endpoint);
        self
    }

    /// The underlying store (read access).
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn endpoint(&self, platform: Platform) -> Option<&Arc<dyn TokenEndpoint>> {
        match platform {
            Platform::Construction => Some(&self.construction),
            Platform::Signature => self.signature.as_ref(),
        }
    }

    fn flight(&self, platform: Platform) -> &RefreshFlight {
        match platform {
            Platform::Construction => &self.construction_flight,
            Platform::Signature => &self.signature_flight,
        }
    }

    /// Install credentials obtained out of band (configuration, tests).
    pub async fn seed(&self, platform: Platform, session: Session) {
        debug!(platform = %platform, "Seeding session");
        self.store.replace(platform, session).await;
    }

    /// Current authentication state of a platform.
    pub async fn status(&self, platform: Platform) -> AuthStatus {
        let session = self.store.snapshot(platform).await;
        AuthStatus {
            authenticated: session.is_valid_at(now_millis()),
            expires_at: session.expires_at,
        }
    }

    /// Return a non-expired access token, refreshing first if needed.
    pub async fn ensure_valid(&self, platform: Platform) -> Result<AccessToken, AuthError> {
        self.single_flight(platform, false).await
    }

    /// Refresh regardless of the current expiry.
    pub async fn force_refresh(&self, platform: Platform) -> Result<AccessToken, AuthError> {
        self.single_flight(platform, true).await
    }

    /// Exchange an authorization code for a fresh construction platform session.
    pub async fn complete_authorization(&self, code: &str) -> Result<AuthStatus, AuthError> {
        let platform = Platform::Construction;
        let flight = self.flight(platform);
        let mut last = flight.last.lock().await;

        let response = self.construction.exchange_code(code).await.map_err(|e| {
            error!(platform = %platform, error = %e, "Authorization code exchange failed");
            AuthError::ExchangeFailed {
                platform,
                reason: e.to_string(),
            }
        })?;

        // A fresh login replaces the whole session; nothing from a stale one carries over.
        let session = Session::default().updated_with(&response, now_millis());
        self.store.replace(platform, session.clone()).await;
        *last = None;

        info!(platform = %platform, expires_at = ?session.expires_at, "Authorization completed");
        Ok(AuthStatus {
            authenticated: true,
            expires_at: session.expires_at,
        })
    }

    async fn single_flight(
        &self,
        platform: Platform,
        force: bool,
    ) -> Result<AccessToken, AuthError> {
        let flight = self.flight(platform);
        let seen = flight.attempts.load(Ordering::Acquire);

        if !force && let Some(token) = self.store.valid_token(platform, now_millis()).await {
            return Ok(token);
        }

        let mut last = flight.last.lock().await;

        if flight.attempts.load(Ordering::Acquire) != seen
            && let Some(result) = last.as_ref()
        {
            debug!(platform = %platform, "Reusing result of concurrent refresh");
            return result.clone();
        }

        if !force && let Some(token) = self.store.valid_token(platform, now_millis()).await {
            return Ok(token);
        }

        let result = self.refresh_locked(platform).await;
        *last = Some(result.clone());
        flight.attempts.fetch_add(1, Ordering::Release);
        result
    }

    /// Perform one refresh-grant exchange. Caller holds the platform's flight lock.
    async fn refresh_locked(&self, platform: Platform) -> Result<AccessToken, AuthError> {
        let session = self.store.snapshot(platform).await;

        let Some(refresh_token) = session.refresh_token else {
            warn!(platform = %platform, "No refresh token available, re-authentication required");
            return Err(AuthError::ReauthRequired { platform });
        };

        let Some(endpoint) = self.endpoint(platform) else {
            warn!(platform = %platform, "No token endpoint configured, re-authentication required");
            return Err(AuthError::ReauthRequired { platform });
        };

        info!(platform = %platform, "Refreshing access token");

        match endpoint.refresh(&refresh_token).await {
            Ok(response) => {
                let updated = self.store.apply(platform, &response, now_millis()).await;
                info!(
                    platform = %platform,
                    expires_at = ?updated.expires_at,
                    rotated = response.refresh_token.is_some(),
                    "Access token refreshed"
                );
                Ok(AccessToken(response.access_token))
            }
            Err(e) => {
                error!(platform = %platform, error = %e, "Token refresh failed");
                Err(AuthError::RefreshFailed {
                    platform,
                    status: e.status(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
