// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signature platform client.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::ApiError;
use crate::session::{AuthError, Platform, TokenCoordinator};

/// Calls into the digital-signature platform.
#[async_trait]
pub trait SignatureApi: Send + Sync {
    /// Download a signed document from the URL supplied by a webhook.
    async fn download_document(&self, document_url: &str) -> Result<Bytes, SignatureError>;
}

/// Errors from the signature platform client.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// A signature session exists but could not be made valid.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The download call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The platform returned an empty document.
    #[error("downloaded document from {0} is empty")]
    Empty(String),
}

/// reqwest-backed [`SignatureApi`].
///
/// Authenticates with the signature platform session when one is configured;
/// otherwise the document URL is fetched as-is (pre-signed URLs).
pub struct SignatureClient {
    http: reqwest::Client,
    coordinator: Arc<TokenCoordinator>,
}

impl SignatureClient {
    /// Create a client sharing the process-wide token coordinator.
    pub fn new(http: reqwest::Client, coordinator: Arc<TokenCoordinator>) -> Self {
        Self { http, coordinator }
    }
}

#[async_trait]
impl SignatureApi for SignatureClient {
    async fn download_document(&self, document_url: &str) -> Result<Bytes, SignatureError> {
        let token = match self.coordinator.ensure_valid(Platform::Signature).await {
            Ok(token) => Some(token),
            Err(AuthError::ReauthRequired { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let mut request = self.http.get(document_url);
        if let Some(token) = &token {
            request = request.bearer_auth(token.as_str());
        }
        debug!(authenticated = token.is_some(), "Downloading signed document");

        let response = request
            .send()
            .await
            .map_err(ApiError::http("document download"))?;
        let response = ApiError::check(response, "document download").await?;
        let content = response
            .bytes()
            .await
            .map_err(ApiError::http("document download"))?;

        if content.is_empty() {
            return Err(SignatureError::Empty(document_url.to_string()));
        }
        Ok(content)
    }
}
