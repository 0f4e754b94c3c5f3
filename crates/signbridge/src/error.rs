// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for signbridge.

use thiserror::Error;

/// Failure of a single outbound call to one of the external platforms.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("HTTP error during {operation}: {source}")]
    Http {
        /// Operation that was being performed
        operation: &'static str,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        /// Operation that was being performed
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The platform answered 2xx but the body was not what we expected.
    #[error("{operation} returned an unreadable body: {reason}")]
    Decode {
        /// Operation that was being performed
        operation: &'static str,
        /// Decoder message
        reason: String,
    },

    /// A request URL could not be built from the configured base.
    #[error("cannot build request URL from {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub(crate) fn http(operation: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { operation, source }
    }

    /// Pass through a successful response, or turn it into [`ApiError::Status`].
    pub(crate) async fn check(
        response: reqwest::Response,
        operation: &'static str,
    ) -> std::result::Result<reqwest::Response, Self> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Self::Status {
            operation,
            status,
            body,
        })
    }

    /// HTTP status reported by the platform, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http { source, .. } => source.status().map(|s| s.as_u16()),
            Self::Decode { .. } | Self::InvalidUrl(_) => None,
        }
    }
}

/// Service errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// No usable session for a platform.
    #[error("Auth error: {0}")]
    Auth(#[from] crate::session::AuthError),

    /// PDF export failed.
    #[error("Export error: {0}")]
    Export(#[from] crate::export::ExportError),

    /// Document-completion pipeline failed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    /// Webhook queue is closed.
    #[error("Queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    /// Outbound platform call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using the service Error.
pub type Result<T> = std::result::Result<T, Error>;
