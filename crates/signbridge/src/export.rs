// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commitment PDF export poller.
//!
//! The construction platform renders PDFs asynchronously: a POST to the
//! export URL starts the job and GETs against the same URL return `202`/`204`
//! until the PDF is ready (`200`). The poller retries pending responses a
//! fixed number of times with a fixed delay; any other status ends the export
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::construction::{ConstructionApi, ExportFetch};
use crate::error::ApiError;
use crate::session::AccessToken;
use crate::webhook::CommitmentMetadata;

/// Default number of GET attempts before giving up.
pub const DEFAULT_RETRY_LIMIT: u32 = 7;

/// Default fixed delay between GET attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Retry budget for one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of GET attempts
    pub retry_limit: u32,
    /// Fixed wait after a pending response
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Export failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExportError {
    /// The POST that starts the job was rejected or did not go through.
    #[error("export start failed: {0}")]
    StartFailed(#[source] ApiError),

    /// A poll returned a status that is neither ready nor pending.
    #[error("export failed with status {status}: {body}")]
    Failed {
        /// HTTP status of the failing poll
        status: u16,
        /// Response body
        body: String,
    },

    /// A poll request could not be completed.
    #[error("export poll failed: {0}")]
    PollFailed(#[source] ApiError),

    /// The job was still pending after the whole retry budget.
    #[error("export not ready after {attempts} attempts")]
    TimedOut {
        /// GET attempts made
        attempts: u32,
    },

    /// The requesting caller went away.
    #[error("export cancelled")]
    Cancelled,
}

/// Drives start-export + poll-until-ready against the construction platform.
pub struct ExportPoller {
    api: Arc<dyn ConstructionApi>,
    policy: PollPolicy,
}

impl ExportPoller {
    /// Create a poller with the given retry policy.
    pub fn new(api: Arc<dyn ConstructionApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Export a commitment contract as PDF bytes.
    ///
    /// Returns [`ExportError::Cancelled`] as soon as `cancel` fires, whether the
    /// poller is waiting on the platform or between attempts.
    pub async fn export_pdf(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ExportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            started = self.api.start_export(token, target) => {
                started.map_err(ExportError::StartFailed)?;
            }
        }

        let mut remaining = self.policy.retry_limit;
        let mut attempts = 0u32;

        while remaining > 0 {
            attempts += 1;

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                fetched = self.api.fetch_export(token, target) => fetched,
            };

            match fetched.map_err(ExportError::PollFailed)? {
                ExportFetch::Ready(pdf) => {
                    info!(
                        commitment_id = %target.commitment_id,
                        attempts,
                        bytes = pdf.len(),
                        "Commitment PDF export ready"
                    );
                    return Ok(pdf);
                }
                ExportFetch::Rejected { status, body } => {
                    warn!(
                        commitment_id = %target.commitment_id,
                        attempts,
                        status,
                        "Commitment PDF export failed"
                    );
                    return Err(ExportError::Failed { status, body });
                }
                ExportFetch::Pending(status) => {
                    remaining -= 1;
                    debug!(
                        commitment_id = %target.commitment_id,
                        attempts,
                        remaining,
                        status,
                        "Commitment PDF export pending"
                    );
                    if remaining == 0 {
                        break;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                        _ = tokio::time::sleep(self.policy.delay) => {}
                    }
                }
            }
        }

        warn!(
            commitment_id = %target.commitment_id,
            attempts,
            "Commitment PDF export timed out"
        );
        Err(ExportError::TimedOut { attempts })
    }
}
