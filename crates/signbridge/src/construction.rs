// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Construction-management platform REST client.
//!
//! Covers the four calls the bridge needs: start a commitment PDF export,
//! fetch the export result, upload a file to a project, and patch a
//! commitment record.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::session::AccessToken;
use crate::webhook::CommitmentMetadata;

/// Header carrying the company scope on every company-bound call.
pub const COMPANY_ID_HEADER: &str = "Procore-Company-Id";

/// Status written to a commitment once its contract is signed.
pub const STATUS_COMPLETE: &str = "complete";

/// Result of one GET against the export endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFetch {
    /// `200 OK`: the rendered PDF
    Ready(Bytes),
    /// `202 Accepted` or `204 No Content`: still rendering
    Pending(u16),
    /// Any other status: the job will not succeed
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: String,
    },
}

impl ExportFetch {
    /// Classify an export poll response status.
    pub fn classify(status: StatusCode, body: Bytes) -> Self {
        match status {
            StatusCode::OK => Self::Ready(body),
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Self::Pending(status.as_u16()),
            other => Self::Rejected {
                status: other.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            },
        }
    }
}

/// Update applied to a commitment record after signing completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitmentPatch {
    /// New workflow status
    pub status: String,
    /// Contract (signature) date
    pub contract_date: NaiveDate,
    /// Uploads to attach to the record
    pub upload_ids: Vec<String>,
}

impl CommitmentPatch {
    /// Patch marking a commitment signed on `contract_date` with one attachment.
    pub fn completed(contract_date: NaiveDate, upload_id: impl Into<String>) -> Self {
        Self {
            status: STATUS_COMPLETE.to_string(),
            contract_date,
            upload_ids: vec![upload_id.into()],
        }
    }
}

#[derive(Serialize)]
struct PatchEnvelope<'a> {
    commitment_contract: &'a CommitmentPatch,
}

/// Calls into the construction-management platform.
#[async_trait]
pub trait ConstructionApi: Send + Sync {
    /// POST the export endpoint to start rendering.
    async fn start_export(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<(), ApiError>;

    /// GET the export endpoint once.
    async fn fetch_export(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<ExportFetch, ApiError>;

    /// Upload a file into a project; returns the upload identifier.
    async fn upload_document(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        file_name: &str,
        content: Bytes,
    ) -> Result<String, ApiError>;

    /// Apply `patch` to the commitment record.
    async fn patch_commitment(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        patch: &CommitmentPatch,
    ) -> Result<(), ApiError>;
}

/// reqwest-backed [`ConstructionApi`].
pub struct ConstructionClient {
    base: Url,
    http: reqwest::Client,
}

impl ConstructionClient {
    /// Create a client rooted at the platform's API base URL.
    pub fn new(base: Url, http: reqwest::Client) -> Self {
        Self { base, http }
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Export URL for a commitment contract PDF.
    ///
    /// Deterministic in the three identifiers; POST starts the job, GET polls it.
    pub fn export_url(&self, target: &CommitmentMetadata) -> Result<Url, ApiError> {
        self.endpoint([
            "rest",
            "v1.0",
            "companies",
            target.company_id.as_str(),
            "projects",
            target.project_id.as_str(),
            "commitment_contracts",
            target.commitment_id.as_str(),
            "pdf",
        ])
    }

    fn upload_url(&self, target: &CommitmentMetadata) -> Result<Url, ApiError> {
        self.endpoint(["rest", "v1.1", "projects", target.project_id.as_str(), "uploads"])
    }

    fn commitment_url(&self, target: &CommitmentMetadata) -> Result<Url, ApiError> {
        self.endpoint([
            "rest",
            "v1.0",
            "projects",
            target.project_id.as_str(),
            "commitment_contracts",
            target.commitment_id.as_str(),
        ])
    }
}

#[async_trait]
impl ConstructionApi for ConstructionClient {
    async fn start_export(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<(), ApiError> {
        let url = self.export_url(target)?;
        debug!(url = %url, "Starting commitment PDF export");

        let response = self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .header(COMPANY_ID_HEADER, &target.company_id)
            .send()
            .await
            .map_err(ApiError::http("export start"))?;

        ApiError::check(response, "export start").await?;
        Ok(())
    }

    async fn fetch_export(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<ExportFetch, ApiError> {
        let response = self
            .http
            .get(self.export_url(target)?)
            .bearer_auth(token.as_str())
            .header(COMPANY_ID_HEADER, &target.company_id)
            .send()
            .await
            .map_err(ApiError::http("export poll"))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(ApiError::http("export poll"))?;
        Ok(ExportFetch::classify(status, body))
    }

    async fn upload_document(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        file_name: &str,
        content: Bytes,
    ) -> Result<String, ApiError> {
        let size = content.len();
        let part = Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(ApiError::http("upload"))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.upload_url(target)?)
            .bearer_auth(token.as_str())
            .header(COMPANY_ID_HEADER, &target.company_id)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::http("upload"))?;

        let response = ApiError::check(response, "upload").await?;
        let body: Value = response.json().await.map_err(|e| ApiError::Decode {
            operation: "upload",
            reason: e.to_string(),
        })?;

        let upload_id = upload_id_from(&body).ok_or_else(|| ApiError::Decode {
            operation: "upload",
            reason: "response carries neither uuid nor id".to_string(),
        })?;
        debug!(upload_id = %upload_id, bytes = size, "Uploaded document");
        Ok(upload_id)
    }

    async fn patch_commitment(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        patch: &CommitmentPatch,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .patch(self.commitment_url(target)?)
            .bearer_auth(token.as_str())
            .header(COMPANY_ID_HEADER, &target.company_id)
            .json(&PatchEnvelope {
                commitment_contract: patch,
            })
            .send()
            .await
            .map_err(ApiError::http("commitment patch"))?;

        ApiError::check(response, "commitment patch").await?;
        Ok(())
    }
}

fn upload_id_from(body: &Value) -> Option<String> {
    ["uuid", "id"].iter().find_map(|key| match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
