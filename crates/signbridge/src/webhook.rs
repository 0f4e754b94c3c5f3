// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signing-completion webhook events.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type the signature platform sends when every signer is done.
pub const DOCUMENT_COMPLETED: &str = "DocumentCompleted";

/// Envelope status that also marks a completed signing workflow.
pub const STATUS_COMPLETED: &str = "Completed";

/// Inbound webhook body as sent by the signature platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Event kind, e.g. `DocumentCompleted`
    pub event_type: String,
    /// Workflow status, e.g. `Completed`
    pub status: String,
    /// Signature platform document id
    pub doc_id: String,
    /// Where to download the signed PDF
    #[serde(default)]
    pub document_url: Option<String>,
    /// Original file name
    #[serde(default)]
    pub document_name: Option<String>,
    /// ISO date (or date-time) of completion
    pub completed_date: String,
    /// JSON-encoded [`CommitmentMetadata`]
    #[serde(default)]
    pub additional_data: Option<Value>,
}

/// Structural problems with an inbound webhook body.
#[derive(Debug, thiserror::Error)]
pub enum WebhookParseError {
    /// Body is not JSON or misses a required field.
    #[error("invalid webhook payload: {0}")]
    Json(#[from] serde_json::Error),
    /// `completedDate` is neither an ISO date nor an RFC 3339 timestamp.
    #[error("invalid completedDate: {0}")]
    CompletedDate(String),
}

/// A webhook event accepted into the queue. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Event kind
    pub event_type: String,
    /// Workflow status
    pub status: String,
    /// Signature platform document id
    pub doc_id: String,
    /// Where to download the signed PDF
    pub document_url: Option<String>,
    /// Original file name
    pub document_name: Option<String>,
    /// Completion date
    pub completed_date: NaiveDate,
    /// Opaque metadata identifying the upstream commitment
    pub additional_data: Option<Value>,
}

impl WebhookEvent {
    /// Parse and validate a raw webhook body.
    pub fn from_json(body: &[u8]) -> Result<Self, WebhookParseError> {
        let payload: WebhookPayload = serde_json::from_slice(body)?;
        Self::try_from(payload)
    }

    /// Whether this event should run the document-completion pipeline.
    pub fn is_completion(&self) -> bool {
        self.event_type == DOCUMENT_COMPLETED || self.status == STATUS_COMPLETED
    }

    /// Decode the commitment this event applies to.
    pub fn commitment(&self) -> Result<CommitmentMetadata, MetadataError> {
        CommitmentMetadata::decode(self.additional_data.as_ref())
    }
}

impl TryFrom<WebhookPayload> for WebhookEvent {
    type Error = WebhookParseError;

    fn try_from(payload: WebhookPayload) -> Result<Self, Self::Error> {
        let completed_date = parse_completed_date(&payload.completed_date)
            .ok_or_else(|| WebhookParseError::CompletedDate(payload.completed_date.clone()))?;

        Ok(Self {
            event_type: payload.event_type,
            status: payload.status,
            doc_id: payload.doc_id,
            document_url: payload.document_url.filter(|u| !u.trim().is_empty()),
            document_name: payload.document_name,
            completed_date,
            additional_data: payload.additional_data,
        })
    }
}

fn parse_completed_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Identifies the upstream commitment a completed signature applies to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentMetadata {
    /// Construction platform project id
    pub project_id: String,
    /// Commitment (contract) id
    pub commitment_id: String,
    /// Construction platform company id
    pub company_id: String,
}

/// Why `additionalData` could not be turned into [`CommitmentMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The event carried no `additionalData`.
    #[error("additionalData is missing")]
    Missing,
    /// `additionalData` did not decode.
    #[error("additionalData is malformed: {0}")]
    Malformed(String),
}

impl CommitmentMetadata {
    /// Decode from `additionalData`.
    ///
    /// Accepts either a JSON string containing the object (what the signature
    /// platform echoes back) or the object itself.
    pub fn decode(raw: Option<&Value>) -> Result<Self, MetadataError> {
        let value = match raw {
            None | Some(Value::Null) => return Err(MetadataError::Missing),
            Some(Value::String(s)) if s.trim().is_empty() => return Err(MetadataError::Missing),
            Some(Value::String(s)) => serde_json::from_str::<CommitmentMetadata>(s),
            Some(other) => serde_json::from_value::<CommitmentMetadata>(other.clone()),
        };
        let metadata = value.map_err(|e| MetadataError::Malformed(e.to_string()))?;

        if metadata.project_id.is_empty()
            || metadata.commitment_id.is_empty()
            || metadata.company_id.is_empty()
        {
            return Err(MetadataError::Malformed(
                "projectId, commitmentId and companyId must be non-empty".to_string(),
            ));
        }
        Ok(metadata)
    }
}
