// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for signbridge integration tests.
//!
//! Recording fakes for both platforms share one call log so tests can assert
//! the exact order of outbound calls.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use serde_json::{Value, json};

use signbridge::construction::{CommitmentPatch, ConstructionApi, ExportFetch};
use signbridge::error::ApiError;
use signbridge::oauth::{TokenEndpoint, TokenResponse};
use signbridge::session::{
    AccessToken, Platform, Session, SessionStore, TokenCoordinator, now_millis,
};
use signbridge::signature::{SignatureApi, SignatureError};
use signbridge::webhook::{CommitmentMetadata, WebhookEvent};

/// Bytes returned by [`RecordingSignature`] downloads.
pub const SIGNED_PDF: &[u8] = b"%PDF-1.7 signed";

/// One outbound call observed by a fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Download {
        url: String,
    },
    Upload {
        token: String,
        project_id: String,
        file_name: String,
        bytes: usize,
    },
    Patch {
        token: String,
        project_id: String,
        commitment_id: String,
        status: String,
        contract_date: NaiveDate,
        upload_ids: Vec<String>,
    },
    StartExport {
        commitment_id: String,
    },
    FetchExport {
        commitment_id: String,
    },
}

/// Shared, ordered call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }

    pub fn uploads(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Upload { .. }))
            .count()
    }

    pub fn patches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Patch { .. }))
            .count()
    }
}

/// Construction platform fake: numbered upload ids, optional failures.
pub struct RecordingConstruction {
    log: CallLog,
    uploads: AtomicU32,
    pub fail_upload: bool,
    pub fail_patch: bool,
}

impl RecordingConstruction {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            uploads: AtomicU32::new(0),
            fail_upload: false,
            fail_patch: false,
        }
    }
}

fn status_error(operation: &'static str, status: u16) -> ApiError {
    ApiError::Status {
        operation,
        status,
        body: "scripted failure".to_string(),
    }
}

#[async_trait]
impl ConstructionApi for RecordingConstruction {
    async fn start_export(
        &self,
        _token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<(), ApiError> {
        self.log.push(Call::StartExport {
            commitment_id: target.commitment_id.clone(),
        });
        Ok(())
    }

    async fn fetch_export(
        &self,
        _token: &AccessToken,
        target: &CommitmentMetadata,
    ) -> Result<ExportFetch, ApiError> {
        self.log.push(Call::FetchExport {
            commitment_id: target.commitment_id.clone(),
        });
        Ok(ExportFetch::Ready(Bytes::from_static(b"%PDF-1.7 export")))
    }

    async fn upload_document(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        file_name: &str,
        content: Bytes,
    ) -> Result<String, ApiError> {
        self.log.push(Call::Upload {
            token: token.as_str().to_string(),
            project_id: target.project_id.clone(),
            file_name: file_name.to_string(),
            bytes: content.len(),
        });
        if self.fail_upload {
            return Err(status_error("upload", 500));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("upload-{n}"))
    }

    async fn patch_commitment(
        &self,
        token: &AccessToken,
        target: &CommitmentMetadata,
        patch: &CommitmentPatch,
    ) -> Result<(), ApiError> {
        self.log.push(Call::Patch {
            token: token.as_str().to_string(),
            project_id: target.project_id.clone(),
            commitment_id: target.commitment_id.clone(),
            status: patch.status.clone(),
            contract_date: patch.contract_date,
            upload_ids: patch.upload_ids.clone(),
        });
        if self.fail_patch {
            return Err(status_error("commitment patch", 422));
        }
        Ok(())
    }
}

/// Signature platform fake returning [`SIGNED_PDF`].
pub struct RecordingSignature {
    log: CallLog,
    pub fail: bool,
}

impl RecordingSignature {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }
}

#[async_trait]
impl SignatureApi for RecordingSignature {
    async fn download_document(&self, document_url: &str) -> Result<Bytes, SignatureError> {
        self.log.push(Call::Download {
            url: document_url.to_string(),
        });
        if self.fail {
            return Err(status_error("document download", 404).into());
        }
        Ok(Bytes::from_static(SIGNED_PDF))
    }
}

/// Token endpoint answering every grant with the same token, or failing.
pub struct StaticTokens {
    access_token: Option<String>,
    refreshes: AtomicU32,
}

impl StaticTokens {
    pub fn issuing(access_token: &str) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            refreshes: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            access_token: None,
            refreshes: AtomicU32::new(0),
        }
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn respond(&self, operation: &'static str) -> Result<TokenResponse, ApiError> {
        match &self.access_token {
            Some(token) => Ok(TokenResponse {
                access_token: token.clone(),
                refresh_token: Some("rotated-refresh".to_string()),
                expires_in: Some(3600),
                token_type: Some("Bearer".to_string()),
            }),
            None => Err(status_error(operation, 400)),
        }
    }
}

#[async_trait]
impl TokenEndpoint for StaticTokens {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.respond("token refresh")
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, ApiError> {
        self.respond("token exchange")
    }
}

/// A construction platform session valid for the next hour.
pub fn valid_session(access_token: &str) -> Session {
    Session {
        access_token: Some(access_token.to_string()),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: Some(now_millis() + 3_600_000),
    }
}

/// Coordinator whose construction session is already valid.
pub async fn seeded_coordinator(
    access_token: &str,
    endpoint: Arc<dyn TokenEndpoint>,
) -> Arc<TokenCoordinator> {
    let coordinator = Arc::new(TokenCoordinator::new(Arc::new(SessionStore::new()), endpoint));
    coordinator
        .seed(Platform::Construction, valid_session(access_token))
        .await;
    coordinator
}

/// The commitment every test event points at.
pub fn commitment() -> CommitmentMetadata {
    CommitmentMetadata {
        project_id: "2001".to_string(),
        commitment_id: "3001".to_string(),
        company_id: "1001".to_string(),
    }
}

/// `additionalData` as the signature platform echoes it back: a JSON string.
pub fn encoded_commitment() -> Value {
    Value::String(json!({
        "projectId": "2001",
        "commitmentId": "3001",
        "companyId": "1001",
    })
    .to_string())
}

/// A `DocumentCompleted` event for `doc_id`.
pub fn completed_event(doc_id: &str, additional_data: Value) -> WebhookEvent {
    WebhookEvent {
        event_type: "DocumentCompleted".to_string(),
        status: "Completed".to_string(),
        doc_id: doc_id.to_string(),
        document_url: Some(format!("https://sign.example.com/documents/{doc_id}")),
        document_name: Some(format!("{doc_id}-signed.pdf")),
        completed_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        additional_data: Some(additional_data),
    }
}
