// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document-completion pipeline.
//!
//! For one completed signing event:
//!
//! 1. decode the commitment metadata carried in `additionalData`
//! 2. download the signed PDF from the signature platform
//! 3. upload it into the commitment's project
//! 4. patch the commitment: status `complete`, contract date, attached upload
//!
//! Each step needs the previous one. Nothing is rolled back: if the patch
//! fails after a successful upload, the upload stays orphaned and the error
//! names its id.

use std::sync::Arc;

use tracing::{debug, info};

use crate::construction::{CommitmentPatch, ConstructionApi};
use crate::error::ApiError;
use crate::session::AccessToken;
use crate::signature::{SignatureApi, SignatureError};
use crate::webhook::{CommitmentMetadata, MetadataError, WebhookEvent};

/// Pipeline failures, one per step.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// `additionalData` was absent or undecodable. No outbound call was made.
    #[error("malformed webhook payload: {0}")]
    MalformedMetadata(#[from] MetadataError),

    /// The event carried no document URL to download from.
    #[error("event has no document URL")]
    MissingDocumentUrl,

    /// Downloading the signed document failed.
    #[error("download failed: {0}")]
    Download(#[source] SignatureError),

    /// Uploading to the construction platform failed.
    #[error("upload failed: {0}")]
    Upload(#[source] ApiError),

    /// Patching the commitment failed; the upload already exists.
    #[error("commitment patch failed (upload {upload_id} left unattached): {source}")]
    Patch {
        /// Upload created before the failure
        upload_id: String,
        /// Underlying error
        #[source]
        source: ApiError,
    },
}

impl PipelineError {
    /// Short name of the step that failed, for logs.
    pub fn step(&self) -> &'static str {
        match self {
            Self::MalformedMetadata(_) => "metadata",
            Self::MissingDocumentUrl => "document_url",
            Self::Download(_) => "download",
            Self::Upload(_) => "upload",
            Self::Patch { .. } => "patch",
        }
    }

    /// Whether the event itself was unusable (as opposed to a platform call failing).
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedMetadata(_) | Self::MissingDocumentUrl)
    }
}

/// What a successful run did upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDocument {
    /// Commitment that was patched
    pub commitment: CommitmentMetadata,
    /// Upload attached to it
    pub upload_id: String,
    /// Size of the signed PDF
    pub bytes: usize,
}

/// Sequences download → upload → patch for one event.
pub struct DocumentPipeline {
    construction: Arc<dyn ConstructionApi>,
    signature: Arc<dyn SignatureApi>,
}

impl DocumentPipeline {
    /// Create a pipeline over the two platform clients.
    pub fn new(construction: Arc<dyn ConstructionApi>, signature: Arc<dyn SignatureApi>) -> Self {
        Self {
            construction,
            signature,
        }
    }

    /// Run every step for `event` using a valid construction platform token.
    pub async fn run(
        &self,
        token: &AccessToken,
        event: &WebhookEvent,
    ) -> Result<CompletedDocument, PipelineError> {
        let commitment = event.commitment()?;
        let document_url = event
            .document_url
            .as_deref()
            .ok_or(PipelineError::MissingDocumentUrl)?;

        debug!(
            doc_id = %event.doc_id,
            commitment_id = %commitment.commitment_id,
            "Downloading signed document"
        );
        let content = self
            .signature
            .download_document(document_url)
            .await
            .map_err(PipelineError::Download)?;
        let bytes = content.len();

        let file_name = upload_file_name(event);
        let upload_id = self
            .construction
            .upload_document(token, &commitment, &file_name, content)
            .await
            .map_err(PipelineError::Upload)?;

        let patch = CommitmentPatch::completed(event.completed_date, upload_id.clone());
        if let Err(source) = self
            .construction
            .patch_commitment(token, &commitment, &patch)
            .await
        {
            return Err(PipelineError::Patch { upload_id, source });
        }

        info!(
            doc_id = %event.doc_id,
            project_id = %commitment.project_id,
            commitment_id = %commitment.commitment_id,
            upload_id = %upload_id,
            bytes,
            "Commitment marked complete"
        );

        Ok(CompletedDocument {
            commitment,
            upload_id,
            bytes,
        })
    }
}

fn upload_file_name(event: &WebhookEvent) -> String {
    match event.document_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}.pdf", event.doc_id),
    }
}
