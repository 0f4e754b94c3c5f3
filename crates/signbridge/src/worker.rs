// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker draining the webhook queue.
//!
//! The worker is the queue's only consumer. Events are handled one at a time
//! in arrival order, so upstream patches are never issued concurrently. A
//! failed event is logged and dropped; it never stops the loop. There is no
//! retry and no dead-letter path.
//!
//! Shutdown is observed while waiting for the next event. An event that is
//! already being processed runs to completion first.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::{CompletedDocument, DocumentPipeline, PipelineError};
use crate::queue::EventSource;
use crate::session::{AuthError, Platform, TokenCoordinator};
use crate::webhook::WebhookEvent;

/// Why an event was dropped.
#[derive(Debug, thiserror::Error)]
pub enum DropReason {
    /// No valid construction platform token could be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A pipeline step failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result of handling one event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Not a completion event; acknowledged without action.
    Ignored,
    /// Document uploaded and commitment patched.
    Completed(CompletedDocument),
    /// Processing stopped at a failure.
    Dropped(DropReason),
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Events taken off the queue
    pub processed: u64,
    /// Events that patched a commitment
    pub completed: u64,
    /// Non-completion events
    pub ignored: u64,
    /// Events dropped on failure
    pub dropped: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.processed += 1;
        match outcome {
            EventOutcome::Ignored => self.ignored += 1,
            EventOutcome::Completed(_) => self.completed += 1,
            EventOutcome::Dropped(_) => self.dropped += 1,
        }
    }
}

/// Sole consumer of the webhook queue.
pub struct WebhookWorker<S> {
    source: S,
    coordinator: Arc<TokenCoordinator>,
    pipeline: DocumentPipeline,
    shutdown: CancellationToken,
}

impl<S: EventSource> WebhookWorker<S> {
    /// Create a worker over an event source.
    pub fn new(source: S, coordinator: Arc<TokenCoordinator>, pipeline: DocumentPipeline) -> Self {
        Self {
            source,
            coordinator,
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the consumer loop until shutdown or until the queue is closed and drained.
    pub async fn run(mut self) -> WorkerStats {
        info!("Webhook worker started");
        let mut stats = WorkerStats::default();

        loop {
            let event = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Webhook worker received shutdown signal");
                    break;
                }

                event = self.source.next_event() => event,
            };

            let Some(event) = event else {
                info!("Webhook queue closed and drained");
                break;
            };

            let outcome = self.process(&event).await;
            log_outcome(&event, &outcome);
            stats.record(&outcome);
        }

        info!(
            processed = stats.processed,
            completed = stats.completed,
            ignored = stats.ignored,
            dropped = stats.dropped,
            "Webhook worker stopped"
        );
        stats
    }

    /// Handle a single event. Never panics on platform failures.
    pub async fn process(&self, event: &WebhookEvent) -> EventOutcome {
        if !event.is_completion() {
            return EventOutcome::Ignored;
        }

        let token = match self.coordinator.ensure_valid(Platform::Construction).await {
            Ok(token) => token,
            Err(e) => return EventOutcome::Dropped(e.into()),
        };

        match self.pipeline.run(&token, event).await {
            Ok(done) => EventOutcome::Completed(done),
            Err(e) => EventOutcome::Dropped(e.into()),
        }
    }
}

fn log_outcome(event: &WebhookEvent, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Ignored => debug!(
            doc_id = %event.doc_id,
            event_type = %event.event_type,
            status = %event.status,
            "Ignoring non-completion event"
        ),
        EventOutcome::Completed(_) => {}
        EventOutcome::Dropped(DropReason::Auth(e)) => error!(
            doc_id = %event.doc_id,
            error = %e,
            "Dropping event: construction platform session unavailable"
        ),
        EventOutcome::Dropped(DropReason::Pipeline(e)) if e.is_malformed() => warn!(
            doc_id = %event.doc_id,
            step = e.step(),
            error = %e,
            "Dropping malformed event"
        ),
        EventOutcome::Dropped(DropReason::Pipeline(e)) => error!(
            doc_id = %event.doc_id,
            step = e.step(),
            error = %e,
            "Dropping event after pipeline failure"
        ),
    }
}
