// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory webhook queue.
//!
//! Unbounded, FIFO, many producers and one consumer. The consumer side is
//! exposed through [`EventSource`] so the worker does not depend on the
//! channel backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::webhook::WebhookEvent;

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The consumer side is gone; no further events are accepted.
    #[error("webhook queue is closed")]
    Closed,
}

/// Consumer side of a webhook queue.
#[async_trait]
pub trait EventSource: Send {
    /// Next event in enqueue order; `None` once the queue is closed and drained.
    async fn next_event(&mut self) -> Option<WebhookEvent>;
}

/// Producer handle. Cheap to clone; one per request handler is fine.
#[derive(Clone)]
pub struct WebhookQueue {
    tx: mpsc::UnboundedSender<WebhookEvent>,
    depth: Arc<AtomicUsize>,
}

impl WebhookQueue {
    /// Create an unbounded queue and its single receiver.
    pub fn unbounded() -> (WebhookQueue, WebhookReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            WebhookQueue {
                tx,
                depth: depth.clone(),
            },
            WebhookReceiver { rx, depth },
        )
    }

    /// Append an event. Never blocks.
    pub fn enqueue(&self, event: WebhookEvent) -> Result<(), QueueError> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        self.tx.send(event).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            QueueError::Closed
        })
    }

    /// Events accepted but not yet handed to the consumer.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Receiving half of [`WebhookQueue::unbounded`].
pub struct WebhookReceiver {
    rx: mpsc::UnboundedReceiver<WebhookEvent>,
    depth: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSource for WebhookReceiver {
    async fn next_event(&mut self) -> Option<WebhookEvent> {
        let event = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(event)
    }
}
