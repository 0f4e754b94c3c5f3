// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signbridge - Construction Commitments ⇄ Digital Signatures
//!
//! A small HTTP service sitting between a construction-management platform
//! (projects, commitment contracts, document uploads) and a digital-signature
//! platform. It keeps OAuth sessions for both, exports commitment contracts
//! as PDFs, and reacts to "document completed" webhooks by attaching the
//! signed PDF to the commitment and marking it complete.
//!
//! # Architecture
//!
//! ```text
//!   Browser / UI                           Signature platform
//!        │                                        │ webhook
//!        ▼                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      signbridge (This Crate)                     │
//! │                                                                  │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ auth routes  │   │ /api/send    │   │ /api/webhooks/...    │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────┬───────────┘  │
//! │         │                  │                      │ enqueue      │
//! │         ▼                  ▼                      ▼              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │    Token     │◄──│   Export     │   │   Webhook queue      │  │
//! │  │ Coordinator  │   │   Poller     │   │   (FIFO, unbounded)  │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────┬───────────┘  │
//! │         │                  │                      │ one consumer │
//! │         │                  │                      ▼              │
//! │         │                  │           ┌──────────────────────┐  │
//! │         │◄─────────────────┼───────────│  Webhook worker      │  │
//! │         │                  │           │  download → upload   │  │
//! │         │                  │           │  → patch commitment  │  │
//! │         │                  │           └──────────┬───────────┘  │
//! └─────────┼──────────────────┼──────────────────────┼──────────────┘
//!           ▼                  ▼                      ▼
//!     OAuth token         Construction REST API   Signature platform
//!     endpoints           (export, upload, patch) (document download)
//! ```
//!
//! # HTTP API
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness and webhook queue depth |
//! | `GET /api/auth/status` | Construction platform session state |
//! | `POST /api/auth/refresh` | Force a token refresh |
//! | `GET /api/auth/login` | Redirect to the OAuth authorization page |
//! | `GET /api/auth/callback` | Exchange the authorization code |
//! | `POST /api/send` | Export a commitment contract PDF |
//! | `POST /api/webhooks/signature` | Signing-platform webhook intake |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CONSTRUCTION_CLIENT_ID` | Yes | - | OAuth client ID |
//! | `CONSTRUCTION_CLIENT_SECRET` | Yes | - | OAuth client secret |
//! | `CONSTRUCTION_REDIRECT_URI` | Yes | - | Registered OAuth redirect URI |
//! | `SIGNBRIDGE_PORT` | No | `8080` | HTTP port |
//! | `CONSTRUCTION_API_BASE` | No | `https://api.procore.com` | REST API base |
//! | `CONSTRUCTION_LOGIN_BASE` | No | `https://login.procore.com` | OAuth base |
//! | `SIGNATURE_TOKEN_URL` | No | - | Signature platform token endpoint |
//! | `SIGNATURE_CLIENT_ID` | With token URL | - | Signature platform client ID |
//! | `SIGNATURE_CLIENT_SECRET` | With token URL | - | Signature platform client secret |
//! | `SIGNATURE_ACCESS_TOKEN` | No | - | Pre-issued signature access token |
//! | `SIGNATURE_REFRESH_TOKEN` | No | - | Pre-issued signature refresh token |
//! | `EXPORT_RETRY_LIMIT` | No | `7` | Export poll attempts |
//! | `EXPORT_RETRY_DELAY_MS` | No | `2000` | Delay between export polls |
//! | `HTTP_TIMEOUT_MS` | No | `30000` | Outbound HTTP timeout |
//! | `CORS_ALLOWED_ORIGINS` | No | any | Comma-separated origins |
//! | `POST_LOGIN_REDIRECT` | No | - | Redirect after OAuth callback |
//!
//! # Modules
//!
//! - [`config`]: Service configuration from environment variables
//! - [`error`]: Error types
//! - [`session`]: OAuth sessions and the single-flight token coordinator
//! - [`oauth`]: OAuth token endpoint client
//! - [`construction`]: Construction platform REST client
//! - [`signature`]: Signature platform client
//! - [`export`]: Commitment PDF export poller
//! - [`webhook`]: Webhook payload and commitment metadata decoding
//! - [`queue`]: In-memory webhook queue
//! - [`pipeline`]: Download → upload → patch for one completed document
//! - [`worker`]: Background consumer of the webhook queue
//! - [`handlers`]: HTTP request handlers
//! - [`server`]: Router and listener
//! - [`runtime`]: Embeddable runtime wiring everything together

#![deny(missing_docs)]

/// Service configuration loaded from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// OAuth sessions and token coordination.
pub mod session;

/// OAuth token endpoint client.
pub mod oauth;

/// Construction platform REST client.
pub mod construction;

/// Signature platform client.
pub mod signature;

/// Commitment PDF export poller.
pub mod export;

/// Webhook payload decoding.
pub mod webhook;

/// In-memory webhook queue.
pub mod queue;

/// Document-completion pipeline.
pub mod pipeline;

/// Background webhook worker.
pub mod worker;

/// HTTP request handlers.
pub mod handlers;

/// HTTP router and server.
pub mod server;

/// Embeddable runtime.
pub mod runtime;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::BridgeRuntime;
