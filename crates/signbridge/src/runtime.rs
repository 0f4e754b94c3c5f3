// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for signbridge.
//!
//! [`BridgeRuntime`] wires the session coordinator, platform clients, webhook
//! queue, worker and HTTP server together and owns their tasks.
//!
//! ```rust,ignore
//! use signbridge::config::Config;
//! use signbridge::runtime::BridgeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BridgeRuntime::builder()
//!         .config(Config::from_env()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! Platform clients can be replaced with [`BridgeRuntimeBuilder::construction_api`],
//! [`BridgeRuntimeBuilder::signature_api`] and
//! [`BridgeRuntimeBuilder::token_endpoint`].

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::construction::{ConstructionApi, ConstructionClient};
use crate::export::{ExportPoller, PollPolicy};
use crate::handlers::AppState;
use crate::oauth::{OAuthClient, TokenEndpoint};
use crate::pipeline::DocumentPipeline;
use crate::queue::{WebhookQueue, WebhookReceiver};
use crate::server;
use crate::session::{Platform, Session, SessionStore, TokenCoordinator};
use crate::signature::{SignatureApi, SignatureClient};
use crate::worker::{WebhookWorker, WorkerStats};

/// Builder for creating a [`BridgeRuntime`].
#[derive(Default)]
pub struct BridgeRuntimeBuilder {
    config: Option<Config>,
    http: Option<reqwest::Client>,
    construction_api: Option<Arc<dyn ConstructionApi>>,
    signature_api: Option<Arc<dyn SignatureApi>>,
    token_endpoint: Option<Arc<dyn TokenEndpoint>>,
}

impl BridgeRuntimeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a preconfigured HTTP client for all outbound calls.
    ///
    /// Default: a client with `Config::http_timeout` applied.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the construction platform REST client.
    pub fn construction_api(mut self, api: Arc<dyn ConstructionApi>) -> Self {
        self.construction_api = Some(api);
        self
    }

    /// Replace the signature platform client.
    pub fn signature_api(mut self, api: Arc<dyn SignatureApi>) -> Self {
        self.signature_api = Some(api);
        self
    }

    /// Replace the construction platform token endpoint.
    pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if the configuration is missing or the HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<BridgeRuntimeConfig> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("config is required"))?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()?,
        };

        Ok(BridgeRuntimeConfig {
            config,
            http,
            construction_api: self.construction_api,
            signature_api: self.signature_api,
            token_endpoint: self.token_endpoint,
        })
    }
}

/// Configuration for a [`BridgeRuntime`].
pub struct BridgeRuntimeConfig {
    config: Config,
    http: reqwest::Client,
    construction_api: Option<Arc<dyn ConstructionApi>>,
    signature_api: Option<Arc<dyn SignatureApi>>,
    token_endpoint: Option<Arc<dyn TokenEndpoint>>,
}

/// Wired-up components, before any task is spawned.
pub struct BridgeParts {
    /// Shared handler state
    pub state: AppState,
    /// Queue consumer
    pub worker: WebhookWorker<WebhookReceiver>,
}

impl BridgeRuntimeConfig {
    /// Wire every component without spawning tasks or binding sockets.
    pub async fn into_parts(self) -> Result<BridgeParts> {
        let config = self.config;
        let http = self.http;

        let construction_oauth = Arc::new(OAuthClient::new(
            config.construction_oauth.clone(),
            http.clone(),
        ));
        let token_endpoint: Arc<dyn TokenEndpoint> = match self.token_endpoint {
            Some(endpoint) => endpoint,
            None => construction_oauth.clone() as Arc<dyn TokenEndpoint>,
        };

        let mut coordinator = TokenCoordinator::new(Arc::new(SessionStore::new()), token_endpoint);
        if let Some(settings) = &config.signature_oauth {
            coordinator = coordinator.with_signature_endpoint(Arc::new(OAuthClient::new(
                settings.clone(),
                http.clone(),
            )));
        }
        let coordinator = Arc::new(coordinator);

        if let Some(session) = signature_session(&config) {
            coordinator.seed(Platform::Signature, session).await;
        }

        let construction_api: Arc<dyn ConstructionApi> = match self.construction_api {
            Some(api) => api,
            None => Arc::new(ConstructionClient::new(
                config.construction_api_base.clone(),
                http.clone(),
            )),
        };
        let signature_api: Arc<dyn SignatureApi> = match self.signature_api {
            Some(api) => api,
            None => Arc::new(SignatureClient::new(http, coordinator.clone())),
        };

        let exporter = Arc::new(ExportPoller::new(
            construction_api.clone(),
            PollPolicy {
                retry_limit: config.export_retry_limit,
                delay: config.export_retry_delay,
            },
        ));

        let (queue, receiver) = WebhookQueue::unbounded();
        let worker = WebhookWorker::new(
            receiver,
            coordinator.clone(),
            DocumentPipeline::new(construction_api, signature_api),
        );

        let state = AppState {
            coordinator,
            oauth: construction_oauth,
            exporter,
            queue,
            pending_logins: Arc::new(Mutex::new(HashSet::new())),
            post_login_redirect: config.post_login_redirect.clone(),
        };

        Ok(BridgeParts { state, worker })
    }

    /// Start the runtime: spawn the webhook worker and the HTTP server.
    pub async fn start(self) -> Result<BridgeRuntime> {
        let bind_addr = self.config.http_addr;
        let cors_allowed_origins = self.config.cors_allowed_origins.clone();
        let parts = self.into_parts().await?;

        let shutdown = CancellationToken::new();

        let worker = parts.worker.with_shutdown(shutdown.child_token());
        let worker_handle = tokio::spawn(worker.run());

        let listener = server::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let app = server::router(parts.state.clone(), &cors_allowed_origins);
        let server_handle = tokio::spawn(server::serve(listener, app, shutdown.child_token()));

        info!(
            bind_addr = %bind_addr,
            local_addr = %local_addr,
            "BridgeRuntime started"
        );

        Ok(BridgeRuntime {
            server_handle,
            worker_handle,
            shutdown,
            state: parts.state,
            local_addr,
        })
    }
}

/// Initial signature platform session from configuration.
///
/// A pre-issued access token without a refresh token never expires locally.
/// With a refresh token the expiry is unknown, so the first use refreshes.
fn signature_session(config: &Config) -> Option<Session> {
    match (&config.signature_access_token, &config.signature_refresh_token) {
        (None, None) => None,
        (access, None) => Some(Session {
            access_token: access.clone(),
            refresh_token: None,
            expires_at: Some(i64::MAX),
        }),
        (access, Some(refresh)) => {
            // Without a token endpoint the refresh token is unusable, so the
            // access token is treated as static.
            let expires_at = if config.signature_oauth.is_some() {
                None
            } else {
                debug!("SIGNATURE_REFRESH_TOKEN set without SIGNATURE_TOKEN_URL; it will not be used");
                Some(i64::MAX)
            };
            Some(Session {
                access_token: access.clone(),
                refresh_token: Some(refresh.clone()),
                expires_at,
            })
        }
    }
}

/// A running signbridge instance.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct BridgeRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    worker_handle: JoinHandle<WorkerStats>,
    shutdown: CancellationToken,
    state: AppState,
    local_addr: SocketAddr,
}

impl BridgeRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BridgeRuntimeBuilder {
        BridgeRuntimeBuilder::new()
    }

    /// Address the HTTP server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops accepting HTTP connections, lets in-flight requests finish and
    /// stops the worker once its current event (if any) is done. Events still
    /// queued are discarded.
    pub async fn shutdown(self) -> Result<WorkerStats> {
        info!(
            queue_depth = self.state.queue.depth(),
            "BridgeRuntime shutting down..."
        );
        self.shutdown.cancel();

        let stats = match self.worker_handle.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Webhook worker task panicked: {}", e);
                WorkerStats::default()
            }
        };

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("BridgeRuntime shutdown complete");
                Ok(stats)
            }
            Ok(Err(e)) => {
                error!("HTTP server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("HTTP server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished() && !self.worker_handle.is_finished()
    }
}
