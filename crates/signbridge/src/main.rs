// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Signbridge - Construction Commitments ⇄ Digital Signatures
//!
//! An HTTP service that:
//! - Keeps OAuth sessions for both platforms
//! - Exports commitment contracts as PDFs
//! - Attaches signed documents to commitments on completion webhooks

use tracing::{info, warn};

use signbridge::config::Config;
use signbridge::runtime::BridgeRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signbridge=info,tower_http=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        api_base = %config.construction_api_base,
        signature_refresh = config.signature_oauth.is_some(),
        export_retry_limit = config.export_retry_limit,
        export_retry_delay_ms = config.export_retry_delay.as_millis() as u64,
        "Starting signbridge"
    );

    let runtime = BridgeRuntime::builder()
        .config(config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Signbridge ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let stats = runtime.shutdown().await?;

    info!(
        processed = stats.processed,
        completed = stats.completed,
        dropped = stats.dropped,
        "Signbridge shut down"
    );

    Ok(())
}
