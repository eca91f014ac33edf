// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulus Manager - Kubernetes Cluster Lifecycle Control Plane
//!
//! Standalone process running:
//! - the cluster manager (create, update, delete, recovery of pending creations)
//! - the TTL controller
//!
//! Collaborators are the in-memory ones and only the dummy distribution has a
//! cloud client; embed [`cumulus_manager::runtime::ManagerRuntime`] to plug in
//! real ones.

use std::sync::Arc;
use tracing::{info, warn};

use cumulus_core::{Persistence, PostgresPersistence, SqlitePersistence, migrations};
use cumulus_manager::config::Config;
use cumulus_manager::runtime::ManagerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cumulus_manager=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        data_dir = %config.data_dir.display(),
        recover_on_start = config.recover_on_start,
        max_concurrent_operations = config.max_concurrent_operations,
        "Starting Cumulus Manager"
    );

    let persistence: Arc<dyn Persistence> = if config.database_url.starts_with("sqlite:") {
        Arc::new(SqlitePersistence::connect(&config.database_url).await?)
    } else {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        migrations::run_postgres(&pool).await?;
        Arc::new(PostgresPersistence::new(pool))
    };

    info!("Database schema verified");

    let runtime = ManagerRuntime::builder()
        .persistence(persistence)
        .config(config)
        .build()?
        .start()
        .await?;

    info!("Cumulus Manager ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Cumulus Manager shut down");

    Ok(())
}
