// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for cumulus-manager.
//!
//! [`ManagerRuntime`] wires a [`ClusterManager`] and its TTL controller into an
//! existing tokio application.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cumulus_core::SqlitePersistence;
//! use cumulus_manager::runtime::ManagerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = Arc::new(SqlitePersistence::from_path("cumulus.db").await?);
//!
//!     let runtime = ManagerRuntime::builder()
//!         .persistence(persistence)
//!         .cloud_client(Arc::new(my_aws_client))
//!         .data_dir("/var/lib/cumulus")
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let manager = runtime.manager();
//!     // ... create, update and delete clusters ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cumulus_core::Persistence;
use tracing::{info, warn};

use crate::config::Config;
use crate::external::Collaborators;
use crate::manager::ClusterManager;
use crate::provider::{CloudClient, ClusterFactory};
use crate::supervisor::{ErrorHandler, LoggingErrorHandler};
use crate::ttl::{TtlController, TtlControllerHandle};

/// Builder for a [`ManagerRuntime`].
pub struct ManagerRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    collaborators: Option<Collaborators>,
    cloud_clients: Vec<Arc<dyn CloudClient>>,
    error_handler: Arc<dyn ErrorHandler>,
    config: Config,
}

impl Default for ManagerRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            collaborators: None,
            cloud_clients: Vec::new(),
            error_handler: Arc::new(LoggingErrorHandler),
            config: Config::default(),
        }
    }
}

impl ManagerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the external collaborators.
    ///
    /// Default: in-memory collaborators.
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Register the cloud client of one provider. A later client for the same
    /// provider replaces the earlier one.
    pub fn cloud_client(mut self, client: Arc<dyn CloudClient>) -> Self {
        self.cloud_clients.push(client);
        self
    }

    /// Set the sink for background failures.
    ///
    /// Default: [`LoggingErrorHandler`]
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Take every setting from a loaded [`Config`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the directory for certificates and monitoring targets.
    ///
    /// Default: `.data`
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set how often live clusters are re-checked for TTL expiry.
    ///
    /// Default: 5 minutes
    pub fn ttl_requeue_interval(mut self, interval: Duration) -> Self {
        self.config.ttl_requeue_interval = interval;
        self
    }

    /// Re-drive clusters left in `CREATING` when starting.
    ///
    /// Default: `true`
    pub fn recover_on_start(mut self, enabled: bool) -> Self {
        self.config.recover_on_start = enabled;
        self
    }

    /// Set how many lifecycle operations may run at once.
    ///
    /// Default: 32
    pub fn max_concurrent_operations(mut self, max: usize) -> Self {
        self.config.max_concurrent_operations = max;
        self
    }

    /// Set the Helm readiness retry policy.
    ///
    /// Default: 30 attempts, 10 seconds apart
    pub fn helm_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.helm_retry_attempts = attempts;
        self.config.helm_retry_interval = interval;
        self
    }

    /// Set the namespace receiving add-ons installed by post hooks.
    ///
    /// Default: `cumulus-system`
    pub fn hook_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.hook_namespace = namespace.into();
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ManagerRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        if self.config.max_concurrent_operations == 0 {
            anyhow::bail!("max_concurrent_operations must be at least 1");
        }
        if self.config.helm_retry_attempts == 0 {
            anyhow::bail!("helm retry attempts must be at least 1");
        }
        if self.config.ttl_requeue_interval.is_zero() {
            anyhow::bail!("ttl_requeue_interval must be positive");
        }

        Ok(ManagerRuntimeConfig {
            persistence,
            collaborators: self.collaborators.unwrap_or_else(Collaborators::in_memory),
            cloud_clients: self.cloud_clients,
            error_handler: self.error_handler,
            config: self.config,
        })
    }
}

/// Configuration for a [`ManagerRuntime`].
pub struct ManagerRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    collaborators: Collaborators,
    cloud_clients: Vec<Arc<dyn CloudClient>>,
    error_handler: Arc<dyn ErrorHandler>,
    config: Config,
}

impl ManagerRuntimeConfig {
    /// Build the manager, resume pending creations and start the TTL controller.
    pub async fn start(self) -> Result<ManagerRuntime> {
        if !self.persistence.health_check_db().await? {
            anyhow::bail!("database health check failed");
        }

        let factory = self.cloud_clients.into_iter().fold(
            ClusterFactory::new(self.persistence, self.collaborators.secrets.clone()),
            ClusterFactory::with_cloud_client,
        );
        let manager = ClusterManager::new(
            factory,
            self.collaborators,
            &self.config,
            self.error_handler,
        );

        if self.config.recover_on_start {
            match manager.retry_pending_operations().await {
                Ok(count) => info!(count, "Pending operations checked"),
                Err(e) => warn!(error = %e, "Failed to resume pending operations"),
            }
        }

        let ttl = TtlController::new(manager.clone(), self.config.ttl_requeue_interval)
            .start()
            .await?;

        info!(
            data_dir = %self.config.data_dir.display(),
            max_concurrent_operations = self.config.max_concurrent_operations,
            "ManagerRuntime started"
        );

        Ok(ManagerRuntime { manager, ttl })
    }
}

/// A running cumulus-manager.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ManagerRuntime {
    manager: ClusterManager,
    ttl: TtlControllerHandle,
}

impl ManagerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ManagerRuntimeBuilder {
        ManagerRuntimeBuilder::new()
    }

    /// The cluster manager.
    pub fn manager(&self) -> &ClusterManager {
        &self.manager
    }

    /// Stop the TTL controller, then wait for running operations.
    pub async fn shutdown(self) -> Result<()> {
        info!("ManagerRuntime shutting down...");
        self.ttl.shutdown().await;
        self.manager.wait_for_background_tasks().await;
        info!("ManagerRuntime shutdown complete");
        Ok(())
    }
}
