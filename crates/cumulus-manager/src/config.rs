// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for cumulus-manager.

use std::path::PathBuf;
use std::time::Duration;

/// Manager configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite (`sqlite:`) or PostgreSQL (`postgres:`) connection URL
    pub database_url: String,
    /// Root for local cluster state (certificates, monitoring targets)
    pub data_dir: PathBuf,
    /// Delay before a cluster is re-evaluated for TTL expiry
    pub ttl_requeue_interval: Duration,
    /// Re-drive clusters stuck in CREATING at startup
    pub recover_on_start: bool,
    /// Upper bound on concurrently running lifecycle operations
    pub max_concurrent_operations: usize,
    /// Attempts made while waiting for Helm to become ready
    pub helm_retry_attempts: u32,
    /// Fixed interval between Helm readiness attempts
    pub helm_retry_interval: Duration,
    /// Namespace that receives system deployments installed by post hooks
    pub hook_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            data_dir: PathBuf::from(".data"),
            ttl_requeue_interval: Duration::from_secs(300),
            recover_on_start: true,
            max_concurrent_operations: 32,
            helm_retry_attempts: 30,
            helm_retry_interval: Duration::from_secs(10),
            hook_namespace: "cumulus-system".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CUMULUS_DATABASE_URL`
    ///
    /// Optional (with defaults):
    /// - `CUMULUS_DATA_DIR` (`.data`)
    /// - `CUMULUS_TTL_REQUEUE_SECS` (300)
    /// - `CUMULUS_RECOVER_ON_START` (true)
    /// - `CUMULUS_MAX_CONCURRENT_OPERATIONS` (32)
    /// - `CUMULUS_HELM_RETRY_ATTEMPTS` (30)
    /// - `CUMULUS_HELM_RETRY_INTERVAL_SECS` (10)
    /// - `CUMULUS_HOOK_NAMESPACE` (`cumulus-system`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = std::env::var("CUMULUS_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CUMULUS_DATABASE_URL"))?;
        if !database_url.starts_with("sqlite:") && !database_url.starts_with("postgres") {
            return Err(ConfigError::Invalid(
                "CUMULUS_DATABASE_URL",
                "must be a sqlite: or postgres:// URL",
            ));
        }

        let data_dir = std::env::var("CUMULUS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let ttl_requeue_secs: u64 = parse_var("CUMULUS_TTL_REQUEUE_SECS", 300)?;
        if ttl_requeue_secs == 0 {
            return Err(ConfigError::Invalid(
                "CUMULUS_TTL_REQUEUE_SECS",
                "must be a positive integer",
            ));
        }

        let recover_on_start = std::env::var("CUMULUS_RECOVER_ON_START")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.recover_on_start);

        let max_concurrent_operations: usize = parse_var("CUMULUS_MAX_CONCURRENT_OPERATIONS", 32)?;
        if max_concurrent_operations == 0 {
            return Err(ConfigError::Invalid(
                "CUMULUS_MAX_CONCURRENT_OPERATIONS",
                "must be a positive integer",
            ));
        }

        let helm_retry_attempts: u32 = parse_var("CUMULUS_HELM_RETRY_ATTEMPTS", 30)?;
        if helm_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "CUMULUS_HELM_RETRY_ATTEMPTS",
                "must be a positive integer",
            ));
        }
        let helm_retry_interval_secs: u64 = parse_var("CUMULUS_HELM_RETRY_INTERVAL_SECS", 10)?;

        let hook_namespace =
            std::env::var("CUMULUS_HOOK_NAMESPACE").unwrap_or(defaults.hook_namespace);

        Ok(Self {
            database_url,
            data_dir,
            ttl_requeue_interval: Duration::from_secs(ttl_requeue_secs),
            recover_on_start,
            max_concurrent_operations,
            helm_retry_attempts,
            helm_retry_interval: Duration::from_secs(helm_retry_interval_secs),
            hook_namespace,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
