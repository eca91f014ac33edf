// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cumulus-manager.

use cumulus_core::CoreError;
use thiserror::Error;

use crate::provider::ProviderError;

/// Manager errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request is malformed or fails validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The cluster is not in a state that allows the operation.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A cluster with the same name already exists in the organization.
    #[error("Cluster '{name}' already exists in organization {organization_id}")]
    AlreadyExists {
        /// Owning organization.
        organization_id: i64,
        /// Duplicated name.
        name: String,
    },

    /// Cluster was not found.
    #[error("Cluster not found: {0}")]
    NotFound(String),

    /// Cloud provider operation failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Core persistence operation failed.
    #[error("Core error: {0}")]
    Core(CoreError),

    /// Secret store operation failed.
    #[error("Secret error: {0}")]
    Secret(String),

    /// Kubernetes API operation failed.
    #[error("Kubernetes error: {0}")]
    Kube(String),

    /// Deployment (Helm) operation failed.
    #[error("Deployment error: {0}")]
    Deployment(String),

    /// DNS registration failed.
    #[error("DNS error: {0}")]
    Dns(String),

    /// A post hook failed.
    #[error("Post hook '{hook}' failed: {message}")]
    Hook {
        /// Hook name.
        hook: &'static str,
        /// Failure message.
        message: String,
    },

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A background operation panicked.
    #[error("Operation panicked: {0}")]
    Panicked(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller rather than by the system.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidRequest(_)
            | Self::PreconditionFailed(_)
            | Self::AlreadyExists { .. }
            | Self::NotFound(_) => true,
            Self::Provider(e) => e.is_validation(),
            _ => false,
        }
    }

    /// Whether the error says the target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Provider(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Classify a provider error raised while validating a request: validation
    /// failures become [`Error::InvalidRequest`], everything else stays a
    /// provider error.
    pub fn from_validation(err: ProviderError) -> Self {
        match err {
            ProviderError::Core(core) => core.into(),
            err if err.is_validation() => Error::InvalidRequest(err.to_string()),
            err => Error::Provider(err),
        }
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ClusterNotFound { cluster_id } => Error::NotFound(cluster_id.to_string()),
            CoreError::ClusterAlreadyExists {
                organization_id,
                name,
            } => Error::AlreadyExists {
                organization_id,
                name,
            },
            CoreError::ValidationError { .. } => Error::InvalidRequest(err.to_string()),
            CoreError::InvalidClusterState { .. } => Error::PreconditionFailed(err.to_string()),
            other => Error::Core(other),
        }
    }
}

/// Result type using the manager Error.
pub type Result<T> = std::result::Result<T, Error>;
