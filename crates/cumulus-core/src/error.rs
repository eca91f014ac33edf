// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cumulus-core.
//!
//! Provides a unified error type with stable, machine-readable error codes.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while reading or writing cluster state.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Cluster was not found in the database.
    ClusterNotFound {
        /// The cluster ID that was not found.
        cluster_id: i64,
    },

    /// A cluster with the same name already exists in the organization.
    ClusterAlreadyExists {
        /// Owning organization.
        organization_id: i64,
        /// The duplicated cluster name.
        name: String,
    },

    /// Cluster is in an invalid state for the requested operation.
    InvalidClusterState {
        /// The cluster ID.
        cluster_id: i64,
        /// The expected status (or set of statuses).
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ClusterNotFound { .. } => "CLUSTER_NOT_FOUND",
            Self::ClusterAlreadyExists { .. } => "CLUSTER_ALREADY_EXISTS",
            Self::InvalidClusterState { .. } => "INVALID_CLUSTER_STATE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Shorthand for a validation error on a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterNotFound { cluster_id } => {
                write!(f, "Cluster '{}' not found", cluster_id)
            }
            Self::ClusterAlreadyExists {
                organization_id,
                name,
            } => {
                write!(
                    f,
                    "Cluster '{}' already exists in organization {}",
                    name, organization_id
                )
            }
            Self::InvalidClusterState {
                cluster_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Cluster '{}' is in invalid state: expected '{}', got '{}'",
                    cluster_id, expected, actual
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
