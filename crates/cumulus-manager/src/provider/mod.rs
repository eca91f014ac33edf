// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster abstraction and provider variants.
//!
//! Every distribution implements [`CommonCluster`]. Shared behaviour lives in the
//! trait's default methods on top of [`ClusterBase`]; a provider overrides only
//! what differs (validation rules, SSH requirements, update semantics).
//! [`ClusterFactory`] is the only place that maps a distribution to a type.

pub mod alibaba;
pub mod amazon;
pub mod azure;
mod base;
pub mod cloud;
pub mod dummy;
mod factory;
pub mod google;
pub mod kubernetes;
pub mod mock;
pub mod nodepool;
pub mod oracle;
mod traits;

pub use alibaba::{AckCluster, AcskCluster};
pub use amazon::{Ec2Cluster, EksCluster};
pub use azure::AksCluster;
pub use base::ClusterBase;
pub use cloud::{CloudClient, ResourceIds};
pub use dummy::DummyCluster;
pub use factory::ClusterFactory;
pub use google::GkeCluster;
pub use kubernetes::ByocCluster;
pub use mock::MockCloudClient;
pub use nodepool::compute_node_pool_update;
pub use oracle::OkeCluster;
pub use traits::*;

use cumulus_core::CoreError;
use thiserror::Error;

/// Errors from provider operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The request does not fit the provider (bad region, instance type, pool name).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A cloud API call failed.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// The resource does not exist (anymore).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The operation is not supported by this distribution.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Persisting cluster state failed.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl ProviderError {
    /// Whether the caller is at fault.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Unsupported(_) => true,
            Self::Core(CoreError::ValidationError { .. }) => true,
            _ => false,
        }
    }

    /// Whether the error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn from_external(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Provider(e) => e,
            crate::error::Error::NotFound(what) => Self::NotFound(what),
            other if other.is_client_error() => Self::Validation(other.to_string()),
            other => Self::Infrastructure(other.to_string()),
        }
    }
}
