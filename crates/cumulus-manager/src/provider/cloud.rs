// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud client trait definitions.
//!
//! Defines the abstract interface over a cloud provider's infrastructure API.
//! Clients are PURE infrastructure adapters: they never touch the database or
//! cluster status; the cluster handle that calls them owns persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cumulus_core::{CloudProvider, ClusterRecord, NodePool};

use super::ProviderError;

/// Result type for cloud operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Provider resource identifiers, e.g. `{"vpc": "vpc-0a1b", "cluster": "arn:..."}`.
pub type ResourceIds = BTreeMap<String, String>;

/// Trait for cloud infrastructure clients.
///
/// One client per [`CloudProvider`]; distributions of the same cloud share it.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// The cloud this client talks to.
    fn cloud(&self) -> CloudProvider;

    /// Check that a region/location exists and is enabled for the account.
    async fn validate_location(&self, location: &str) -> Result<()>;

    /// Check that an instance type is offered in `location`.
    async fn validate_machine_type(&self, location: &str, machine_type: &str) -> Result<()>;

    /// Check that a machine image exists in `location`.
    async fn validate_image(&self, location: &str, image: &str) -> Result<()>;

    /// Provision the control plane and node pools of `cluster`.
    ///
    /// Returns the identifiers of the created resources.
    async fn provision(&self, cluster: &ClusterRecord) -> Result<ResourceIds>;

    /// Reconcile node pools against the full desired set. Pools with
    /// `to_delete` set are removed, pools without an id are created, the rest
    /// are updated in place (a no-op when nothing about them changed).
    async fn apply_node_pools(&self, cluster: &ClusterRecord, pools: &[NodePool]) -> Result<()>;

    /// Move the control plane to another Kubernetes version.
    async fn upgrade_control_plane(&self, cluster: &ClusterRecord, version: &str) -> Result<()>;

    /// Tear down every resource listed in `cluster.resource_ids`.
    ///
    /// Returns [`ProviderError::NotFound`] when the resources are already gone.
    async fn deprovision(&self, cluster: &ClusterRecord) -> Result<()>;

    /// Download an admin kubeconfig.
    async fn fetch_kubeconfig(&self, cluster: &ClusterRecord) -> Result<String>;
}
