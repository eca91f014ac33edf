// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Google Kubernetes Engine.

use async_trait::async_trait;
use cumulus_core::{NodePool, ProviderConfig};

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::nodepool::is_dns1123_label;
use super::traits::{CommonCluster, validate_placement};
use crate::request::CreateClusterRequest;

/// Google Kubernetes Engine.
pub struct GkeCluster {
    base: ClusterBase,
}

impl GkeCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for GkeCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    // GKE injects its own node credentials.
    fn requires_ssh_public_key(&self) -> bool {
        false
    }

    fn validate_node_pools(&self, pools: &[NodePool]) -> Result<()> {
        match pools
            .iter()
            .find(|p| !p.to_delete && !is_dns1123_label(&p.name))
        {
            Some(pool) => Err(ProviderError::Validation(format!(
                "GKE node pool name '{}' is not a DNS-1123 label",
                pool.name
            ))),
            None => Ok(()),
        }
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        match &request.provider {
            ProviderConfig::Gke { project_id, .. } if !project_id.trim().is_empty() => {}
            _ => {
                return Err(ProviderError::Validation(
                    "GKE cluster requires a project id".to_string(),
                ));
            }
        }
        self.validate_node_pools(&request.node_pools)?;
        validate_placement(&self.base, request).await
    }
}
