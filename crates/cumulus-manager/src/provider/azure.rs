// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Azure Kubernetes Service.

use async_trait::async_trait;
use cumulus_core::{NodePool, ProviderConfig};

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::traits::{CommonCluster, validate_placement};
use crate::request::CreateClusterRequest;

/// AKS limits agent pool names to this many characters.
const MAX_POOL_NAME_LEN: usize = 12;

/// Azure Kubernetes Service.
pub struct AksCluster {
    base: ClusterBase,
}

impl AksCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for AksCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        true
    }

    fn validate_node_pools(&self, pools: &[NodePool]) -> Result<()> {
        for pool in pools.iter().filter(|p| !p.to_delete) {
            let valid = !pool.name.is_empty()
                && pool.name.len() <= MAX_POOL_NAME_LEN
                && pool
                    .name
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
            if !valid {
                return Err(ProviderError::Validation(format!(
                    "AKS node pool name '{}' must be lowercase alphanumeric, at most {} characters",
                    pool.name, MAX_POOL_NAME_LEN
                )));
            }
        }
        Ok(())
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        match &request.provider {
            ProviderConfig::Aks { resource_group, .. } if !resource_group.trim().is_empty() => {}
            _ => {
                return Err(ProviderError::Validation(
                    "AKS cluster requires a resource group".to_string(),
                ));
            }
        }
        self.validate_node_pools(&request.node_pools)?;
        validate_placement(&self.base, request).await
    }
}
