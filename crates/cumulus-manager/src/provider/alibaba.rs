// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Alibaba Cloud distributions: ACK and serverless ACSK.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use cumulus_core::{NodePool, ProviderConfig};

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::traits::{CommonCluster, validate_placement};
use crate::request::CreateClusterRequest;

/// Node count bounds accepted by ACK node pools.
pub const ACK_POOL_SIZE: RangeInclusive<u32> = 1..=100;

/// Alibaba Container Service for Kubernetes.
pub struct AckCluster {
    base: ClusterBase,
}

impl AckCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for AckCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        true
    }

    fn validate_node_pools(&self, pools: &[NodePool]) -> Result<()> {
        for pool in pools.iter().filter(|p| !p.to_delete) {
            if !ACK_POOL_SIZE.contains(&pool.min_count) || !ACK_POOL_SIZE.contains(&pool.max_count)
            {
                return Err(ProviderError::Validation(format!(
                    "ACK node pool '{}' size must stay within {}..={}",
                    pool.name,
                    ACK_POOL_SIZE.start(),
                    ACK_POOL_SIZE.end()
                )));
            }
        }
        Ok(())
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        match &request.provider {
            ProviderConfig::Ack { zone_id } if !zone_id.trim().is_empty() => {}
            _ => {
                return Err(ProviderError::Validation(
                    "ACK cluster requires a zone id".to_string(),
                ));
            }
        }
        self.validate_node_pools(&request.node_pools)?;
        validate_placement(&self.base, request).await
    }
}

/// Alibaba serverless Kubernetes. Capacity is managed by the platform, so the
/// cluster never has node pools.
pub struct AcskCluster {
    base: ClusterBase,
}

impl AcskCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for AcskCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        false
    }

    fn validate_node_pools(&self, pools: &[NodePool]) -> Result<()> {
        if pools.iter().any(|p| !p.to_delete) {
            return Err(ProviderError::Validation(
                "ACSK clusters are serverless and cannot define node pools".to_string(),
            ));
        }
        Ok(())
    }
}
