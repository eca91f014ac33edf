// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle request payloads.

use std::collections::BTreeMap;

use cumulus_core::{
    CloudProvider, ClusterFeatures, Distribution, NewCluster, NodePool, PostHookSpec,
    ProviderConfig, is_dns1123_label,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Request to create a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    /// Cluster name, unique within the organization.
    pub name: String,
    /// Cloud provider.
    pub cloud: CloudProvider,
    /// Distribution; must run on `cloud`.
    pub distribution: Distribution,
    /// Region / location.
    pub location: String,
    /// Cloud credential secret.
    pub secret_id: String,
    /// Pre-existing SSH key secret. Generated when required and absent.
    #[serde(default)]
    pub ssh_secret_id: Option<String>,
    /// Delete the cluster this many minutes after it became ready.
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
    /// Distribution-specific settings.
    pub provider: ProviderConfig,
    /// Worker node pools.
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
    /// Hooks run after the base post-hook chain.
    #[serde(default)]
    pub post_hooks: Vec<PostHookSpec>,
}

impl CreateClusterRequest {
    /// Check the request shape, independent of any provider.
    pub fn validate(&self) -> Result<()> {
        if !is_dns1123_label(&self.name) {
            return Err(Error::InvalidRequest(format!(
                "name '{}' must be a lowercase DNS-1123 label",
                self.name
            )));
        }
        if self.location.trim().is_empty() {
            return Err(Error::InvalidRequest("location must not be empty".to_string()));
        }
        if self.ttl_minutes.is_some_and(|ttl| ttl < 0) {
            return Err(Error::InvalidRequest(
                "ttl_minutes must not be negative".to_string(),
            ));
        }
        for pool in &self.node_pools {
            pool.validate_counts()?;
        }
        Ok(())
    }

    /// Insert shape for this request.
    pub fn to_new_cluster(&self, organization_id: i64, user_id: i64) -> NewCluster {
        NewCluster {
            organization_id,
            created_by: user_id,
            name: self.name.clone(),
            cloud: self.cloud,
            distribution: self.distribution,
            location: self.location.clone(),
            ttl_minutes: self.ttl_minutes,
            features: ClusterFeatures::default(),
            secret_id: self.secret_id.clone(),
            ssh_secret_id: self.ssh_secret_id.clone(),
            config_secret_id: None,
            provider: self.provider.clone(),
            node_pools: self.node_pools.clone(),
            post_hooks: self.post_hooks.clone(),
        }
    }
}

/// Who asked for a creation, and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationContext {
    /// Owning organization.
    pub organization_id: i64,
    /// Requesting user.
    pub user_id: i64,
    /// The request.
    pub request: CreateClusterRequest,
}

/// Who asked for an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateContext {
    /// Organization the caller acts for.
    pub organization_id: i64,
    /// Requesting user.
    pub user_id: i64,
}

/// Request to update a cluster. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClusterRequest {
    /// Full desired node pool set.
    #[serde(default)]
    pub node_pools: Option<Vec<NodePool>>,
    /// Desired Kubernetes version.
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    /// New TTL in minutes, 0 disables expiry.
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

/// Partial change of one node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolPatch {
    /// Desired count.
    #[serde(default)]
    pub count: Option<u32>,
    /// Autoscaling lower bound.
    #[serde(default)]
    pub min_count: Option<u32>,
    /// Autoscaling upper bound.
    #[serde(default)]
    pub max_count: Option<u32>,
    /// Toggle autoscaling.
    #[serde(default)]
    pub autoscaling: Option<bool>,
}

/// Request touching only existing node pools, keyed by pool name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolUpdateRequest {
    /// Changes per pool.
    pub node_pools: BTreeMap<String, NodePoolPatch>,
}

impl NodePoolUpdateRequest {
    /// Names referenced by the request that `stored` does not contain.
    pub fn unknown_pools<'a>(&'a self, stored: &[NodePool]) -> Vec<&'a str> {
        self.node_pools
            .keys()
            .filter(|name| !stored.iter().any(|p| &p.name == *name))
            .map(String::as_str)
            .collect()
    }

    /// Expand into a full update request; untouched pools are kept as stored.
    pub fn to_update_request(&self, stored: &[NodePool]) -> UpdateClusterRequest {
        let pools = stored
            .iter()
            .map(|pool| {
                let mut pool = pool.clone();
                if let Some(patch) = self.node_pools.get(&pool.name) {
                    if let Some(count) = patch.count {
                        pool.count = count;
                    }
                    if let Some(min) = patch.min_count {
                        pool.min_count = min;
                    }
                    if let Some(max) = patch.max_count {
                        pool.max_count = max;
                    }
                    if let Some(autoscaling) = patch.autoscaling {
                        pool.autoscaling = autoscaling;
                    }
                }
                pool
            })
            .collect();

        UpdateClusterRequest {
            node_pools: Some(pools),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_pool_update_preserves_untouched_pools() {
        let stored = vec![
            NodePool::new("a", "small", 1),
            NodePool::new("b", "small", 2),
        ];
        let request = NodePoolUpdateRequest {
            node_pools: BTreeMap::from([(
                "b".to_string(),
                NodePoolPatch {
                    count: Some(4),
                    max_count: Some(5),
                    ..Default::default()
                },
            )]),
        };

        assert!(request.unknown_pools(&stored).is_empty());

        let update = request.to_update_request(&stored);
        let pools = update.node_pools.unwrap();
        assert_eq!(pools[0], stored[0]);
        assert_eq!(pools[1].count, 4);
        assert_eq!(pools[1].max_count, 5);
        assert!(update.kubernetes_version.is_none());
    }

    #[test]
    fn test_unknown_pools_are_reported() {
        let stored = vec![NodePool::new("a", "small", 1)];
        let request = NodePoolUpdateRequest {
            node_pools: BTreeMap::from([
                ("a".to_string(), NodePoolPatch::default()),
                ("ghost".to_string(), NodePoolPatch::default()),
            ]),
        };
        assert_eq!(request.unknown_pools(&stored), vec!["ghost"]);
    }
}
