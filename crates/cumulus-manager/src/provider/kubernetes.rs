// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bring-your-own clusters.
//!
//! The cluster already exists and is reached through a kubeconfig stored in the
//! secret store. The manager adopts it but never touches its infrastructure.

use async_trait::async_trait;
use cumulus_core::{NodePool, ProviderConfig};
use tracing::info;

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::{ResourceIds, Result};
use super::traits::CommonCluster;
use crate::kubeconfig::Kubeconfig;
use crate::request::{CreateClusterRequest, UpdateClusterRequest};

/// Resource id key recording the adopted kubeconfig secret.
pub const KUBECONFIG_SECRET_RESOURCE: &str = "kubeconfig_secret";

/// An existing cluster adopted through its kubeconfig.
pub struct ByocCluster {
    base: ClusterBase,
}

impl ByocCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }

    fn kubeconfig_secret_id(provider: &ProviderConfig) -> Result<&str> {
        match provider {
            ProviderConfig::Byoc {
                kubeconfig_secret_id,
            } if !kubeconfig_secret_id.trim().is_empty() => Ok(kubeconfig_secret_id),
            _ => Err(ProviderError::Validation(
                "BYOC cluster requires a kubeconfig secret".to_string(),
            )),
        }
    }

    /// Load the kubeconfig and check that it describes a cluster.
    async fn load_kubeconfig(&self, secret_id: &str) -> Result<String> {
        let organization_id = self.base.read(|r| r.organization_id);
        let secret = self
            .base
            .secrets()
            .get_secret(organization_id, secret_id)
            .await
            .map_err(ProviderError::from_external)?;
        let raw = secret.kubeconfig().ok_or_else(|| {
            ProviderError::Validation(format!("secret '{}' holds no kubeconfig", secret_id))
        })?;
        Kubeconfig::parse(raw).map_err(ProviderError::from_external)?;
        Ok(raw.to_string())
    }

    fn rejected_update() -> ProviderError {
        ProviderError::Validation("BYOC clusters are managed outside of cumulus".to_string())
    }
}

#[async_trait]
impl CommonCluster for ByocCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        false
    }

    fn validate_node_pools(&self, pools: &[NodePool]) -> Result<()> {
        if !pools.is_empty() {
            return Err(ProviderError::Validation(
                "BYOC clusters cannot define node pools".to_string(),
            ));
        }
        Ok(())
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        let secret_id = Self::kubeconfig_secret_id(&request.provider)?;
        self.validate_node_pools(&request.node_pools)?;
        self.load_kubeconfig(secret_id).await.map(|_| ())
    }

    async fn validate_update(&self, _request: &UpdateClusterRequest) -> Result<()> {
        Err(Self::rejected_update())
    }

    async fn create_cluster(&self) -> Result<()> {
        let secret_id = self
            .base
            .read(|r| Self::kubeconfig_secret_id(&r.provider).map(str::to_string))?;
        self.load_kubeconfig(&secret_id).await?;

        self.base.update(|r| {
            r.config_secret_id = Some(secret_id.clone());
            r.resource_ids =
                ResourceIds::from([(KUBECONFIG_SECRET_RESOURCE.to_string(), secret_id.clone())]);
        });
        self.persist().await
    }

    async fn update_cluster(&self, _request: &UpdateClusterRequest, _user_id: i64) -> Result<()> {
        Err(Self::rejected_update())
    }

    async fn delete_cluster(&self) -> Result<()> {
        info!(cluster_id = self.id(), "Releasing BYOC cluster, infrastructure left untouched");
        Ok(())
    }

    async fn download_k8s_config(&self) -> Result<String> {
        let secret_id = self
            .base
            .read(|r| Self::kubeconfig_secret_id(&r.provider).map(str::to_string))?;
        self.load_kubeconfig(&secret_id).await
    }
}
