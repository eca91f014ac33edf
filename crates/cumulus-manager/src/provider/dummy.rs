// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dummy distribution.
//!
//! Runs the full lifecycle without any cloud: [`LocalCloud`] accepts every
//! placement, records synthetic resource ids and issues kubeconfigs pointing at
//! a non-routable API server.

use async_trait::async_trait;
use cumulus_core::{CloudProvider, ClusterRecord, NodePool};
use tracing::debug;

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::{CloudClient, ResourceIds, Result};
use super::traits::CommonCluster;
use crate::kubeconfig::Kubeconfig;

/// In-process cloud backing the dummy distribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCloud;

impl LocalCloud {
    fn short_uid(cluster: &ClusterRecord) -> String {
        cluster.uid.chars().take(8).collect()
    }
}

#[async_trait]
impl CloudClient for LocalCloud {
    fn cloud(&self) -> CloudProvider {
        CloudProvider::Dummy
    }

    async fn validate_location(&self, _location: &str) -> Result<()> {
        Ok(())
    }

    async fn validate_machine_type(&self, _location: &str, _machine_type: &str) -> Result<()> {
        Ok(())
    }

    async fn validate_image(&self, _location: &str, _image: &str) -> Result<()> {
        Ok(())
    }

    async fn provision(&self, cluster: &ClusterRecord) -> Result<ResourceIds> {
        debug!(cluster_id = cluster.id, "Provisioning dummy cluster");
        Ok(ResourceIds::from([(
            "cluster".to_string(),
            format!("dummy-{}", Self::short_uid(cluster)),
        )]))
    }

    async fn apply_node_pools(&self, _cluster: &ClusterRecord, _pools: &[NodePool]) -> Result<()> {
        Ok(())
    }

    async fn upgrade_control_plane(&self, _cluster: &ClusterRecord, _version: &str) -> Result<()> {
        Ok(())
    }

    async fn deprovision(&self, _cluster: &ClusterRecord) -> Result<()> {
        Ok(())
    }

    async fn fetch_kubeconfig(&self, cluster: &ClusterRecord) -> Result<String> {
        let ca = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            Self::short_uid(cluster)
        );
        let server = format!("https://{}.dummy.local:6443", cluster.name);
        Kubeconfig::generate(&cluster.name, &server, Some(&ca), &cluster.uid)
            .to_yaml()
            .map_err(|e| ProviderError::Infrastructure(e.to_string()))
    }
}

/// Test distribution.
pub struct DummyCluster {
    base: ClusterBase,
}

impl DummyCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for DummyCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        false
    }
}
