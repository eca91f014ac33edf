// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The cluster abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cumulus_core::{
    CloudProvider, ClusterFeature, ClusterFeatures, ClusterRecord, ClusterStatus, Distribution,
    NodePool,
};
use serde::Serialize;
use tracing::{debug, info};

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::nodepool::{assign_pool_ids, compute_node_pool_update};
use crate::request::{CreateClusterRequest, UpdateClusterRequest};

/// Status of one node pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePoolStatus {
    /// Pool name.
    pub name: String,
    /// Instance type.
    pub instance_type: String,
    /// Desired count.
    pub count: u32,
    /// Autoscaling lower bound.
    pub min_count: u32,
    /// Autoscaling upper bound.
    pub max_count: u32,
    /// Whether autoscaling is enabled.
    pub autoscaling: bool,
    /// When the pool was provisioned.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&NodePool> for NodePoolStatus {
    fn from(pool: &NodePool) -> Self {
        Self {
            name: pool.name.clone(),
            instance_type: pool.instance_type.clone(),
            count: pool.count,
            min_count: pool.min_count,
            max_count: pool.max_count,
            autoscaling: pool.autoscaling,
            created_at: pool.created_at,
        }
    }
}

/// Cluster status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    /// Cluster id.
    pub id: i64,
    /// Cluster name.
    pub name: String,
    /// Location.
    pub location: String,
    /// Cloud.
    pub cloud: CloudProvider,
    /// Distribution.
    pub distribution: Distribution,
    /// Lifecycle status.
    pub status: ClusterStatus,
    /// Message attached to the status.
    pub status_message: Option<String>,
    /// Kubernetes version, when the distribution declares one.
    pub kubernetes_version: Option<String>,
    /// Node pools.
    pub node_pools: Vec<NodePoolStatus>,
    /// TTL in minutes.
    pub ttl_minutes: Option<i64>,
    /// Installed add-ons.
    pub features: ClusterFeatures,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Location, instance type and image checks shared by cloud-backed providers.
pub(crate) async fn validate_placement(
    base: &ClusterBase,
    request: &CreateClusterRequest,
) -> Result<()> {
    let cloud = base.cloud()?;
    cloud.validate_location(&request.location).await?;
    for pool in &request.node_pools {
        cloud
            .validate_machine_type(&request.location, &pool.instance_type)
            .await?;
        if let Some(image) = &pool.image {
            cloud.validate_image(&request.location, image).await?;
        }
    }
    Ok(())
}

/// Pools compared by their user-controlled fields only.
fn same_pools(a: &[NodePool], b: &[NodePool]) -> bool {
    fn normalized(pools: &[NodePool]) -> Vec<NodePool> {
        pools
            .iter()
            .map(|p| NodePool {
                id: None,
                created_at: None,
                to_delete: false,
                ..p.clone()
            })
            .collect()
    }
    normalized(a) == normalized(b)
}

/// A cluster handle.
///
/// Handles are created by the [`ClusterFactory`](super::ClusterFactory) and shared
/// as `Arc<dyn CommonCluster>` between the manager, background tasks and the TTL
/// controller.
#[async_trait]
pub trait CommonCluster: Send + Sync {
    /// Shared state.
    fn base(&self) -> &ClusterBase;

    /// Whether provisioning needs an SSH public key.
    fn requires_ssh_public_key(&self) -> bool;

    /// Database id.
    fn id(&self) -> i64 {
        self.base().read(|r| r.id)
    }

    /// Globally unique id.
    fn uid(&self) -> String {
        self.base().read(|r| r.uid.clone())
    }

    /// Name.
    fn name(&self) -> String {
        self.base().read(|r| r.name.clone())
    }

    /// Owning organization.
    fn organization_id(&self) -> i64 {
        self.base().read(|r| r.organization_id)
    }

    /// Cloud.
    fn cloud(&self) -> CloudProvider {
        self.base().read(|r| r.cloud)
    }

    /// Distribution.
    fn distribution(&self) -> Distribution {
        self.base().read(|r| r.distribution)
    }

    /// Location.
    fn location(&self) -> String {
        self.base().read(|r| r.location.clone())
    }

    /// Cached status.
    fn status(&self) -> ClusterStatus {
        self.base().read(|r| r.status)
    }

    /// TTL in minutes.
    fn ttl(&self) -> Option<i64> {
        self.base().read(|r| r.ttl_minutes)
    }

    /// Snapshot of the record.
    fn model(&self) -> ClusterRecord {
        self.base().record()
    }

    /// Provider rules on a set of node pools (names, bounds).
    fn validate_node_pools(&self, _pools: &[NodePool]) -> Result<()> {
        Ok(())
    }

    /// Pre-flight checks run before the cluster is inserted.
    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        validate_placement(self.base(), request).await?;
        self.validate_node_pools(&request.node_pools)
    }

    /// Provider checks on an update, after defaults were applied.
    async fn validate_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        let versioned = self
            .base()
            .read(|r| r.provider.kubernetes_version().is_some());
        if request.kubernetes_version.is_some() && !versioned {
            return Err(ProviderError::Validation(format!(
                "distribution '{}' does not manage the Kubernetes version",
                self.distribution()
            )));
        }
        match &request.node_pools {
            Some(pools) => self.validate_node_pools(pools),
            None => Ok(()),
        }
    }

    /// Provision the cluster.
    ///
    /// Resource ids are persisted as soon as the cloud returns them. When a
    /// re-driven creation finds them already set, provisioning is skipped.
    async fn create_cluster(&self) -> Result<()> {
        let base = self.base();
        if base.read(ClusterRecord::is_provisioned) {
            info!(
                cluster_id = self.id(),
                "Resources already provisioned, skipping provisioning"
            );
        } else {
            let record = base.record();
            let resource_ids = base.cloud()?.provision(&record).await?;
            base.update(|r| r.resource_ids = resource_ids);
            base.persist().await?;
        }

        base.update(|r| assign_pool_ids(&mut r.node_pools));
        base.persist().await?;
        Ok(())
    }

    /// Apply an update to the infrastructure and persist the result.
    async fn update_cluster(&self, request: &UpdateClusterRequest, user_id: i64) -> Result<()> {
        let base = self.base();
        let cloud = base.cloud()?;
        debug!(cluster_id = self.id(), user_id, "Updating cluster");

        if let Some(version) = &request.kubernetes_version {
            let current = base.read(|r| r.provider.kubernetes_version().map(str::to_string));
            if current.as_deref() != Some(version.as_str()) {
                let record = base.record();
                cloud.upgrade_control_plane(&record, version).await?;
                base.update(|r| r.provider.set_kubernetes_version(version));
                base.persist().await?;
            }
        }

        let record = base.record();
        if let Some(requested) = &request.node_pools
            && !same_pools(requested, &record.node_pools)
        {
            let delta = compute_node_pool_update(&record.node_pools, requested);
            cloud.apply_node_pools(&record, &delta).await?;

            let mut pools: Vec<NodePool> = delta.into_iter().filter(|p| !p.to_delete).collect();
            assign_pool_ids(&mut pools);
            base.update(|r| r.node_pools = pools);
        }

        if let Some(ttl) = request.ttl_minutes {
            base.update(|r| r.ttl_minutes = Some(ttl));
        }

        base.persist().await?;
        Ok(())
    }

    /// Tear down the infrastructure. Resources that are already gone count as
    /// deleted.
    async fn delete_cluster(&self) -> Result<()> {
        let record = self.model();
        match self.base().cloud()?.deprovision(&record).await {
            Err(ProviderError::NotFound(what)) => {
                info!(cluster_id = record.id, %what, "Cluster resources already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// Download a fresh admin kubeconfig from the provider.
    async fn download_k8s_config(&self) -> Result<String> {
        let record = self.model();
        self.base().cloud()?.fetch_kubeconfig(&record).await
    }

    /// The stored kubeconfig, or a fresh download when none is stored yet.
    async fn get_k8s_config(&self) -> Result<String> {
        let (organization_id, config_secret_id) =
            self.base().read(|r| (r.organization_id, r.config_secret_id.clone()));
        let Some(secret_id) = config_secret_id else {
            return self.download_k8s_config().await;
        };

        let secret = self
            .base()
            .secrets()
            .get_secret(organization_id, &secret_id)
            .await
            .map_err(ProviderError::from_external)?;
        secret.kubeconfig().map(str::to_string).ok_or_else(|| {
            ProviderError::Validation(format!("secret '{}' holds no kubeconfig", secret_id))
        })
    }

    /// Status report.
    async fn get_status(&self) -> Result<StatusResponse> {
        let r = self.model();
        Ok(StatusResponse {
            id: r.id,
            kubernetes_version: r.provider.kubernetes_version().map(str::to_string),
            node_pools: r.node_pools.iter().map(NodePoolStatus::from).collect(),
            name: r.name,
            location: r.location,
            cloud: r.cloud,
            distribution: r.distribution,
            status: r.status,
            status_message: r.status_message,
            ttl_minutes: r.ttl_minutes,
            features: r.features,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }

    /// Fill unset fields of an update from the stored state.
    fn add_defaults_to_update(&self, request: &mut UpdateClusterRequest) {
        self.base().read(|r| {
            if request.node_pools.is_none() {
                request.node_pools = Some(r.node_pools.clone());
            }
            if request.kubernetes_version.is_none() {
                request.kubernetes_version = r.provider.kubernetes_version().map(str::to_string);
            }
            if request.ttl_minutes.is_none() {
                request.ttl_minutes = r.ttl_minutes;
            }
        });
    }

    /// Reject an update that would not change anything.
    fn check_equality_to_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        let unchanged = self.base().read(|r| {
            request
                .node_pools
                .as_deref()
                .is_none_or(|pools| same_pools(pools, &r.node_pools))
                && request.kubernetes_version.as_deref().is_none_or(|v| {
                    r.provider.kubernetes_version() == Some(v)
                })
                && request
                    .ttl_minutes
                    .is_none_or(|ttl| r.ttl_minutes == Some(ttl))
        });
        if unchanged {
            return Err(ProviderError::Validation(
                "update request does not change the cluster".to_string(),
            ));
        }
        Ok(())
    }

    /// Persist a status change; illegal transitions are rejected.
    async fn set_status(&self, status: ClusterStatus, message: Option<&str>) -> Result<()> {
        Ok(self.base().set_status(status, message).await?)
    }

    /// Write the record back.
    async fn persist(&self) -> Result<()> {
        Ok(self.base().persist().await?)
    }

    /// Set a feature flag and persist it.
    async fn set_feature(&self, feature: ClusterFeature, enabled: bool) -> Result<()> {
        self.base().update(|r| r.features.set(feature, enabled));
        self.persist().await
    }

    /// Record the SSH key secret and persist it.
    async fn set_ssh_secret_id(&self, secret_id: &str) -> Result<()> {
        self.base()
            .update(|r| r.ssh_secret_id = Some(secret_id.to_string()));
        self.persist().await
    }

    /// Record the kubeconfig secret and persist it.
    async fn set_config_secret_id(&self, secret_id: &str) -> Result<()> {
        self.base()
            .update(|r| r.config_secret_id = Some(secret_id.to_string()));
        self.persist().await
    }
}
