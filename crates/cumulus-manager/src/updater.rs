// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster updaters.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cumulus_core::ClusterStatus;

use crate::error::{Error, Result};
use crate::provider::CommonCluster;
use crate::request::{NodePoolUpdateRequest, UpdateClusterRequest};

/// Update steps.
#[async_trait]
pub trait ClusterUpdater: Send + Sync {
    /// The handle being updated.
    fn cluster(&self) -> Arc<dyn CommonCluster>;

    /// Check preconditions and the request.
    async fn validate(&self) -> Result<()>;

    /// Mark the cluster `UPDATING`.
    async fn prepare(&self) -> Result<()>;

    /// Apply the update.
    async fn update(&self) -> Result<()>;
}

fn require_operable(cluster: &dyn CommonCluster) -> Result<()> {
    let status = cluster.status();
    if !status.is_operable() {
        return Err(Error::PreconditionFailed(format!(
            "cluster {} is {}, updates need RUNNING or WARNING",
            cluster.id(),
            status
        )));
    }
    Ok(())
}

/// Fill defaults, reject no-ops and run provider checks. Returns the effective
/// request.
async fn complete_request(
    cluster: &dyn CommonCluster,
    mut request: UpdateClusterRequest,
) -> Result<UpdateClusterRequest> {
    if request.ttl_minutes.is_some_and(|ttl| ttl < 0) {
        return Err(Error::InvalidRequest(
            "ttl_minutes must not be negative".to_string(),
        ));
    }
    for pool in request.node_pools.iter().flatten() {
        pool.validate_counts()?;
    }

    cluster.add_defaults_to_update(&mut request);
    cluster
        .check_equality_to_update(&request)
        .map_err(Error::from_validation)?;
    cluster
        .validate_update(&request)
        .await
        .map_err(Error::from_validation)?;
    Ok(request)
}

/// Update steps shared by the updaters once the effective request is known.
struct PendingUpdate {
    cluster: Arc<dyn CommonCluster>,
    user_id: i64,
    effective: Mutex<Option<UpdateClusterRequest>>,
}

impl PendingUpdate {
    fn new(cluster: Arc<dyn CommonCluster>, user_id: i64) -> Self {
        Self {
            cluster,
            user_id,
            effective: Mutex::new(None),
        }
    }

    fn store(&self, request: UpdateClusterRequest) {
        *self
            .effective
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);
    }

    async fn prepare(&self) -> Result<()> {
        Ok(self
            .cluster
            .set_status(ClusterStatus::Updating, None)
            .await?)
    }

    async fn update(&self) -> Result<()> {
        let request = self
            .effective
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Other("update was not validated".to_string()))?;
        Ok(self.cluster.update_cluster(&request, self.user_id).await?)
    }
}

/// Updater for a full [`UpdateClusterRequest`].
pub struct CommonClusterUpdater {
    pending: PendingUpdate,
    request: UpdateClusterRequest,
}

impl CommonClusterUpdater {
    /// Create an updater.
    pub fn new(cluster: Arc<dyn CommonCluster>, request: UpdateClusterRequest, user_id: i64) -> Self {
        Self {
            pending: PendingUpdate::new(cluster, user_id),
            request,
        }
    }
}

#[async_trait]
impl ClusterUpdater for CommonClusterUpdater {
    fn cluster(&self) -> Arc<dyn CommonCluster> {
        Arc::clone(&self.pending.cluster)
    }

    async fn validate(&self) -> Result<()> {
        let cluster = self.pending.cluster.as_ref();
        require_operable(cluster)?;
        let effective = complete_request(cluster, self.request.clone()).await?;
        self.pending.store(effective);
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        self.pending.prepare().await
    }

    async fn update(&self) -> Result<()> {
        self.pending.update().await
    }
}

/// Updater touching existing node pools only.
pub struct NodePoolUpdater {
    pending: PendingUpdate,
    request: NodePoolUpdateRequest,
}

impl NodePoolUpdater {
    /// Create an updater.
    pub fn new(cluster: Arc<dyn CommonCluster>, request: NodePoolUpdateRequest, user_id: i64) -> Self {
        Self {
            pending: PendingUpdate::new(cluster, user_id),
            request,
        }
    }
}

#[async_trait]
impl ClusterUpdater for NodePoolUpdater {
    fn cluster(&self) -> Arc<dyn CommonCluster> {
        Arc::clone(&self.pending.cluster)
    }

    async fn validate(&self) -> Result<()> {
        let cluster = self.pending.cluster.as_ref();
        require_operable(cluster)?;

        if self.request.node_pools.is_empty() {
            return Err(Error::InvalidRequest(
                "node pool update names no pools".to_string(),
            ));
        }
        let stored = cluster.base().read(|r| r.node_pools.clone());
        let unknown = self.request.unknown_pools(&stored);
        if !unknown.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "unknown node pools: {}",
                unknown.join(", ")
            )));
        }

        let effective = complete_request(cluster, self.request.to_update_request(&stored)).await?;
        self.pending.store(effective);
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        self.pending.prepare().await
    }

    async fn update(&self) -> Result<()> {
        self.pending.update().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::external::mock::InMemorySecretStore;
    use crate::provider::{ClusterFactory, MockCloudClient};
    use crate::request::NodePoolPatch;
    use cumulus_core::{
        CloudProvider, Distribution, NewCluster, NodePool, Persistence, ProviderConfig,
        SqlitePersistence,
    };

    async fn running_cluster(
        distribution: Distribution,
        provider: ProviderConfig,
        pools: Vec<NodePool>,
    ) -> (Arc<dyn CommonCluster>, Arc<MockCloudClient>) {
        let persistence = Arc::new(SqlitePersistence::connect("sqlite::memory:").await.unwrap());
        let cloud = Arc::new(MockCloudClient::new(distribution.cloud()));
        let factory = ClusterFactory::new(persistence.clone(), Arc::new(InMemorySecretStore::new()))
            .with_cloud_client(cloud.clone());

        let record = persistence
            .insert_cluster(&NewCluster {
                organization_id: 1,
                created_by: 1,
                name: "c1".to_string(),
                cloud: distribution.cloud(),
                distribution,
                location: "region-1".to_string(),
                ttl_minutes: None,
                features: Default::default(),
                secret_id: "s".to_string(),
                ssh_secret_id: None,
                config_secret_id: None,
                provider,
                node_pools: pools,
                post_hooks: Vec::new(),
            })
            .await
            .unwrap();
        let cluster = factory.from_record(record).unwrap();
        cluster.create_cluster().await.unwrap();
        cluster
            .set_status(ClusterStatus::Running, None)
            .await
            .unwrap();
        (cluster, cloud)
    }

    fn gke() -> ProviderConfig {
        ProviderConfig::Gke {
            project_id: "p".to_string(),
            kubernetes_version: "1.29".to_string(),
        }
    }

    fn pools() -> Vec<NodePool> {
        vec![
            NodePool::new("a", "small", 1),
            NodePool::new("b", "small", 1),
            NodePool::new("c", "small", 1),
        ]
    }

    #[tokio::test]
    async fn test_update_requires_operable_status() {
        let (cluster, _) = running_cluster(Distribution::Gke, gke(), pools()).await;
        cluster
            .set_status(ClusterStatus::Updating, None)
            .await
            .unwrap();

        let updater = CommonClusterUpdater::new(
            cluster,
            UpdateClusterRequest {
                ttl_minutes: Some(30),
                ..Default::default()
            },
            1,
        );
        assert!(matches!(
            updater.validate().await.unwrap_err(),
            Error::PreconditionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_noop_update_is_invalid() {
        let (cluster, _) = running_cluster(Distribution::Gke, gke(), pools()).await;
        let updater = CommonClusterUpdater::new(cluster, UpdateClusterRequest::default(), 1);
        assert!(matches!(
            updater.validate().await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_update_applies_node_pool_delta() {
        let (cluster, cloud) = running_cluster(Distribution::Gke, gke(), pools()).await;
        let updater = CommonClusterUpdater::new(
            cluster.clone(),
            UpdateClusterRequest {
                node_pools: Some(vec![
                    NodePool::new("a", "large", 2),
                    NodePool::new("d", "small", 1),
                ]),
                ..Default::default()
            },
            1,
        );

        updater.validate().await.unwrap();
        updater.prepare().await.unwrap();
        assert_eq!(cluster.status(), ClusterStatus::Updating);
        updater.update().await.unwrap();

        let names: Vec<_> = cluster
            .model()
            .node_pools
            .iter()
            .map(|p| (p.name.clone(), p.id))
            .collect();
        assert_eq!(
            names,
            vec![("a".to_string(), Some(1)), ("d".to_string(), Some(2))]
        );
        assert_eq!(cloud.call_count("apply_node_pools"), 1);

        let stored = cluster
            .base()
            .persistence()
            .get_cluster(cluster.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.node_pools.len(), 2);
        assert_eq!(stored.node_pools[0].instance_type, "large");
    }

    #[tokio::test]
    async fn test_node_pool_update_of_unknown_pool_is_invalid() {
        let (cluster, _) = running_cluster(Distribution::Gke, gke(), pools()).await;
        let updater = NodePoolUpdater::new(
            cluster,
            NodePoolUpdateRequest {
                node_pools: BTreeMap::from([("ghost".to_string(), NodePoolPatch::default())]),
            },
            1,
        );
        assert!(matches!(
            updater.validate().await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_node_pool_update_resizes_in_place() {
        let (cluster, _) = running_cluster(Distribution::Gke, gke(), pools()).await;
        let updater = NodePoolUpdater::new(
            cluster.clone(),
            NodePoolUpdateRequest {
                node_pools: BTreeMap::from([(
                    "b".to_string(),
                    NodePoolPatch {
                        count: Some(3),
                        max_count: Some(3),
                        ..Default::default()
                    },
                )]),
            },
            1,
        );
        updater.validate().await.unwrap();
        updater.prepare().await.unwrap();
        updater.update().await.unwrap();

        let record = cluster.model();
        assert_eq!(record.node_pools.len(), 3);
        assert_eq!(record.node_pool("b").unwrap().count, 3);
        assert_eq!(record.node_pool("b").unwrap().id, Some(2));
    }

    #[tokio::test]
    async fn test_eks_upgrade_moves_one_minor_version() {
        let eks = ProviderConfig::Eks {
            version: "1.28".to_string(),
        };
        let (cluster, cloud) = running_cluster(Distribution::Eks, eks, pools()).await;

        let skip = CommonClusterUpdater::new(
            cluster.clone(),
            UpdateClusterRequest {
                kubernetes_version: Some("1.30".to_string()),
                ..Default::default()
            },
            1,
        );
        assert!(matches!(
            skip.validate().await.unwrap_err(),
            Error::InvalidRequest(_)
        ));

        let next = CommonClusterUpdater::new(
            cluster.clone(),
            UpdateClusterRequest {
                kubernetes_version: Some("1.29".to_string()),
                ..Default::default()
            },
            1,
        );
        next.validate().await.unwrap();
        next.prepare().await.unwrap();
        next.update().await.unwrap();

        assert_eq!(
            cluster.model().provider.kubernetes_version(),
            Some("1.29")
        );
        assert_eq!(cloud.call_count("upgrade_control_plane"), 1);
        assert_eq!(cloud.call_count("apply_node_pools"), 0);
    }
}
