// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster creators.
//!
//! A creator runs in three steps: `validate` (synchronous with the request),
//! `prepare` (insert or re-mark the record) and `create` (provisioning, run in the
//! background by the manager).

use std::sync::Arc;

use async_trait::async_trait;
use cumulus_core::ClusterStatus;
use tracing::info;

use crate::error::{Error, Result};
use crate::provider::{ClusterFactory, CommonCluster};
use crate::request::CreationContext;

/// Creation steps.
#[async_trait]
pub trait ClusterCreator: Send + Sync {
    /// The handle being created.
    fn cluster(&self) -> Arc<dyn CommonCluster>;

    /// Check the request. Errors are [`Error::InvalidRequest`] or
    /// [`Error::PreconditionFailed`].
    async fn validate(&self) -> Result<()>;

    /// Make the record durable in status `CREATING`.
    async fn prepare(&self) -> Result<Arc<dyn CommonCluster>>;

    /// Provision the cluster.
    async fn create(&self) -> Result<()>;
}

/// Creator for new clusters.
pub struct CommonClusterCreator {
    cluster: Arc<dyn CommonCluster>,
    context: CreationContext,
}

impl CommonClusterCreator {
    /// Build the creator and its not-yet-inserted handle.
    pub fn new(factory: &ClusterFactory, context: CreationContext) -> Result<Self> {
        let cluster = factory
            .from_request(context.organization_id, context.user_id, &context.request)
            .map_err(Error::from_validation)?;
        Ok(Self { cluster, context })
    }
}

#[async_trait]
impl ClusterCreator for CommonClusterCreator {
    fn cluster(&self) -> Arc<dyn CommonCluster> {
        Arc::clone(&self.cluster)
    }

    async fn validate(&self) -> Result<()> {
        self.context.request.validate()?;
        self.cluster
            .validate_creation_fields(&self.context.request)
            .await
            .map_err(Error::from_validation)
    }

    async fn prepare(&self) -> Result<Arc<dyn CommonCluster>> {
        let new = self
            .context
            .request
            .to_new_cluster(self.context.organization_id, self.context.user_id);
        let record = self.cluster.base().persistence().insert_cluster(&new).await?;
        info!(
            cluster_id = record.id,
            organization_id = record.organization_id,
            uid = %record.uid,
            "Cluster record created"
        );
        self.cluster.base().replace(record);
        Ok(self.cluster())
    }

    async fn create(&self) -> Result<()> {
        Ok(self.cluster.create_cluster().await?)
    }
}

/// Creator that re-drives an interrupted creation.
///
/// Provisioning resumes from the resource id checkpoint, so infrastructure that
/// already exists is not requested again.
pub struct RecoveryClusterCreator {
    cluster: Arc<dyn CommonCluster>,
}

impl RecoveryClusterCreator {
    /// Wrap an existing handle.
    pub fn new(cluster: Arc<dyn CommonCluster>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl ClusterCreator for RecoveryClusterCreator {
    fn cluster(&self) -> Arc<dyn CommonCluster> {
        Arc::clone(&self.cluster)
    }

    async fn validate(&self) -> Result<()> {
        match self.cluster.status() {
            ClusterStatus::Creating | ClusterStatus::Error => Ok(()),
            other => Err(Error::PreconditionFailed(format!(
                "cluster {} is {}, only CREATING or ERROR clusters can be recovered",
                self.cluster.id(),
                other
            ))),
        }
    }

    async fn prepare(&self) -> Result<Arc<dyn CommonCluster>> {
        if self.cluster.status() != ClusterStatus::Creating {
            self.cluster
                .set_status(ClusterStatus::Creating, Some("Recovering cluster creation"))
                .await?;
        }
        Ok(self.cluster())
    }

    async fn create(&self) -> Result<()> {
        info!(cluster_id = self.cluster.id(), "Resuming cluster creation");
        Ok(self.cluster.create_cluster().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::InMemorySecretStore;
    use crate::provider::MockCloudClient;
    use crate::request::CreateClusterRequest;
    use cumulus_core::{
        CloudProvider, Distribution, NodePool, Persistence, ProviderConfig, SqlitePersistence,
    };

    async fn setup() -> (ClusterFactory, Arc<MockCloudClient>) {
        let persistence = SqlitePersistence::connect("sqlite::memory:").await.unwrap();
        let cloud = Arc::new(MockCloudClient::new(CloudProvider::Google));
        let factory =
            ClusterFactory::new(Arc::new(persistence), Arc::new(InMemorySecretStore::new()))
                .with_cloud_client(cloud.clone());
        (factory, cloud)
    }

    fn context(name: &str) -> CreationContext {
        CreationContext {
            organization_id: 1,
            user_id: 2,
            request: CreateClusterRequest {
                name: name.to_string(),
                cloud: CloudProvider::Google,
                distribution: Distribution::Gke,
                location: "us-east1".to_string(),
                secret_id: "gcp".to_string(),
                ssh_secret_id: None,
                ttl_minutes: None,
                provider: ProviderConfig::Gke {
                    project_id: "acme".to_string(),
                    kubernetes_version: "1.29".to_string(),
                },
                node_pools: vec![NodePool::new("pool-1", "e2-medium", 1)],
                post_hooks: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_unavailable_machine_type() {
        let (factory, cloud) = setup().await;
        cloud.reject("e2-medium");

        let creator = CommonClusterCreator::new(&factory, context("c1")).unwrap();
        let err = creator.validate().await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_validate_rejects_invalid_gke_pool_name() {
        let (factory, _) = setup().await;
        let mut ctx = context("c1");
        ctx.request.node_pools[0].name = "Pool_1".to_string();

        let creator = CommonClusterCreator::new(&factory, ctx).unwrap();
        assert!(matches!(
            creator.validate().await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_prepare_inserts_and_create_provisions() {
        let (factory, cloud) = setup().await;
        let creator = CommonClusterCreator::new(&factory, context("c1")).unwrap();
        creator.validate().await.unwrap();

        let cluster = creator.prepare().await.unwrap();
        assert!(cluster.id() > 0);
        assert!(!cluster.uid().is_empty());

        creator.create().await.unwrap();
        let stored = factory
            .persistence()
            .get_cluster(cluster.id())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_provisioned());
        assert_eq!(stored.node_pools[0].id, Some(1));
        assert_eq!(cloud.call_count("provision"), 1);
    }

    #[tokio::test]
    async fn test_recovery_skips_provisioning_after_checkpoint() {
        let (factory, cloud) = setup().await;
        let creator = CommonClusterCreator::new(&factory, context("c1")).unwrap();
        let cluster = creator.prepare().await.unwrap();
        creator.create().await.unwrap();

        let record = factory
            .persistence()
            .get_cluster(cluster.id())
            .await
            .unwrap()
            .unwrap();
        let recovered = RecoveryClusterCreator::new(factory.from_record(record).unwrap());
        recovered.validate().await.unwrap();
        recovered.prepare().await.unwrap();
        recovered.create().await.unwrap();

        assert_eq!(cloud.call_count("provision"), 1);
    }

    #[tokio::test]
    async fn test_recovery_refuses_running_cluster() {
        let (factory, _) = setup().await;
        let creator = CommonClusterCreator::new(&factory, context("c1")).unwrap();
        let cluster = creator.prepare().await.unwrap();
        cluster
            .set_status(ClusterStatus::Running, None)
            .await
            .unwrap();

        let recovered = RecoveryClusterCreator::new(cluster);
        assert!(matches!(
            recovered.validate().await.unwrap_err(),
            Error::PreconditionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_recovery_from_error_moves_back_to_creating() {
        let (factory, _) = setup().await;
        let creator = CommonClusterCreator::new(&factory, context("c1")).unwrap();
        let cluster = creator.prepare().await.unwrap();
        cluster
            .set_status(ClusterStatus::Error, Some("boom"))
            .await
            .unwrap();

        let recovered = RecoveryClusterCreator::new(cluster.clone());
        recovered.validate().await.unwrap();
        recovered.prepare().await.unwrap();
        assert_eq!(cluster.status(), ClusterStatus::Creating);

        let history = factory
            .persistence()
            .list_status_history(cluster.id())
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
    }
}
