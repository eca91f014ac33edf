// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for cumulus-manager integration tests.
//!
//! Provides TestContext wiring a ClusterManager over in-memory SQLite, mock cloud
//! clients and in-memory collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cumulus_core::{
    CloudProvider, Distribution, NodePool, PostHookSpec, ProviderConfig, SqlitePersistence,
};
use cumulus_manager::config::Config;
use cumulus_manager::creator::CommonClusterCreator;
use cumulus_manager::external::Collaborators;
use cumulus_manager::external::mock::{
    InMemorySecretStore, MockDeploymentInstaller, MockDnsRegistrar, MockKubeClientFactory,
};
use cumulus_manager::provider::MockCloudClient;
use cumulus_manager::request::{CreateClusterRequest, CreationContext};
use cumulus_manager::supervisor::ErrorHandler;
use cumulus_manager::{ClusterFactory, ClusterManager, CommonCluster, Error};

pub const ORG: i64 = 1;
pub const USER: i64 = 42;

/// Error handler that keeps every reported failure.
#[derive(Default)]
pub struct RecordingErrorHandler {
    pub errors: Mutex<Vec<(&'static str, i64, String)>>,
}

impl RecordingErrorHandler {
    pub fn errors(&self) -> Vec<(&'static str, i64, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle(&self, operation: &'static str, cluster_id: i64, error: &Error) {
        self.errors
            .lock()
            .unwrap()
            .push((operation, cluster_id, error.to_string()));
    }
}

/// Manager plus handles on every mock behind it.
pub struct TestContext {
    pub manager: ClusterManager,
    pub persistence: Arc<SqlitePersistence>,
    pub google: Arc<MockCloudClient>,
    pub amazon: Arc<MockCloudClient>,
    pub secrets: Arc<InMemorySecretStore>,
    pub kube: Arc<MockKubeClientFactory>,
    pub deployments: Arc<MockDeploymentInstaller>,
    pub dns: Arc<MockDnsRegistrar>,
    pub errors: Arc<RecordingErrorHandler>,
    pub temp_dir: tempfile::TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let persistence = Arc::new(
            SqlitePersistence::connect("sqlite::memory:")
                .await
                .expect("in-memory SQLite"),
        );
        let google = Arc::new(MockCloudClient::new(CloudProvider::Google));
        let amazon = Arc::new(MockCloudClient::new(CloudProvider::Amazon));

        let secrets = Arc::new(InMemorySecretStore::new());
        secrets.insert_credential(ORG, "gcp-creds", CloudProvider::Google);
        secrets.insert_credential(ORG, "aws-creds", CloudProvider::Amazon);

        let kube = Arc::new(MockKubeClientFactory::with_namespaces(&[
            "default",
            "kube-system",
            "shop",
        ]));
        let deployments = Arc::new(MockDeploymentInstaller::new());
        let dns = Arc::new(MockDnsRegistrar::new());
        let errors = Arc::new(RecordingErrorHandler::default());

        let collaborators = Collaborators {
            secrets: secrets.clone(),
            kube: kube.clone(),
            deployments: deployments.clone(),
            dns: dns.clone(),
        };
        let factory = ClusterFactory::new(persistence.clone(), secrets.clone())
            .with_cloud_client(google.clone())
            .with_cloud_client(amazon.clone());

        let temp_dir = tempfile::TempDir::new().expect("temp dir");
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            helm_retry_attempts: 3,
            helm_retry_interval: std::time::Duration::from_millis(1),
            ..Config::default()
        };
        let manager = ClusterManager::new(factory, collaborators, &config, errors.clone());

        Self {
            manager,
            persistence,
            google,
            amazon,
            secrets,
            kube,
            deployments,
            dns,
            errors,
            temp_dir,
        }
    }

    /// Start a creation and return the handle without waiting.
    pub async fn start_create(
        &self,
        request: CreateClusterRequest,
    ) -> Result<Arc<dyn CommonCluster>, Error> {
        let context = CreationContext {
            organization_id: ORG,
            user_id: USER,
            request,
        };
        let creator = Arc::new(CommonClusterCreator::new(
            self.manager.factory(),
            context.clone(),
        )?);
        self.manager.create_cluster(context, creator).await
    }

    /// Create a cluster and wait for the background part to finish.
    pub async fn create(&self, request: CreateClusterRequest) -> Arc<dyn CommonCluster> {
        let cluster = self.start_create(request).await.expect("create accepted");
        self.manager.wait_for_background_tasks().await;
        cluster
    }

    /// Fresh handle on a stored cluster.
    pub async fn reload(&self, cluster_id: i64) -> Arc<dyn CommonCluster> {
        self.manager
            .get_cluster(ORG, cluster_id)
            .await
            .expect("cluster exists")
    }
}

pub fn gke_request(name: &str) -> CreateClusterRequest {
    CreateClusterRequest {
        name: name.to_string(),
        cloud: CloudProvider::Google,
        distribution: Distribution::Gke,
        location: "europe-west1".to_string(),
        secret_id: "gcp-creds".to_string(),
        ssh_secret_id: None,
        ttl_minutes: None,
        provider: ProviderConfig::Gke {
            project_id: "acme-prod".to_string(),
            kubernetes_version: "1.29".to_string(),
        },
        node_pools: vec![
            NodePool::new("system", "e2-standard-2", 1),
            NodePool::new("workers", "e2-standard-4", 3),
        ],
        post_hooks: Vec::<PostHookSpec>::new(),
    }
}

pub fn eks_request(name: &str) -> CreateClusterRequest {
    CreateClusterRequest {
        name: name.to_string(),
        cloud: CloudProvider::Amazon,
        distribution: Distribution::Eks,
        location: "eu-west-1".to_string(),
        secret_id: "aws-creds".to_string(),
        ssh_secret_id: None,
        ttl_minutes: None,
        provider: ProviderConfig::Eks {
            version: "1.29".to_string(),
        },
        node_pools: vec![NodePool::new("workers", "m5.large", 2)],
        post_hooks: Vec::new(),
    }
}
