// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collaborator interfaces.
//!
//! The manager never talks to a vault, a Kubernetes API server, Helm or a DNS
//! provider directly. It goes through the traits below, which hosts implement.
//! [`mock`] carries in-memory implementations used by tests and by the binary.

pub mod mock;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cumulus_core::{CloudProvider, ClusterRecord};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Key under which a kubeconfig secret stores its document.
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Secret as returned by the store. Values are opaque to the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue {
    /// Secret id.
    pub id: String,
    /// Secret type, e.g. a cloud name, `ssh` or `kubeconfig`.
    pub secret_type: String,
    /// Key/value payload.
    pub values: BTreeMap<String, String>,
}

impl SecretValue {
    /// The kubeconfig document, for kubeconfig secrets.
    pub fn kubeconfig(&self) -> Option<&str> {
        self.values.get(KUBECONFIG_KEY).map(String::as_str)
    }
}

/// Secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Check that `secret_id` exists and holds credentials for `cloud`.
    async fn validate_secret_type(
        &self,
        organization_id: i64,
        secret_id: &str,
        cloud: CloudProvider,
    ) -> Result<()>;

    /// Generate an SSH key pair for a cluster and return its secret id.
    async fn generate_ssh_key_pair(&self, organization_id: i64, cluster_uid: &str)
    -> Result<String>;

    /// Store a kubeconfig for a cluster and return its secret id.
    async fn store_kubeconfig(
        &self,
        organization_id: i64,
        cluster_uid: &str,
        kubeconfig: &str,
    ) -> Result<String>;

    /// Load a secret.
    async fn get_secret(&self, organization_id: i64, secret_id: &str) -> Result<SecretValue>;

    /// Delete every secret generated for the cluster (SSH keys, kubeconfig).
    async fn delete_cluster_secrets(&self, organization_id: i64, cluster_uid: &str) -> Result<()>;
}

/// Workload kinds removed before tearing down infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    /// Services (load balancers first, so cloud LBs are released).
    Service,
    /// Deployments.
    Deployment,
    /// DaemonSets.
    DaemonSet,
    /// StatefulSets.
    StatefulSet,
    /// ReplicaSets.
    ReplicaSet,
}

impl WorkloadKind {
    /// Deletion order.
    pub const ALL: [WorkloadKind; 5] = [
        WorkloadKind::Service,
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::ReplicaSet,
    ];

    /// Kubernetes kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::DaemonSet => "DaemonSet",
            Self::StatefulSet => "StatefulSet",
            Self::ReplicaSet => "ReplicaSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed client over one cluster's core workload resources.
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Names of every namespace.
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Delete every object of `kind` in `namespace`. Returns how many were removed.
    async fn delete_workloads(&self, kind: WorkloadKind, namespace: &str) -> Result<usize>;
}

/// Builds workload clients from kubeconfig documents.
#[async_trait]
pub trait KubeClientFactory: Send + Sync {
    /// Create a client for the cluster described by `kubeconfig`.
    async fn client(&self, kubeconfig: &str) -> Result<Arc<dyn WorkloadClient>>;
}

/// A chart installation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    /// Target namespace.
    pub namespace: String,
    /// Chart reference, e.g. `ingress-nginx/ingress-nginx`.
    pub chart: String,
    /// Release name.
    pub release: String,
    /// Values document (YAML).
    pub values_yaml: String,
    /// Chart version, latest when `None`.
    pub version: Option<String>,
    /// Upgrade an existing release instead of failing.
    pub upgrade_if_exists: bool,
}

/// Helm-like deployment installer.
#[async_trait]
pub trait DeploymentInstaller: Send + Sync {
    /// Make the cluster ready to accept chart installations.
    async fn prepare_helm(&self, cluster: &ClusterRecord, kubeconfig: &str) -> Result<()>;

    /// Install (or upgrade) a chart release in the cluster.
    async fn install_deployment(
        &self,
        cluster: &ClusterRecord,
        kubeconfig: &str,
        deployment: &DeploymentSpec,
    ) -> Result<()>;
}

/// DNS registration for cluster domains.
#[async_trait]
pub trait DnsRegistrar: Send + Sync {
    /// Register the cluster domain and return it.
    async fn register_domain(&self, cluster: &ClusterRecord) -> Result<String>;

    /// Remove the cluster domain. Missing domains are not an error.
    async fn unregister_domain(&self, cluster: &ClusterRecord) -> Result<()>;
}

/// All collaborators, bundled for constructors.
#[derive(Clone)]
pub struct Collaborators {
    /// Secret storage.
    pub secrets: Arc<dyn SecretStore>,
    /// Kubernetes client factory.
    pub kube: Arc<dyn KubeClientFactory>,
    /// Chart installer.
    pub deployments: Arc<dyn DeploymentInstaller>,
    /// DNS registrar.
    pub dns: Arc<dyn DnsRegistrar>,
}

impl Collaborators {
    /// In-memory collaborators.
    pub fn in_memory() -> Self {
        Self {
            secrets: Arc::new(mock::InMemorySecretStore::new()),
            kube: Arc::new(mock::MockKubeClientFactory::new()),
            deployments: Arc::new(mock::MockDeploymentInstaller::new()),
            dns: Arc::new(mock::MockDnsRegistrar::new()),
        }
    }
}
