// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory collaborators.
//!
//! Every mock records the calls it receives and can be told to fail a named
//! operation, either forever or for a number of calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cumulus_core::{CloudProvider, ClusterRecord};
use uuid::Uuid;

use super::{
    DeploymentInstaller, DeploymentSpec, DnsRegistrar, KUBECONFIG_KEY, KubeClientFactory,
    SecretStore, SecretValue, WorkloadClient, WorkloadKind,
};
use crate::error::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Injected failures keyed by operation name.
#[derive(Debug, Default)]
pub struct Failures {
    entries: Mutex<HashMap<String, (String, Option<usize>)>>,
}

impl Failures {
    /// Fail `op` on every call.
    pub fn always(&self, op: &str, message: &str) {
        lock(&self.entries).insert(op.to_string(), (message.to_string(), None));
    }

    /// Fail `op` for the next `times` calls.
    pub fn times(&self, op: &str, message: &str, times: usize) {
        lock(&self.entries).insert(op.to_string(), (message.to_string(), Some(times)));
    }

    /// Stop failing `op`.
    pub fn clear(&self, op: &str) {
        lock(&self.entries).remove(op);
    }

    /// Failure message for this call of `op`, if one is due.
    pub fn check(&self, op: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        let (message, remaining) = entries.get_mut(op)?;
        match remaining {
            None => Some(message.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(message.clone())
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StoredSecret {
    organization_id: i64,
    cluster_uid: Option<String>,
    value: SecretValue,
}

/// Secret store backed by a map.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<String, StoredSecret>>,
    /// Injected failures, keyed by trait method name.
    pub failures: Failures,
}

impl InMemorySecretStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret owned by an organization.
    pub fn insert(
        &self,
        organization_id: i64,
        id: &str,
        secret_type: &str,
        values: BTreeMap<String, String>,
    ) {
        lock(&self.secrets).insert(
            id.to_string(),
            StoredSecret {
                organization_id,
                cluster_uid: None,
                value: SecretValue {
                    id: id.to_string(),
                    secret_type: secret_type.to_string(),
                    values,
                },
            },
        );
    }

    /// Add a cloud credential secret of the given cloud.
    pub fn insert_credential(&self, organization_id: i64, id: &str, cloud: CloudProvider) {
        self.insert(organization_id, id, cloud.as_str(), BTreeMap::new());
    }

    /// Add a kubeconfig secret.
    pub fn insert_kubeconfig(&self, organization_id: i64, id: &str, kubeconfig: &str) {
        let values = BTreeMap::from([(KUBECONFIG_KEY.to_string(), kubeconfig.to_string())]);
        self.insert(organization_id, id, "kubeconfig", values);
    }

    /// Whether a secret exists.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.secrets).contains_key(id)
    }

    /// Number of secrets generated for a cluster.
    pub fn cluster_secret_count(&self, cluster_uid: &str) -> usize {
        lock(&self.secrets)
            .values()
            .filter(|s| s.cluster_uid.as_deref() == Some(cluster_uid))
            .count()
    }

    fn fail(&self, op: &str) -> Result<()> {
        match self.failures.check(op) {
            Some(message) => Err(Error::Secret(message)),
            None => Ok(()),
        }
    }

    fn store_generated(
        &self,
        organization_id: i64,
        cluster_uid: &str,
        secret_type: &str,
        values: BTreeMap<String, String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        lock(&self.secrets).insert(
            id.clone(),
            StoredSecret {
                organization_id,
                cluster_uid: Some(cluster_uid.to_string()),
                value: SecretValue {
                    id: id.clone(),
                    secret_type: secret_type.to_string(),
                    values,
                },
            },
        );
        id
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn validate_secret_type(
        &self,
        organization_id: i64,
        secret_id: &str,
        cloud: CloudProvider,
    ) -> Result<()> {
        self.fail("validate_secret_type")?;
        let secrets = lock(&self.secrets);
        let secret = secrets
            .get(secret_id)
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| Error::Secret(format!("secret '{}' not found", secret_id)))?;

        if secret.value.secret_type != cloud.as_str() {
            return Err(Error::Secret(format!(
                "secret '{}' is of type '{}', expected '{}'",
                secret_id, secret.value.secret_type, cloud
            )));
        }
        Ok(())
    }

    async fn generate_ssh_key_pair(
        &self,
        organization_id: i64,
        cluster_uid: &str,
    ) -> Result<String> {
        self.fail("generate_ssh_key_pair")?;
        let fingerprint = Uuid::new_v4().simple().to_string();
        let values = BTreeMap::from([
            (
                "public_key".to_string(),
                format!("ssh-ed25519 AAAA{} cumulus", fingerprint),
            ),
            ("private_key".to_string(), format!("private-{}", fingerprint)),
        ]);
        Ok(self.store_generated(organization_id, cluster_uid, "ssh", values))
    }

    async fn store_kubeconfig(
        &self,
        organization_id: i64,
        cluster_uid: &str,
        kubeconfig: &str,
    ) -> Result<String> {
        self.fail("store_kubeconfig")?;
        let values = BTreeMap::from([(KUBECONFIG_KEY.to_string(), kubeconfig.to_string())]);
        Ok(self.store_generated(organization_id, cluster_uid, "kubeconfig", values))
    }

    async fn get_secret(&self, organization_id: i64, secret_id: &str) -> Result<SecretValue> {
        self.fail("get_secret")?;
        lock(&self.secrets)
            .get(secret_id)
            .filter(|s| s.organization_id == organization_id)
            .map(|s| s.value.clone())
            .ok_or_else(|| Error::Secret(format!("secret '{}' not found", secret_id)))
    }

    async fn delete_cluster_secrets(&self, organization_id: i64, cluster_uid: &str) -> Result<()> {
        self.fail("delete_cluster_secrets")?;
        lock(&self.secrets).retain(|_, s| {
            !(s.organization_id == organization_id && s.cluster_uid.as_deref() == Some(cluster_uid))
        });
        Ok(())
    }
}

/// Workload client over a fixed namespace list.
#[derive(Debug)]
pub struct MockWorkloadClient {
    namespaces: Vec<String>,
    deleted: Arc<Mutex<Vec<(WorkloadKind, String)>>>,
    failures: Arc<Failures>,
}

#[async_trait]
impl WorkloadClient for MockWorkloadClient {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        if let Some(message) = self.failures.check("list_namespaces") {
            return Err(Error::Kube(message));
        }
        Ok(self.namespaces.clone())
    }

    async fn delete_workloads(&self, kind: WorkloadKind, namespace: &str) -> Result<usize> {
        if let Some(message) = self.failures.check("delete_workloads") {
            return Err(Error::Kube(message));
        }
        lock(&self.deleted).push((kind, namespace.to_string()));
        Ok(1)
    }
}

/// Factory producing [`MockWorkloadClient`]s that share one call log.
#[derive(Debug)]
pub struct MockKubeClientFactory {
    namespaces: Vec<String>,
    deleted: Arc<Mutex<Vec<(WorkloadKind, String)>>>,
    /// Injected failures: `client`, `list_namespaces`, `delete_workloads`.
    pub failures: Arc<Failures>,
}

impl Default for MockKubeClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKubeClientFactory {
    /// Factory whose clusters have `default` and `kube-system` namespaces.
    pub fn new() -> Self {
        Self::with_namespaces(&["default", "kube-system"])
    }

    /// Factory whose clusters have the given namespaces.
    pub fn with_namespaces(namespaces: &[&str]) -> Self {
        Self {
            namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
            deleted: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Failures::default()),
        }
    }

    /// Every `(kind, namespace)` deletion performed so far.
    pub fn deleted(&self) -> Vec<(WorkloadKind, String)> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl KubeClientFactory for MockKubeClientFactory {
    async fn client(&self, kubeconfig: &str) -> Result<Arc<dyn WorkloadClient>> {
        if let Some(message) = self.failures.check("client") {
            return Err(Error::Kube(message));
        }
        if kubeconfig.trim().is_empty() {
            return Err(Error::Kube("empty kubeconfig".to_string()));
        }
        Ok(Arc::new(MockWorkloadClient {
            namespaces: self.namespaces.clone(),
            deleted: self.deleted.clone(),
            failures: self.failures.clone(),
        }))
    }
}

/// Installer that records releases.
#[derive(Debug, Default)]
pub struct MockDeploymentInstaller {
    installed: Mutex<Vec<DeploymentSpec>>,
    helm_prepared: Mutex<Vec<i64>>,
    /// Injected failures: `prepare_helm`, or a release name to fail its installation.
    pub failures: Failures,
}

impl MockDeploymentInstaller {
    /// Installer without failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release names installed, in order.
    pub fn releases(&self) -> Vec<String> {
        lock(&self.installed)
            .iter()
            .map(|d| d.release.clone())
            .collect()
    }

    /// Full installation requests, in order.
    pub fn installed(&self) -> Vec<DeploymentSpec> {
        lock(&self.installed).clone()
    }

    /// How many times Helm was successfully prepared.
    pub fn helm_prepared_count(&self) -> usize {
        lock(&self.helm_prepared).len()
    }
}

#[async_trait]
impl DeploymentInstaller for MockDeploymentInstaller {
    async fn prepare_helm(&self, cluster: &ClusterRecord, _kubeconfig: &str) -> Result<()> {
        if let Some(message) = self.failures.check("prepare_helm") {
            return Err(Error::Deployment(message));
        }
        lock(&self.helm_prepared).push(cluster.id);
        Ok(())
    }

    async fn install_deployment(
        &self,
        _cluster: &ClusterRecord,
        _kubeconfig: &str,
        deployment: &DeploymentSpec,
    ) -> Result<()> {
        if let Some(message) = self.failures.check(&deployment.release) {
            return Err(Error::Deployment(message));
        }
        lock(&self.installed).push(deployment.clone());
        Ok(())
    }
}

/// Registrar deriving `<name>.<org>.cumulus.local` domains.
#[derive(Debug, Default)]
pub struct MockDnsRegistrar {
    domains: Mutex<HashMap<String, String>>,
    /// Injected failures: `register_domain`, `unregister_domain`.
    pub failures: Failures,
}

impl MockDnsRegistrar {
    /// Registrar without failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered domain of a cluster uid.
    pub fn domain_of(&self, cluster_uid: &str) -> Option<String> {
        lock(&self.domains).get(cluster_uid).cloned()
    }
}

#[async_trait]
impl DnsRegistrar for MockDnsRegistrar {
    async fn register_domain(&self, cluster: &ClusterRecord) -> Result<String> {
        if let Some(message) = self.failures.check("register_domain") {
            return Err(Error::Dns(message));
        }
        let domain = format!("{}.{}.cumulus.local", cluster.name, cluster.organization_id);
        lock(&self.domains).insert(cluster.uid.clone(), domain.clone());
        Ok(domain)
    }

    async fn unregister_domain(&self, cluster: &ClusterRecord) -> Result<()> {
        if let Some(message) = self.failures.check("unregister_domain") {
            return Err(Error::Dns(message));
        }
        lock(&self.domains).remove(&cluster.uid);
        Ok(())
    }
}
