// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Post-creation hook pipeline.
//!
//! After provisioning, every cluster runs the base chain followed by the hooks
//! requested at creation:
//!
//! ```text
//! store_kube_config -> persist_kubernetes_certs -> update_monitoring_config
//!   -> install_helm -> register_domain -> install_ingress -> install_autoscaler
//!   -> caller hooks (service mesh, logging, monitoring, security scan)
//! ```
//!
//! Hooks run one at a time. The first failure aborts the chain and is returned as
//! [`Error::Hook`]; the caller decides what happens to the cluster status.

use std::sync::Arc;
use std::time::Duration;

use cumulus_core::{CloudProvider, PostHookSpec};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::external::{Collaborators, DeploymentSpec};
use crate::kubeconfig::Kubeconfig;
use crate::local_state::LocalState;
use crate::provider::CommonCluster;
use crate::retry::{RetryConfig, retry_with_backoff};

/// A chart to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    /// Chart reference, `<repo>/<chart>`.
    pub chart: String,
    /// Release name.
    pub release: String,
    /// Pinned version, latest when `None`.
    pub version: Option<String>,
}

impl ChartRef {
    fn new(chart: &str, release: &str) -> Self {
        Self {
            chart: chart.to_string(),
            release: release.to_string(),
            version: None,
        }
    }
}

/// Charts, namespace and retry policy used by the hooks.
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// Namespace receiving every add-on.
    pub namespace: String,
    /// Retry policy of `install_helm`.
    pub helm_retry: RetryConfig,
    /// Ingress controller.
    pub ingress: ChartRef,
    /// Cluster autoscaler.
    pub autoscaler: ChartRef,
    /// Service mesh control plane.
    pub service_mesh: ChartRef,
    /// Log shipper.
    pub logging: ChartRef,
    /// Monitoring stack.
    pub monitoring: ChartRef,
    /// Vulnerability scanner.
    pub security_scan: ChartRef,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            namespace: "cumulus-system".to_string(),
            helm_retry: RetryConfig::fixed(30, Duration::from_secs(10)),
            ingress: ChartRef::new("ingress-nginx/ingress-nginx", "ingress-nginx"),
            autoscaler: ChartRef::new("autoscaler/cluster-autoscaler", "cluster-autoscaler"),
            service_mesh: ChartRef::new("istio/istiod", "istiod"),
            logging: ChartRef::new("fluent/fluent-bit", "fluent-bit"),
            monitoring: ChartRef::new(
                "prometheus-community/kube-prometheus-stack",
                "kube-prometheus-stack",
            ),
            security_scan: ChartRef::new("aqua/trivy-operator", "trivy-operator"),
        }
    }
}

impl HookConfig {
    /// Defaults with namespace and Helm retry taken from the manager config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.hook_namespace.clone(),
            helm_retry: RetryConfig::fixed(config.helm_retry_attempts, config.helm_retry_interval),
            ..Default::default()
        }
    }
}

/// The full chain for a cluster: base hooks, then the hooks stored on the record.
pub fn hook_chain(requested: &[PostHookSpec]) -> Vec<PostHookSpec> {
    let mut chain = PostHookSpec::base_chain();
    chain.extend(requested.iter().filter(|h| !h.is_base()).cloned());
    chain
}

/// Runs the hook chain of a cluster.
#[derive(Clone)]
pub struct PostHookRunner {
    collaborators: Collaborators,
    local: LocalState,
    config: HookConfig,
}

impl PostHookRunner {
    /// Create a runner.
    pub fn new(collaborators: Collaborators, local: LocalState, config: HookConfig) -> Self {
        Self {
            collaborators,
            local,
            config,
        }
    }

    /// Run every hook of `cluster` in order.
    pub async fn run(&self, cluster: &Arc<dyn CommonCluster>) -> Result<()> {
        let hooks = hook_chain(&cluster.model().post_hooks);
        let cluster_id = cluster.id();

        for hook in &hooks {
            debug!(cluster_id, hook = hook.name(), "Running post hook");
            self.run_hook(cluster, hook)
                .await
                .map_err(|e| Error::Hook {
                    hook: hook.name(),
                    message: e.to_string(),
                })?;

            if let Some(feature) = hook.feature() {
                cluster.set_feature(feature, true).await?;
            }
        }

        info!(cluster_id, hooks = hooks.len(), "Post hooks completed");
        Ok(())
    }

    async fn run_hook(&self, cluster: &Arc<dyn CommonCluster>, hook: &PostHookSpec) -> Result<()> {
        match hook {
            PostHookSpec::StoreKubeConfig => self.store_kubeconfig(cluster).await,
            PostHookSpec::PersistKubernetesCerts => {
                let credentials = Kubeconfig::parse(&cluster.get_k8s_config().await?)?.credentials()?;
                self.local
                    .write_certs(cluster.organization_id(), &cluster.name(), &credentials)
                    .await?;
                Ok(())
            }
            PostHookSpec::UpdateMonitoringConfig => {
                let credentials = Kubeconfig::parse(&cluster.get_k8s_config().await?)?.credentials()?;
                self.local
                    .write_monitoring_target(&cluster.model(), &credentials.server)
                    .await?;
                Ok(())
            }
            PostHookSpec::InstallHelm => {
                let kubeconfig = cluster.get_k8s_config().await?;
                let record = cluster.model();
                let deployments = &self.collaborators.deployments;
                retry_with_backoff(&self.config.helm_retry, "install_helm", || {
                    deployments.prepare_helm(&record, &kubeconfig)
                })
                .await
            }
            PostHookSpec::RegisterDomain => {
                let domain = self
                    .collaborators
                    .dns
                    .register_domain(&cluster.model())
                    .await?;
                info!(cluster_id = cluster.id(), %domain, "Cluster domain registered");
                Ok(())
            }
            PostHookSpec::InstallIngress => {
                let values = json!({ "controller": { "ingressClassResource": { "default": true } } });
                self.install(cluster, &self.config.ingress, &values).await
            }
            PostHookSpec::InstallAutoscaler => {
                let record = cluster.model();
                let values = autoscaler_values(record.cloud, &record.name, &record.location);
                self.install(cluster, &self.config.autoscaler, &values).await
            }
            PostHookSpec::InstallServiceMesh(params) => {
                self.install(cluster, &self.config.service_mesh, params).await
            }
            PostHookSpec::InstallLogging(params) => {
                self.install(cluster, &self.config.logging, params).await
            }
            PostHookSpec::InstallMonitoring(params) => {
                self.install(cluster, &self.config.monitoring, params).await
            }
            PostHookSpec::InstallSecurityScan(params) => {
                self.install(cluster, &self.config.security_scan, params).await
            }
        }
    }

    async fn store_kubeconfig(&self, cluster: &Arc<dyn CommonCluster>) -> Result<()> {
        if cluster.model().config_secret_id.is_some() {
            debug!(cluster_id = cluster.id(), "Kubeconfig already stored");
            return Ok(());
        }
        let kubeconfig = cluster.download_k8s_config().await?;
        let secret_id = self
            .collaborators
            .secrets
            .store_kubeconfig(cluster.organization_id(), &cluster.uid(), &kubeconfig)
            .await?;
        cluster.set_config_secret_id(&secret_id).await?;
        Ok(())
    }

    async fn install<V: Serialize + ?Sized>(
        &self,
        cluster: &Arc<dyn CommonCluster>,
        chart: &ChartRef,
        values: &V,
    ) -> Result<()> {
        let kubeconfig = cluster.get_k8s_config().await?;
        let deployment = DeploymentSpec {
            namespace: self.config.namespace.clone(),
            chart: chart.chart.clone(),
            release: chart.release.clone(),
            values_yaml: serde_yaml::to_string(values)?,
            version: chart.version.clone(),
            upgrade_if_exists: true,
        };
        self.collaborators
            .deployments
            .install_deployment(&cluster.model(), &kubeconfig, &deployment)
            .await
    }
}

/// cluster-autoscaler chart values. Only the AWS provider takes the region
/// from values; the others read it from instance metadata.
fn autoscaler_values(cloud: CloudProvider, name: &str, location: &str) -> serde_json::Value {
    let provider = match cloud {
        CloudProvider::Amazon => "aws",
        CloudProvider::Azure => "azure",
        CloudProvider::Google => "gce",
        CloudProvider::Alibaba => "alicloud",
        CloudProvider::Oracle => "oci",
        CloudProvider::Kubernetes | CloudProvider::Dummy => "clusterapi",
    };
    let mut values = json!({
        "cloudProvider": provider,
        "autoDiscovery": { "clusterName": name },
    });
    if cloud == CloudProvider::Amazon {
        values["awsRegion"] = json!(location);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::{
        InMemorySecretStore, MockDeploymentInstaller, MockDnsRegistrar, MockKubeClientFactory,
    };
    use crate::provider::ClusterFactory;
    use cumulus_core::{
        Distribution, LoggingParams, NewCluster, Persistence, ProviderConfig,
        SqlitePersistence,
    };
    use tempfile::TempDir;

    struct Fixture {
        runner: PostHookRunner,
        cluster: Arc<dyn CommonCluster>,
        secrets: Arc<InMemorySecretStore>,
        deployments: Arc<MockDeploymentInstaller>,
        dns: Arc<MockDnsRegistrar>,
        _tmp: TempDir,
        data_dir: std::path::PathBuf,
    }

    async fn fixture(post_hooks: Vec<PostHookSpec>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let persistence = Arc::new(SqlitePersistence::connect("sqlite::memory:").await.unwrap());
        let secrets = Arc::new(InMemorySecretStore::new());
        let deployments = Arc::new(MockDeploymentInstaller::new());
        let dns = Arc::new(MockDnsRegistrar::new());
        let collaborators = Collaborators {
            secrets: secrets.clone(),
            kube: Arc::new(MockKubeClientFactory::new()),
            deployments: deployments.clone(),
            dns: dns.clone(),
        };

        let record = persistence
            .insert_cluster(&NewCluster {
                organization_id: 3,
                created_by: 1,
                name: "demo".to_string(),
                cloud: CloudProvider::Dummy,
                distribution: Distribution::Dummy,
                location: "local".to_string(),
                ttl_minutes: None,
                features: Default::default(),
                secret_id: "s".to_string(),
                ssh_secret_id: None,
                config_secret_id: None,
                provider: ProviderConfig::Dummy {
                    kubernetes_version: None,
                },
                node_pools: Vec::new(),
                post_hooks,
            })
            .await
            .unwrap();
        let factory = ClusterFactory::new(persistence, secrets.clone());
        let cluster = factory.from_record(record).unwrap();
        cluster.create_cluster().await.unwrap();

        let config = HookConfig {
            helm_retry: RetryConfig::fixed(3, Duration::from_millis(1)),
            ..Default::default()
        };
        Fixture {
            runner: PostHookRunner::new(collaborators, LocalState::new(tmp.path()), config),
            cluster,
            secrets,
            deployments,
            dns,
            data_dir: tmp.path().to_path_buf(),
            _tmp: tmp,
        }
    }

    #[test]
    fn test_autoscaler_region_only_for_aws() {
        let aws = autoscaler_values(CloudProvider::Amazon, "shop", "eu-west-1");
        assert_eq!(aws["cloudProvider"], "aws");
        assert_eq!(aws["awsRegion"], "eu-west-1");

        let gce = autoscaler_values(CloudProvider::Google, "shop", "europe-west1");
        assert_eq!(gce["cloudProvider"], "gce");
        assert_eq!(gce["autoDiscovery"]["clusterName"], "shop");
        assert!(gce.get("awsRegion").is_none());

        for cloud in [CloudProvider::Azure, CloudProvider::Alibaba, CloudProvider::Oracle] {
            assert!(autoscaler_values(cloud, "shop", "r").get("awsRegion").is_none());
        }
    }

    #[test]
    fn test_chain_appends_caller_hooks_after_base() {
        let logging = PostHookSpec::InstallLogging(LoggingParams::default());
        let chain = hook_chain(&[logging.clone(), PostHookSpec::InstallHelm]);
        assert_eq!(chain.len(), 8);
        assert_eq!(chain[0], PostHookSpec::StoreKubeConfig);
        assert_eq!(chain[7], logging);
    }

    #[tokio::test]
    async fn test_full_chain_runs_in_order() {
        let fx = fixture(vec![PostHookSpec::InstallLogging(LoggingParams::default())]).await;
        fx.runner.run(&fx.cluster).await.unwrap();

        let record = fx.cluster.model();
        let secret_id = record.config_secret_id.clone().unwrap();
        assert!(fx.secrets.contains(&secret_id));
        assert!(fx.data_dir.join("3/demo/certs/ca.crt").exists());
        assert!(
            fx.data_dir
                .join(format!("monitoring/targets/{}.yaml", record.uid))
                .exists()
        );
        assert_eq!(fx.deployments.helm_prepared_count(), 1);
        assert!(fx.dns.domain_of(&record.uid).is_some());
        assert_eq!(
            fx.deployments.releases(),
            vec!["ingress-nginx", "cluster-autoscaler", "fluent-bit"]
        );
        assert!(record.features.logging);
        assert!(!record.features.monitoring);
    }

    #[tokio::test]
    async fn test_helm_is_retried() {
        let fx = fixture(Vec::new()).await;
        fx.deployments.failures.times("prepare_helm", "api not ready", 2);

        fx.runner.run(&fx.cluster).await.unwrap();
        assert_eq!(fx.deployments.helm_prepared_count(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let fx = fixture(vec![PostHookSpec::InstallLogging(LoggingParams::default())]).await;
        fx.dns.failures.always("register_domain", "zone locked");

        let err = fx.runner.run(&fx.cluster).await.unwrap_err();
        match err {
            Error::Hook { hook, message } => {
                assert_eq!(hook, "register_domain");
                assert!(message.contains("zone locked"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Hooks after the failing one never ran.
        assert!(fx.deployments.releases().is_empty());
        assert!(!fx.cluster.model().features.logging);
    }

    #[tokio::test]
    async fn test_existing_kubeconfig_secret_is_kept() {
        let fx = fixture(Vec::new()).await;
        fx.cluster.set_config_secret_id("pre-existing").await.unwrap();
        fx.secrets.insert_kubeconfig(
            3,
            "pre-existing",
            &fx.cluster.download_k8s_config().await.unwrap(),
        );

        fx.runner.run(&fx.cluster).await.unwrap();
        assert_eq!(
            fx.cluster.model().config_secret_id.as_deref(),
            Some("pre-existing")
        );
        assert_eq!(fx.secrets.cluster_secret_count(&fx.cluster.uid()), 0);
    }
}
