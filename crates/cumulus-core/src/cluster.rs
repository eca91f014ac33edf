// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster data model.
//!
//! A [`ClusterRecord`] is the persisted aggregate: identity, ownership, placement,
//! lifecycle status, feature flags, the provider-specific payload and node pools.
//! Every distribution maps to exactly one cloud:
//!
//! | Distribution | Cloud |
//! |--------------|-------|
//! | `ec2`, `eks` | `amazon` |
//! | `aks` | `azure` |
//! | `gke` | `google` |
//! | `ack`, `acsk` | `alibaba` |
//! | `oke` | `oracle` |
//! | `byoc` | `kubernetes` |
//! | `dummy` | `dummy` |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hooks::PostHookSpec;
use crate::status::ClusterStatus;

/// Cloud provider hosting a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Amazon Web Services.
    Amazon,
    /// Microsoft Azure.
    Azure,
    /// Google Cloud Platform.
    Google,
    /// Alibaba Cloud.
    Alibaba,
    /// Oracle Cloud Infrastructure.
    Oracle,
    /// Bring-your-own Kubernetes cluster.
    Kubernetes,
    /// In-process test provider.
    Dummy,
}

impl CloudProvider {
    /// All providers.
    pub const ALL: [CloudProvider; 7] = [
        CloudProvider::Amazon,
        CloudProvider::Azure,
        CloudProvider::Google,
        CloudProvider::Alibaba,
        CloudProvider::Oracle,
        CloudProvider::Kubernetes,
        CloudProvider::Dummy,
    ];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Azure => "azure",
            Self::Google => "google",
            Self::Alibaba => "alibaba",
            Self::Oracle => "oracle",
            Self::Kubernetes => "kubernetes",
            Self::Dummy => "dummy",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CloudProvider::ALL
            .into_iter()
            .find(|cloud| cloud.as_str() == s)
            .ok_or_else(|| CoreError::validation("cloud", format!("unknown cloud '{}'", s)))
    }
}

/// Kubernetes distribution, which selects the provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Self-hosted Kubernetes on EC2 instances.
    Ec2,
    /// Amazon Elastic Kubernetes Service.
    Eks,
    /// Azure Kubernetes Service.
    Aks,
    /// Google Kubernetes Engine.
    Gke,
    /// Alibaba Container Service for Kubernetes.
    Ack,
    /// Alibaba serverless Kubernetes.
    Acsk,
    /// Oracle Container Engine for Kubernetes.
    Oke,
    /// Bring-your-own cluster.
    Byoc,
    /// Test distribution without cloud calls.
    Dummy,
}

impl Distribution {
    /// All distributions.
    pub const ALL: [Distribution; 9] = [
        Distribution::Ec2,
        Distribution::Eks,
        Distribution::Aks,
        Distribution::Gke,
        Distribution::Ack,
        Distribution::Acsk,
        Distribution::Oke,
        Distribution::Byoc,
        Distribution::Dummy,
    ];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2 => "ec2",
            Self::Eks => "eks",
            Self::Aks => "aks",
            Self::Gke => "gke",
            Self::Ack => "ack",
            Self::Acsk => "acsk",
            Self::Oke => "oke",
            Self::Byoc => "byoc",
            Self::Dummy => "dummy",
        }
    }

    /// The cloud this distribution runs on.
    pub fn cloud(&self) -> CloudProvider {
        match self {
            Self::Ec2 | Self::Eks => CloudProvider::Amazon,
            Self::Aks => CloudProvider::Azure,
            Self::Gke => CloudProvider::Google,
            Self::Ack | Self::Acsk => CloudProvider::Alibaba,
            Self::Oke => CloudProvider::Oracle,
            Self::Byoc => CloudProvider::Kubernetes,
            Self::Dummy => CloudProvider::Dummy,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Distribution::ALL
            .into_iter()
            .find(|distribution| distribution.as_str() == s)
            .ok_or_else(|| {
                CoreError::validation("distribution", format!("unknown distribution '{}'", s))
            })
    }
}

/// Optional add-ons tracked per cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFeatures {
    /// Log collection stack installed.
    pub logging: bool,
    /// Monitoring stack installed.
    pub monitoring: bool,
    /// Service mesh installed.
    pub service_mesh: bool,
    /// Security scanner installed.
    pub security_scan: bool,
}

/// Single feature flag selector for [`ClusterFeatures::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterFeature {
    /// See [`ClusterFeatures::logging`].
    Logging,
    /// See [`ClusterFeatures::monitoring`].
    Monitoring,
    /// See [`ClusterFeatures::service_mesh`].
    ServiceMesh,
    /// See [`ClusterFeatures::security_scan`].
    SecurityScan,
}

impl ClusterFeatures {
    /// Set a single flag.
    pub fn set(&mut self, feature: ClusterFeature, enabled: bool) {
        match feature {
            ClusterFeature::Logging => self.logging = enabled,
            ClusterFeature::Monitoring => self.monitoring = enabled,
            ClusterFeature::ServiceMesh => self.service_mesh = enabled,
            ClusterFeature::SecurityScan => self.security_scan = enabled,
        }
    }

    /// Read a single flag.
    pub fn get(&self, feature: ClusterFeature) -> bool {
        match feature {
            ClusterFeature::Logging => self.logging,
            ClusterFeature::Monitoring => self.monitoring,
            ClusterFeature::ServiceMesh => self.service_mesh,
            ClusterFeature::SecurityScan => self.security_scan,
        }
    }
}

/// A group of identically configured worker nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePool {
    /// Stable identifier, `None` until the pool has been provisioned.
    #[serde(default)]
    pub id: Option<i64>,
    /// Pool name, unique within the cluster.
    pub name: String,
    /// Machine / instance type.
    pub instance_type: String,
    /// Autoscaling lower bound.
    pub min_count: u32,
    /// Autoscaling upper bound.
    pub max_count: u32,
    /// Desired node count.
    pub count: u32,
    /// Whether the cloud autoscaler manages the pool.
    #[serde(default)]
    pub autoscaling: bool,
    /// Machine image, required by self-hosted distributions.
    #[serde(default)]
    pub image: Option<String>,
    /// Root disk size.
    #[serde(default)]
    pub disk_size_gb: Option<u32>,
    /// Kubernetes node labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// When the pool was first provisioned.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Marked for removal by an incremental update.
    #[serde(default)]
    pub to_delete: bool,
}

impl NodePool {
    /// Convenience constructor for a fixed-size pool.
    pub fn new(name: impl Into<String>, instance_type: impl Into<String>, count: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            instance_type: instance_type.into(),
            min_count: count,
            max_count: count,
            count,
            autoscaling: false,
            image: None,
            disk_size_gb: None,
            labels: BTreeMap::new(),
            created_at: None,
            to_delete: false,
        }
    }

    /// Check the count bounds of the pool.
    pub fn validate_counts(&self) -> Result<(), CoreError> {
        if self.min_count > self.max_count {
            return Err(CoreError::validation(
                format!("node_pools.{}.min_count", self.name),
                "min_count must not exceed max_count",
            ));
        }
        if self.count < self.min_count || self.count > self.max_count {
            return Err(CoreError::validation(
                format!("node_pools.{}.count", self.name),
                format!(
                    "count {} outside of [{}, {}]",
                    self.count, self.min_count, self.max_count
                ),
            ));
        }
        Ok(())
    }
}

/// Distribution-specific cluster settings.
///
/// Internally tagged by `distribution` so the stored JSON is self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Self-hosted Kubernetes on EC2.
    Ec2 {
        /// Instance type of the control plane node.
        master_instance_type: String,
        /// AMI of the control plane node.
        master_image: String,
        /// Kubernetes version to bootstrap.
        kubernetes_version: String,
    },
    /// Amazon EKS.
    Eks {
        /// Control plane version (`major.minor`).
        version: String,
    },
    /// Azure AKS.
    Aks {
        /// Resource group holding the cluster.
        resource_group: String,
        /// Kubernetes version.
        kubernetes_version: String,
    },
    /// Google GKE.
    Gke {
        /// GCP project.
        project_id: String,
        /// Kubernetes version.
        kubernetes_version: String,
    },
    /// Alibaba ACK.
    Ack {
        /// Availability zone.
        zone_id: String,
    },
    /// Alibaba serverless Kubernetes.
    Acsk {
        /// Optional availability zone.
        #[serde(default)]
        zone_id: Option<String>,
    },
    /// Oracle OKE.
    Oke {
        /// Compartment OCID.
        compartment_id: String,
        /// Kubernetes version.
        version: String,
    },
    /// Bring-your-own cluster.
    Byoc {
        /// Secret holding the kubeconfig of the existing cluster.
        kubeconfig_secret_id: String,
    },
    /// Dummy test cluster.
    Dummy {
        /// Reported Kubernetes version.
        #[serde(default)]
        kubernetes_version: Option<String>,
    },
}

impl ProviderConfig {
    /// The distribution this payload belongs to.
    pub fn distribution(&self) -> Distribution {
        match self {
            Self::Ec2 { .. } => Distribution::Ec2,
            Self::Eks { .. } => Distribution::Eks,
            Self::Aks { .. } => Distribution::Aks,
            Self::Gke { .. } => Distribution::Gke,
            Self::Ack { .. } => Distribution::Ack,
            Self::Acsk { .. } => Distribution::Acsk,
            Self::Oke { .. } => Distribution::Oke,
            Self::Byoc { .. } => Distribution::Byoc,
            Self::Dummy { .. } => Distribution::Dummy,
        }
    }

    /// The Kubernetes version declared by the payload, when it carries one.
    pub fn kubernetes_version(&self) -> Option<&str> {
        match self {
            Self::Ec2 {
                kubernetes_version, ..
            }
            | Self::Aks {
                kubernetes_version, ..
            }
            | Self::Gke {
                kubernetes_version, ..
            } => Some(kubernetes_version),
            Self::Eks { version } | Self::Oke { version, .. } => Some(version),
            Self::Dummy { kubernetes_version } => kubernetes_version.as_deref(),
            Self::Ack { .. } | Self::Acsk { .. } | Self::Byoc { .. } => None,
        }
    }

    /// Replace the declared Kubernetes version. Returns `false` when the payload
    /// has no version field.
    pub fn set_kubernetes_version(&mut self, new_version: &str) -> bool {
        match self {
            Self::Ec2 {
                kubernetes_version, ..
            }
            | Self::Aks {
                kubernetes_version, ..
            }
            | Self::Gke {
                kubernetes_version, ..
            } => *kubernetes_version = new_version.to_string(),
            Self::Eks { version } | Self::Oke { version, .. } => *version = new_version.to_string(),
            Self::Dummy { kubernetes_version } => {
                *kubernetes_version = Some(new_version.to_string())
            }
            Self::Ack { .. } | Self::Acsk { .. } | Self::Byoc { .. } => return false,
        }
        true
    }
}

/// Whether `name` is a valid DNS-1123 label.
///
/// Cluster names must be labels: they name directories under the data dir and
/// DNS records.
pub fn is_dns1123_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
}

/// Checks shared by [`ClusterRecord`] and [`NewCluster`].
fn validate_payload_parts(
    name: &str,
    cloud: CloudProvider,
    distribution: Distribution,
    provider: &ProviderConfig,
    node_pools: &[NodePool],
) -> Result<(), CoreError> {
    if !is_dns1123_label(name) {
        return Err(CoreError::validation(
            "name",
            format!("'{}' is not a DNS-1123 label", name),
        ));
    }
    if provider.distribution() != distribution {
        return Err(CoreError::validation(
            "provider",
            format!(
                "payload for '{}' does not match distribution '{}'",
                provider.distribution(),
                distribution
            ),
        ));
    }
    if distribution.cloud() != cloud {
        return Err(CoreError::validation(
            "cloud",
            format!(
                "distribution '{}' runs on '{}', not '{}'",
                distribution,
                distribution.cloud(),
                cloud
            ),
        ));
    }

    let mut names = std::collections::BTreeSet::new();
    for pool in node_pools {
        if !names.insert(pool.name.as_str()) {
            return Err(CoreError::validation(
                "node_pools",
                format!("duplicate node pool '{}'", pool.name),
            ));
        }
    }

    Ok(())
}

/// Persisted cluster aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Database identity.
    pub id: i64,
    /// Globally unique id (UUID v4).
    pub uid: String,
    /// Owning organization.
    pub organization_id: i64,
    /// User who requested creation.
    pub created_by: i64,
    /// Name, unique within the organization.
    pub name: String,
    /// Cloud provider.
    pub cloud: CloudProvider,
    /// Distribution.
    pub distribution: Distribution,
    /// Region / location.
    pub location: String,
    /// Lifecycle status.
    pub status: ClusterStatus,
    /// Message attached to the last status change.
    pub status_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Time to live after the cluster reached running, in minutes.
    pub ttl_minutes: Option<i64>,
    /// Installed add-ons.
    pub features: ClusterFeatures,
    /// Cloud credential secret.
    pub secret_id: String,
    /// SSH key pair secret.
    pub ssh_secret_id: Option<String>,
    /// Kubeconfig secret.
    pub config_secret_id: Option<String>,
    /// Distribution-specific settings.
    pub provider: ProviderConfig,
    /// Worker node pools.
    pub node_pools: Vec<NodePool>,
    /// Provider resource identifiers, written right after provisioning.
    pub resource_ids: BTreeMap<String, String>,
    /// Post hooks requested at creation.
    pub post_hooks: Vec<PostHookSpec>,
}

impl ClusterRecord {
    /// Reject records whose provider payload, distribution and cloud disagree.
    pub fn validate_payload(&self) -> Result<(), CoreError> {
        validate_payload_parts(
            &self.name,
            self.cloud,
            self.distribution,
            &self.provider,
            &self.node_pools,
        )
    }

    /// Whether the cluster has a positive TTL.
    pub fn has_ttl(&self) -> bool {
        self.ttl_minutes.is_some_and(|ttl| ttl > 0)
    }

    /// Whether provisioning already recorded resource identifiers.
    pub fn is_provisioned(&self) -> bool {
        !self.resource_ids.is_empty()
    }

    /// Look up a node pool by name.
    pub fn node_pool(&self, name: &str) -> Option<&NodePool> {
        self.node_pools.iter().find(|pool| pool.name == name)
    }
}

/// Insert shape of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCluster {
    /// Owning organization.
    pub organization_id: i64,
    /// User who requested creation.
    pub created_by: i64,
    /// Name, unique within the organization.
    pub name: String,
    /// Cloud provider.
    pub cloud: CloudProvider,
    /// Distribution.
    pub distribution: Distribution,
    /// Region / location.
    pub location: String,
    /// Time to live in minutes.
    pub ttl_minutes: Option<i64>,
    /// Initial feature flags.
    #[serde(default)]
    pub features: ClusterFeatures,
    /// Cloud credential secret.
    pub secret_id: String,
    /// SSH key pair secret, if supplied by the caller.
    #[serde(default)]
    pub ssh_secret_id: Option<String>,
    /// Kubeconfig secret, if already known.
    #[serde(default)]
    pub config_secret_id: Option<String>,
    /// Distribution-specific settings.
    pub provider: ProviderConfig,
    /// Worker node pools.
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
    /// Post hooks to run after provisioning.
    #[serde(default)]
    pub post_hooks: Vec<PostHookSpec>,
}

impl NewCluster {
    /// Reject payloads whose provider payload, distribution and cloud disagree.
    pub fn validate_payload(&self) -> Result<(), CoreError> {
        validate_payload_parts(
            &self.name,
            self.cloud,
            self.distribution,
            &self.provider,
            &self.node_pools,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_cluster() -> NewCluster {
        NewCluster {
            organization_id: 1,
            created_by: 10,
            name: "demo".to_string(),
            cloud: CloudProvider::Dummy,
            distribution: Distribution::Dummy,
            location: "local".to_string(),
            ttl_minutes: None,
            features: ClusterFeatures::default(),
            secret_id: "secret-1".to_string(),
            ssh_secret_id: None,
            config_secret_id: None,
            provider: ProviderConfig::Dummy {
                kubernetes_version: None,
            },
            node_pools: vec![NodePool::new("pool1", "small", 1)],
            post_hooks: Vec::new(),
        }
    }

    #[test]
    fn test_every_distribution_maps_to_one_cloud() {
        for distribution in Distribution::ALL {
            let parsed: Distribution = distribution.as_str().parse().unwrap();
            assert_eq!(parsed, distribution);
            assert!(CloudProvider::ALL.contains(&distribution.cloud()));
        }
        assert_eq!(Distribution::Eks.cloud(), CloudProvider::Amazon);
        assert_eq!(Distribution::Acsk.cloud(), CloudProvider::Alibaba);
        assert_eq!(Distribution::Byoc.cloud(), CloudProvider::Kubernetes);
    }

    #[test]
    fn test_validate_payload_accepts_consistent_cluster() {
        assert!(dummy_cluster().validate_payload().is_ok());
    }

    #[test]
    fn test_validate_payload_rejects_mixed_provider() {
        let mut cluster = dummy_cluster();
        cluster.provider = ProviderConfig::Eks {
            version: "1.29".to_string(),
        };
        let err = cluster.validate_payload().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let mut cluster = dummy_cluster();
        cluster.cloud = CloudProvider::Amazon;
        assert!(cluster.validate_payload().is_err());
    }

    #[test]
    fn test_validate_payload_rejects_duplicate_pools() {
        let mut cluster = dummy_cluster();
        cluster.node_pools.push(NodePool::new("pool1", "large", 2));
        assert!(cluster.validate_payload().is_err());
    }

    #[test]
    fn test_validate_payload_rejects_names_that_are_not_labels() {
        for name in ["", "..", "/tmp/victim", "a/b", "Demo", "-demo", "demo_1"] {
            let mut cluster = dummy_cluster();
            cluster.name = name.to_string();
            let err = cluster.validate_payload().unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR", "{name}");
        }
        assert!(is_dns1123_label("demo-1"));
        assert!(!is_dns1123_label(&"a".repeat(64)));
    }

    #[test]
    fn test_provider_config_is_tagged_by_distribution() {
        let config = ProviderConfig::Aks {
            resource_group: "rg".to_string(),
            kubernetes_version: "1.28".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["distribution"], "aks");
        assert_eq!(json["resource_group"], "rg");

        let back: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.distribution(), Distribution::Aks);
        assert_eq!(back.kubernetes_version(), Some("1.28"));
    }

    #[test]
    fn test_node_pool_count_bounds() {
        let mut pool = NodePool::new("workers", "m5.large", 3);
        assert!(pool.validate_counts().is_ok());

        pool.min_count = 4;
        assert!(pool.validate_counts().is_err());

        pool.min_count = 1;
        pool.max_count = 2;
        assert!(pool.validate_counts().is_err());
    }

    #[test]
    fn test_feature_flags() {
        let mut features = ClusterFeatures::default();
        features.set(ClusterFeature::ServiceMesh, true);
        assert!(features.get(ClusterFeature::ServiceMesh));
        assert!(!features.get(ClusterFeature::Logging));
    }
}
