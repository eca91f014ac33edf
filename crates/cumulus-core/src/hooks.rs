// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Post-hook descriptors.
//!
//! Hooks are plain data: the manager crate executes them. They are persisted on the
//! cluster record so an interrupted creation can replay the same chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterFeature;

/// Service mesh installation parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMeshParams {
    /// Enforce mutual TLS between workloads.
    #[serde(default)]
    pub mtls: bool,
    /// Namespaces that get automatic sidecar injection.
    #[serde(default)]
    pub auto_sidecar_injection_namespaces: Vec<String>,
}

/// Log collection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingParams {
    /// Object storage bucket receiving the logs.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Days to keep logs, 0 keeps them forever.
    #[serde(default)]
    pub retention_days: u32,
}

/// Monitoring stack parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringParams {
    /// Install the dashboard UI.
    #[serde(default)]
    pub dashboards: bool,
    /// Install the alert manager.
    #[serde(default)]
    pub alerting: bool,
}

/// Security scanner parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScanParams {
    /// Policy bundle applied by the admission webhook.
    #[serde(default)]
    pub policy: Option<String>,
    /// Images exempt from scanning.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// A post-creation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hook", content = "params", rename_all = "snake_case")]
pub enum PostHookSpec {
    /// Store the kubeconfig in the secret store.
    StoreKubeConfig,
    /// Persist the cluster CA and client certificates locally.
    PersistKubernetesCerts,
    /// Register the cluster with the global monitoring configuration.
    UpdateMonitoringConfig,
    /// Prepare Helm in the cluster.
    InstallHelm,
    /// Register the cluster DNS domain.
    RegisterDomain,
    /// Install the ingress controller.
    InstallIngress,
    /// Install the cluster autoscaler.
    InstallAutoscaler,
    /// Install the service mesh.
    InstallServiceMesh(ServiceMeshParams),
    /// Install log collection.
    InstallLogging(LoggingParams),
    /// Install the monitoring stack.
    InstallMonitoring(MonitoringParams),
    /// Install the security scanner.
    InstallSecurityScan(SecurityScanParams),
}

impl PostHookSpec {
    /// Hooks every creation runs, in order, before caller-supplied hooks.
    pub fn base_chain() -> Vec<PostHookSpec> {
        vec![
            PostHookSpec::StoreKubeConfig,
            PostHookSpec::PersistKubernetesCerts,
            PostHookSpec::UpdateMonitoringConfig,
            PostHookSpec::InstallHelm,
            PostHookSpec::RegisterDomain,
            PostHookSpec::InstallIngress,
            PostHookSpec::InstallAutoscaler,
        ]
    }

    /// Stable snake_case name, used in logs and status messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StoreKubeConfig => "store_kube_config",
            Self::PersistKubernetesCerts => "persist_kubernetes_certs",
            Self::UpdateMonitoringConfig => "update_monitoring_config",
            Self::InstallHelm => "install_helm",
            Self::RegisterDomain => "register_domain",
            Self::InstallIngress => "install_ingress",
            Self::InstallAutoscaler => "install_autoscaler",
            Self::InstallServiceMesh(_) => "install_service_mesh",
            Self::InstallLogging(_) => "install_logging",
            Self::InstallMonitoring(_) => "install_monitoring",
            Self::InstallSecurityScan(_) => "install_security_scan",
        }
    }

    /// Feature flag set once the hook succeeds.
    pub fn feature(&self) -> Option<ClusterFeature> {
        match self {
            Self::InstallServiceMesh(_) => Some(ClusterFeature::ServiceMesh),
            Self::InstallLogging(_) => Some(ClusterFeature::Logging),
            Self::InstallMonitoring(_) => Some(ClusterFeature::Monitoring),
            Self::InstallSecurityScan(_) => Some(ClusterFeature::SecurityScan),
            _ => None,
        }
    }

    /// Whether the hook belongs to the base chain.
    pub fn is_base(&self) -> bool {
        self.feature().is_none()
    }
}

impl fmt::Display for PostHookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
