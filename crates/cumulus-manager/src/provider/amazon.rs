// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Amazon distributions: self-hosted Kubernetes on EC2, and EKS.

use async_trait::async_trait;
use cumulus_core::ProviderConfig;

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::traits::{CommonCluster, validate_placement};
use crate::request::{CreateClusterRequest, UpdateClusterRequest};

/// EKS control plane versions accepted for new clusters and upgrades.
pub const SUPPORTED_EKS_VERSIONS: &[&str] = &["1.27", "1.28", "1.29", "1.30", "1.31"];

/// Self-hosted Kubernetes on EC2 instances.
pub struct Ec2Cluster {
    base: ClusterBase,
}

impl Ec2Cluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for Ec2Cluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        true
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        let ProviderConfig::Ec2 {
            master_instance_type,
            master_image,
            ..
        } = &request.provider
        else {
            return Err(ProviderError::Validation(
                "ec2 cluster requires an ec2 payload".to_string(),
            ));
        };

        if let Some(pool) = request.node_pools.iter().find(|p| p.image.is_none()) {
            return Err(ProviderError::Validation(format!(
                "node pool '{}' needs an image",
                pool.name
            )));
        }

        validate_placement(&self.base, request).await?;
        let cloud = self.base.cloud()?;
        cloud
            .validate_machine_type(&request.location, master_instance_type)
            .await?;
        cloud.validate_image(&request.location, master_image).await
    }

    async fn validate_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        if let Some(pool) = request
            .node_pools
            .iter()
            .flatten()
            .find(|p| p.image.is_none())
        {
            return Err(ProviderError::Validation(format!(
                "node pool '{}' needs an image",
                pool.name
            )));
        }
        Ok(())
    }
}

/// Parse `major.minor[.patch]`.
fn minor_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn check_eks_version(version: &str) -> Result<()> {
    if SUPPORTED_EKS_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(ProviderError::Validation(format!(
            "EKS version '{}' is not supported (supported: {})",
            version,
            SUPPORTED_EKS_VERSIONS.join(", ")
        )))
    }
}

/// Amazon Elastic Kubernetes Service.
pub struct EksCluster {
    base: ClusterBase,
}

impl EksCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for EksCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        true
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        let ProviderConfig::Eks { version } = &request.provider else {
            return Err(ProviderError::Validation(
                "eks cluster requires an eks payload".to_string(),
            ));
        };
        check_eks_version(version)?;
        validate_placement(&self.base, request).await
    }

    async fn validate_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        let Some(wanted) = request.kubernetes_version.as_deref() else {
            return Ok(());
        };
        let current = self
            .base
            .read(|r| r.provider.kubernetes_version().map(str::to_string))
            .unwrap_or_default();
        if wanted == current {
            return Ok(());
        }

        check_eks_version(wanted)?;
        match (minor_version(&current), minor_version(wanted)) {
            (Some((from_major, from_minor)), Some((to_major, to_minor)))
                if from_major == to_major && to_minor == from_minor + 1 =>
            {
                Ok(())
            }
            _ => Err(ProviderError::Validation(format!(
                "EKS upgrades move one minor version at a time ({} -> {} requested)",
                current, wanted
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_version_parsing() {
        assert_eq!(minor_version("1.29"), Some((1, 29)));
        assert_eq!(minor_version("v1.30.2"), Some((1, 30)));
        assert_eq!(minor_version("latest"), None);
    }

    #[test]
    fn test_eks_version_support() {
        assert!(check_eks_version("1.29").is_ok());
        assert!(check_eks_version("1.12").unwrap_err().is_validation());
    }
}
