// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Oracle Container Engine for Kubernetes.

use async_trait::async_trait;
use cumulus_core::ProviderConfig;

use super::ProviderError;
use super::base::ClusterBase;
use super::cloud::Result;
use super::traits::{CommonCluster, validate_placement};
use crate::request::CreateClusterRequest;

/// Oracle OKE.
pub struct OkeCluster {
    base: ClusterBase,
}

impl OkeCluster {
    /// Wrap a base.
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CommonCluster for OkeCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn requires_ssh_public_key(&self) -> bool {
        true
    }

    async fn validate_creation_fields(&self, request: &CreateClusterRequest) -> Result<()> {
        match &request.provider {
            ProviderConfig::Oke { compartment_id, .. } if !compartment_id.trim().is_empty() => {}
            _ => {
                return Err(ProviderError::Validation(
                    "OKE cluster requires a compartment id".to_string(),
                ));
            }
        }
        validate_placement(&self.base, request).await
    }
}
