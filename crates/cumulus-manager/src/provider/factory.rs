// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Distribution to handle mapping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cumulus_core::{
    CloudProvider, ClusterRecord, ClusterStatus, Distribution, Persistence,
};

use super::ProviderError;
use super::alibaba::{AckCluster, AcskCluster};
use super::amazon::{Ec2Cluster, EksCluster};
use super::azure::AksCluster;
use super::base::ClusterBase;
use super::cloud::{CloudClient, Result};
use super::dummy::{DummyCluster, LocalCloud};
use super::google::GkeCluster;
use super::kubernetes::ByocCluster;
use super::oracle::OkeCluster;
use super::traits::CommonCluster;
use crate::external::SecretStore;
use crate::request::CreateClusterRequest;

/// Builds cluster handles.
///
/// Holds one [`CloudClient`] per cloud. The dummy distribution falls back to
/// [`LocalCloud`] when no client is registered for [`CloudProvider::Dummy`];
/// BYOC clusters never get a client.
#[derive(Clone)]
pub struct ClusterFactory {
    persistence: Arc<dyn Persistence>,
    secrets: Arc<dyn SecretStore>,
    clouds: HashMap<CloudProvider, Arc<dyn CloudClient>>,
}

impl ClusterFactory {
    /// Factory without cloud clients.
    pub fn new(persistence: Arc<dyn Persistence>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            persistence,
            secrets,
            clouds: HashMap::new(),
        }
    }

    /// Register the client of `client.cloud()`, replacing any previous one.
    pub fn with_cloud_client(mut self, client: Arc<dyn CloudClient>) -> Self {
        self.clouds.insert(client.cloud(), client);
        self
    }

    /// Persistence shared by every handle.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Secret store shared by every handle.
    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    fn cloud_client(&self, distribution: Distribution) -> Result<Option<Arc<dyn CloudClient>>> {
        match distribution {
            Distribution::Byoc => Ok(None),
            Distribution::Dummy => Ok(Some(
                self.clouds
                    .get(&CloudProvider::Dummy)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(LocalCloud)),
            )),
            other => self
                .clouds
                .get(&other.cloud())
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    ProviderError::Unsupported(format!(
                        "no cloud client configured for '{}'",
                        other.cloud()
                    ))
                }),
        }
    }

    /// Handle for a stored cluster.
    pub fn from_record(&self, record: ClusterRecord) -> Result<Arc<dyn CommonCluster>> {
        record.validate_payload()?;
        let distribution = record.distribution;
        let base = ClusterBase::new(
            record,
            Arc::clone(&self.persistence),
            Arc::clone(&self.secrets),
            self.cloud_client(distribution)?,
        );

        let cluster: Arc<dyn CommonCluster> = match distribution {
            Distribution::Ec2 => Arc::new(Ec2Cluster::new(base)),
            Distribution::Eks => Arc::new(EksCluster::new(base)),
            Distribution::Aks => Arc::new(AksCluster::new(base)),
            Distribution::Gke => Arc::new(GkeCluster::new(base)),
            Distribution::Ack => Arc::new(AckCluster::new(base)),
            Distribution::Acsk => Arc::new(AcskCluster::new(base)),
            Distribution::Oke => Arc::new(OkeCluster::new(base)),
            Distribution::Byoc => Arc::new(ByocCluster::new(base)),
            Distribution::Dummy => Arc::new(DummyCluster::new(base)),
        };
        Ok(cluster)
    }

    /// Handle for a cluster that has not been inserted yet.
    ///
    /// The record carries id `0` and an empty uid until the creator inserts it
    /// and swaps the stored record in.
    pub fn from_request(
        &self,
        organization_id: i64,
        user_id: i64,
        request: &CreateClusterRequest,
    ) -> Result<Arc<dyn CommonCluster>> {
        let new = request.to_new_cluster(organization_id, user_id);
        new.validate_payload()?;

        let now = Utc::now();
        self.from_record(ClusterRecord {
            id: 0,
            uid: String::new(),
            organization_id: new.organization_id,
            created_by: new.created_by,
            name: new.name,
            cloud: new.cloud,
            distribution: new.distribution,
            location: new.location,
            status: ClusterStatus::Creating,
            status_message: None,
            created_at: now,
            updated_at: now,
            ttl_minutes: new.ttl_minutes,
            features: new.features,
            secret_id: new.secret_id,
            ssh_secret_id: new.ssh_secret_id,
            config_secret_id: new.config_secret_id,
            provider: new.provider,
            node_pools: new.node_pools,
            resource_ids: Default::default(),
            post_hooks: new.post_hooks,
        })
    }
}
