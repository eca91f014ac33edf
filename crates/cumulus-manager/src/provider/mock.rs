// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock cloud client for testing.
//!
//! Simulates a cloud API without network access. Every call is recorded and any
//! operation can be made to fail, or to panic, on demand.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_core::{CloudProvider, ClusterRecord, NodePool};

use super::ProviderError;
use super::cloud::{CloudClient, ResourceIds, Result};
use crate::kubeconfig::Kubeconfig;

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCall {
    /// Operation name (trait method).
    pub op: &'static str,
    /// Cluster name, or the validated value for `validate_*` calls.
    pub target: String,
}

#[derive(Debug, Clone)]
enum Injected {
    Fail(ProviderError, Option<usize>),
    Panic,
}

/// Mock cloud client.
pub struct MockCloudClient {
    cloud: CloudProvider,
    calls: Mutex<Vec<CloudCall>>,
    injected: Mutex<Vec<(&'static str, Injected)>>,
    rejected_values: Mutex<BTreeSet<String>>,
    applied_pools: Mutex<Vec<Vec<NodePool>>>,
    /// Delay applied to `provision`, to keep clusters in CREATING for a while.
    pub provision_delay: Duration,
}

impl MockCloudClient {
    /// Create a mock client for `cloud` that accepts everything.
    pub fn new(cloud: CloudProvider) -> Self {
        Self {
            cloud,
            calls: Mutex::new(Vec::new()),
            injected: Mutex::new(Vec::new()),
            rejected_values: Mutex::new(BTreeSet::new()),
            applied_pools: Mutex::new(Vec::new()),
            provision_delay: Duration::ZERO,
        }
    }

    /// Create a mock client whose `provision` sleeps for `delay`.
    pub fn slow(cloud: CloudProvider, delay: Duration) -> Self {
        Self {
            provision_delay: delay,
            ..Self::new(cloud)
        }
    }

    /// Make `op` fail with `error` on every call.
    pub fn fail(&self, op: &'static str, error: ProviderError) {
        self.inject(op, Injected::Fail(error, None));
    }

    /// Make `op` fail with `error` for the next `times` calls.
    pub fn fail_times(&self, op: &'static str, error: ProviderError, times: usize) {
        self.inject(op, Injected::Fail(error, Some(times)));
    }

    /// Make `op` panic.
    pub fn panic_on(&self, op: &'static str) {
        self.inject(op, Injected::Panic);
    }

    /// Reject a location, machine type or image during validation.
    pub fn reject(&self, value: &str) {
        self.rejected_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(value.to_string());
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pool sets passed to `apply_node_pools`, oldest first.
    pub fn applied_node_pools(&self) -> Vec<Vec<NodePool>> {
        self.applied_pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls to `op`.
    pub fn call_count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    fn inject(&self, op: &'static str, injected: Injected) {
        let mut entries = self.injected.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(name, _)| *name != op);
        entries.push((op, injected));
    }

    fn record(&self, op: &'static str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CloudCall {
                op,
                target: target.to_string(),
            });

        let injected = {
            let mut entries = self.injected.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.iter_mut().find(|(name, _)| *name == op) {
                Some((_, Injected::Panic)) => Some(Injected::Panic),
                Some((_, Injected::Fail(error, remaining))) => match remaining {
                    None => Some(Injected::Fail(error.clone(), None)),
                    Some(0) => None,
                    Some(n) => {
                        *n -= 1;
                        Some(Injected::Fail(error.clone(), None))
                    }
                },
                None => None,
            }
        };

        match injected {
            Some(Injected::Panic) => panic!("mock cloud client panicked in {}", op),
            Some(Injected::Fail(error, _)) => Err(error),
            None => Ok(()),
        }
    }

    fn check_value(&self, kind: &str, value: &str) -> Result<()> {
        let rejected = self
            .rejected_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(value);
        if rejected {
            return Err(ProviderError::Validation(format!(
                "{} '{}' is not available",
                kind, value
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for MockCloudClient {
    fn cloud(&self) -> CloudProvider {
        self.cloud
    }

    async fn validate_location(&self, location: &str) -> Result<()> {
        self.record("validate_location", location)?;
        self.check_value("location", location)
    }

    async fn validate_machine_type(&self, _location: &str, machine_type: &str) -> Result<()> {
        self.record("validate_machine_type", machine_type)?;
        self.check_value("machine type", machine_type)
    }

    async fn validate_image(&self, _location: &str, image: &str) -> Result<()> {
        self.record("validate_image", image)?;
        self.check_value("image", image)
    }

    async fn provision(&self, cluster: &ClusterRecord) -> Result<ResourceIds> {
        if !self.provision_delay.is_zero() {
            tokio::time::sleep(self.provision_delay).await;
        }
        self.record("provision", &cluster.name)?;

        let short_uid: String = cluster.uid.chars().take(8).collect();
        Ok(ResourceIds::from([
            (
                "cluster".to_string(),
                format!("{}-{}-{}", self.cloud, cluster.distribution, short_uid),
            ),
            ("network".to_string(), format!("net-{}", short_uid)),
        ]))
    }

    async fn apply_node_pools(&self, cluster: &ClusterRecord, pools: &[NodePool]) -> Result<()> {
        self.applied_pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pools.to_vec());
        self.record("apply_node_pools", &cluster.name)
    }

    async fn upgrade_control_plane(&self, cluster: &ClusterRecord, version: &str) -> Result<()> {
        self.record("upgrade_control_plane", &format!("{}@{}", cluster.name, version))
    }

    async fn deprovision(&self, cluster: &ClusterRecord) -> Result<()> {
        self.record("deprovision", &cluster.name)
    }

    async fn fetch_kubeconfig(&self, cluster: &ClusterRecord) -> Result<String> {
        self.record("fetch_kubeconfig", &cluster.name)?;
        let server = format!("https://{}.{}.example:6443", cluster.name, self.cloud);
        Kubeconfig::generate(&cluster.name, &server, None, &cluster.uid)
            .to_yaml()
            .map_err(|e| ProviderError::Infrastructure(e.to_string()))
    }
}
