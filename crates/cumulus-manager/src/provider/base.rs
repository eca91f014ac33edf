// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State shared by every cluster handle.

use std::sync::{Arc, PoisonError, RwLock};

use cumulus_core::{ClusterRecord, ClusterStatus, CoreError, Persistence};
use tracing::debug;

use super::ProviderError;
use super::cloud::CloudClient;
use crate::external::SecretStore;

/// Record, persistence and clients behind a cluster handle.
///
/// The record is cached in memory and written back explicitly through
/// [`ClusterBase::persist`] or [`ClusterBase::set_status`].
pub struct ClusterBase {
    record: RwLock<ClusterRecord>,
    persistence: Arc<dyn Persistence>,
    secrets: Arc<dyn SecretStore>,
    cloud: Option<Arc<dyn CloudClient>>,
}

impl ClusterBase {
    /// Create a base around a record.
    pub fn new(
        record: ClusterRecord,
        persistence: Arc<dyn Persistence>,
        secrets: Arc<dyn SecretStore>,
        cloud: Option<Arc<dyn CloudClient>>,
    ) -> Self {
        Self {
            record: RwLock::new(record),
            persistence,
            secrets,
            cloud,
        }
    }

    /// Snapshot of the cached record.
    pub fn record(&self) -> ClusterRecord {
        self.read(Clone::clone)
    }

    /// Read from the cached record without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&ClusterRecord) -> T) -> T {
        let record = self.record.read().unwrap_or_else(PoisonError::into_inner);
        f(&record)
    }

    /// Mutate the cached record. Not persisted until [`ClusterBase::persist`].
    pub fn update<T>(&self, f: impl FnOnce(&mut ClusterRecord) -> T) -> T {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }

    /// Replace the cached record.
    pub fn replace(&self, record: ClusterRecord) {
        self.update(|current| *current = record);
    }

    /// Persistence backend.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Secret store.
    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Cloud client of the cluster's cloud.
    pub fn cloud(&self) -> Result<&Arc<dyn CloudClient>, ProviderError> {
        self.cloud.as_ref().ok_or_else(|| {
            ProviderError::Unsupported(format!(
                "distribution '{}' has no cloud client",
                self.read(|r| r.distribution)
            ))
        })
    }

    /// Write the cached record back.
    pub async fn persist(&self) -> Result<(), CoreError> {
        let record = self.record();
        self.persistence.save_cluster(&record).await
    }

    /// Move to `status` if the state machine allows it, persisting the change and
    /// its history entry.
    pub async fn set_status(
        &self,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<(), CoreError> {
        let (id, current) = self.read(|r| (r.id, r.status));
        if current != status && !current.can_transition_to(status) {
            return Err(CoreError::InvalidClusterState {
                cluster_id: id,
                expected: format!("a status that may move to {}", status),
                actual: current.to_string(),
            });
        }
        self.write_status(status, message).await
    }

    /// Move to `status` without consulting the state machine. Used by forced
    /// deletion only.
    pub async fn force_status(
        &self,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<(), CoreError> {
        self.write_status(status, message).await
    }

    async fn write_status(
        &self,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<(), CoreError> {
        let id = self.read(|r| r.id);
        let change = self.persistence.update_status(id, status, message).await?;
        if let Some(change) = &change {
            debug!(
                cluster_id = id,
                from = ?change.from_status,
                to = %change.to_status,
                "Cluster status changed"
            );
        }
        self.update(|r| {
            r.status = status;
            r.status_message = message.map(str::to_string);
            if let Some(change) = change {
                r.updated_at = change.created_at;
            }
        });
        Ok(())
    }
}
