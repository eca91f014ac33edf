// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for cumulus-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! Both backends share the row shapes below; structured columns (provider payload,
//! node pools, resource ids, post hooks, features) are stored as JSON text.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cluster::{ClusterRecord, NewCluster};
use crate::error::CoreError;
use crate::status::{ClusterStatus, StatusChange};

/// Raw `clusters` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ClusterRow {
    pub id: i64,
    pub uid: String,
    pub organization_id: i64,
    pub created_by: i64,
    pub name: String,
    pub cloud: String,
    pub distribution: String,
    pub location: String,
    pub status: String,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_minutes: Option<i64>,
    pub features: String,
    pub secret_id: String,
    pub ssh_secret_id: Option<String>,
    pub config_secret_id: Option<String>,
    pub provider_config: String,
    pub node_pools: String,
    pub resource_ids: String,
    pub post_hooks: String,
}

/// Columns selected for [`ClusterRow`], shared by both backends.
pub(crate) const CLUSTER_COLUMNS: &str = "id, uid, organization_id, created_by, name, cloud, \
     distribution, location, status, status_message, created_at, updated_at, ttl_minutes, \
     features, secret_id, ssh_secret_id, config_secret_id, provider_config, node_pools, \
     resource_ids, post_hooks";

impl TryFrom<ClusterRow> for ClusterRecord {
    type Error = CoreError;

    fn try_from(row: ClusterRow) -> Result<Self, Self::Error> {
        Ok(ClusterRecord {
            id: row.id,
            uid: row.uid,
            organization_id: row.organization_id,
            created_by: row.created_by,
            name: row.name,
            cloud: row.cloud.parse()?,
            distribution: row.distribution.parse()?,
            location: row.location,
            status: parse_status(&row.status)?,
            status_message: row.status_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ttl_minutes: row.ttl_minutes,
            features: serde_json::from_str(&row.features)?,
            secret_id: row.secret_id,
            ssh_secret_id: row.ssh_secret_id,
            config_secret_id: row.config_secret_id,
            provider: serde_json::from_str(&row.provider_config)?,
            node_pools: serde_json::from_str(&row.node_pools)?,
            resource_ids: serde_json::from_str(&row.resource_ids)?,
            post_hooks: serde_json::from_str(&row.post_hooks)?,
        })
    }
}

/// Raw `cluster_status_history` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StatusChangeRow {
    pub id: i64,
    pub cluster_id: i64,
    pub cluster_name: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StatusChangeRow> for StatusChange {
    type Error = CoreError;

    fn try_from(row: StatusChangeRow) -> Result<Self, Self::Error> {
        Ok(StatusChange {
            id: row.id,
            cluster_id: row.cluster_id,
            cluster_name: row.cluster_name,
            from_status: row.from_status.as_deref().map(parse_status).transpose()?,
            to_status: parse_status(&row.to_status)?,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<ClusterStatus, CoreError> {
    raw.parse().map_err(|e: crate::status::ParseStatusError| CoreError::DatabaseError {
        operation: "decode".to_string(),
        details: e.to_string(),
    })
}

/// JSON-encoded mutable columns of a cluster.
pub(crate) struct EncodedColumns {
    pub features: String,
    pub provider_config: String,
    pub node_pools: String,
    pub resource_ids: String,
    pub post_hooks: String,
}

impl EncodedColumns {
    pub fn from_record(record: &ClusterRecord) -> Result<Self, CoreError> {
        Ok(Self {
            features: serde_json::to_string(&record.features)?,
            provider_config: serde_json::to_string(&record.provider)?,
            node_pools: serde_json::to_string(&record.node_pools)?,
            resource_ids: serde_json::to_string(&record.resource_ids)?,
            post_hooks: serde_json::to_string(&record.post_hooks)?,
        })
    }

    pub fn from_new(cluster: &NewCluster) -> Result<Self, CoreError> {
        Ok(Self {
            features: serde_json::to_string(&cluster.features)?,
            provider_config: serde_json::to_string(&cluster.provider)?,
            node_pools: serde_json::to_string(&cluster.node_pools)?,
            resource_ids: "{}".to_string(),
            post_hooks: serde_json::to_string(&cluster.post_hooks)?,
        })
    }
}

/// Map a unique-constraint violation on insert to [`CoreError::ClusterAlreadyExists`].
pub(crate) fn map_insert_error(err: sqlx::Error, cluster: &NewCluster) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::ClusterAlreadyExists {
            organization_id: cluster.organization_id,
            name: cluster.name.clone(),
        },
        _ => CoreError::DatabaseError {
            operation: "insert_cluster".to_string(),
            details: err.to_string(),
        },
    }
}

/// Persistence interface used by the cluster manager.
///
/// Implementations must keep status history append-only: deleting a cluster never
/// removes its history rows.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert a cluster in status `CREATING` together with its first history entry.
    ///
    /// Fails with [`CoreError::ClusterAlreadyExists`] when the organization already
    /// owns a cluster with the same name.
    async fn insert_cluster(&self, cluster: &NewCluster) -> Result<ClusterRecord, CoreError>;

    /// Load a cluster by id.
    async fn get_cluster(&self, id: i64) -> Result<Option<ClusterRecord>, CoreError>;

    /// Load a cluster by organization and name.
    async fn get_cluster_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<ClusterRecord>, CoreError>;

    /// Whether the organization owns a cluster with this name.
    async fn exists(&self, organization_id: i64, name: &str) -> Result<bool, CoreError>;

    /// All clusters of an organization, ordered by id.
    async fn find_by_organization(
        &self,
        organization_id: i64,
    ) -> Result<Vec<ClusterRecord>, CoreError>;

    /// All clusters, optionally restricted to one status.
    async fn list_clusters(
        &self,
        status: Option<ClusterStatus>,
    ) -> Result<Vec<ClusterRecord>, CoreError>;

    /// Write every mutable column except status and status message.
    async fn save_cluster(&self, cluster: &ClusterRecord) -> Result<(), CoreError>;

    /// Set status and message.
    ///
    /// Returns the appended history entry when the status changed, `None` when only
    /// the message was updated.
    async fn update_status(
        &self,
        id: i64,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<Option<StatusChange>, CoreError>;

    /// Remove the cluster row. Returns `false` when it did not exist.
    async fn delete_cluster(&self, id: i64) -> Result<bool, CoreError>;

    /// Status history of a cluster ordered by time, then id.
    async fn list_status_history(&self, cluster_id: i64) -> Result<Vec<StatusChange>, CoreError>;

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
