// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.
//!
//! Operations are free functions over a [`PgPool`] so they can be reused outside
//! the [`Persistence`] trait (migrations tooling, admin scripts).

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::cluster::{ClusterRecord, NewCluster};
use crate::error::CoreError;
use crate::migrations;
use crate::status::{ClusterStatus, StatusChange};

use super::{
    CLUSTER_COLUMNS, ClusterRow, EncodedColumns, Persistence, StatusChangeRow, map_insert_error,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation from a migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: e.to_string(),
            })?;

        migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Cluster Operations
// ============================================================================

/// Insert a cluster and its initial history entry.
pub async fn insert_cluster(pool: &PgPool, cluster: &NewCluster) -> Result<ClusterRecord, CoreError> {
    cluster.validate_payload()?;

    let columns = EncodedColumns::from_new(cluster)?;
    let uid = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO clusters (
            uid, organization_id, created_by, name, cloud, distribution, location,
            status, status_message, created_at, updated_at, ttl_minutes, features,
            secret_id, ssh_secret_id, config_secret_id, provider_config, node_pools,
            resource_ids, post_hooks
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING id
        "#,
    )
    .bind(&uid)
    .bind(cluster.organization_id)
    .bind(cluster.created_by)
    .bind(&cluster.name)
    .bind(cluster.cloud.as_str())
    .bind(cluster.distribution.as_str())
    .bind(&cluster.location)
    .bind(ClusterStatus::Creating.as_str())
    .bind(now)
    .bind(cluster.ttl_minutes)
    .bind(&columns.features)
    .bind(&cluster.secret_id)
    .bind(&cluster.ssh_secret_id)
    .bind(&cluster.config_secret_id)
    .bind(&columns.provider_config)
    .bind(&columns.node_pools)
    .bind(&columns.resource_ids)
    .bind(&columns.post_hooks)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_insert_error(e, cluster))?;

    sqlx::query(
        r#"
        INSERT INTO cluster_status_history (cluster_id, cluster_name, from_status, to_status, message, created_at)
        VALUES ($1, $2, NULL, $3, NULL, $4)
        "#,
    )
    .bind(id)
    .bind(&cluster.name)
    .bind(ClusterStatus::Creating.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_cluster(pool, id)
        .await?
        .ok_or(CoreError::ClusterNotFound { cluster_id: id })
}

/// Load a cluster by id.
pub async fn get_cluster(pool: &PgPool, id: i64) -> Result<Option<ClusterRecord>, CoreError> {
    let sql = format!("SELECT {} FROM clusters WHERE id = $1", CLUSTER_COLUMNS);
    let row = sqlx::query_as::<_, ClusterRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(ClusterRecord::try_from).transpose()
}

/// Load a cluster by organization and name.
pub async fn get_cluster_by_name(
    pool: &PgPool,
    organization_id: i64,
    name: &str,
) -> Result<Option<ClusterRecord>, CoreError> {
    let sql = format!(
        "SELECT {} FROM clusters WHERE organization_id = $1 AND name = $2",
        CLUSTER_COLUMNS
    );
    let row = sqlx::query_as::<_, ClusterRow>(&sql)
        .bind(organization_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.map(ClusterRecord::try_from).transpose()
}

/// Whether the organization owns a cluster named `name`.
pub async fn exists(pool: &PgPool, organization_id: i64, name: &str) -> Result<bool, CoreError> {
    let found: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM clusters WHERE organization_id = $1 AND name = $2)",
    )
    .bind(organization_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(found)
}

/// List clusters with optional filtering.
pub async fn list_clusters(
    pool: &PgPool,
    organization_id: Option<i64>,
    status: Option<ClusterStatus>,
) -> Result<Vec<ClusterRecord>, CoreError> {
    let sql = format!(
        r#"
        SELECT {} FROM clusters
        WHERE ($1::BIGINT IS NULL OR organization_id = $1)
          AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY id
        "#,
        CLUSTER_COLUMNS
    );
    let rows = sqlx::query_as::<_, ClusterRow>(&sql)
        .bind(organization_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(ClusterRecord::try_from).collect()
}

/// Write every mutable column except status.
pub async fn save_cluster(pool: &PgPool, cluster: &ClusterRecord) -> Result<(), CoreError> {
    cluster.validate_payload()?;
    let columns = EncodedColumns::from_record(cluster)?;

    let result = sqlx::query(
        r#"
        UPDATE clusters
        SET name = $1, location = $2, ttl_minutes = $3, features = $4, secret_id = $5,
            ssh_secret_id = $6, config_secret_id = $7, provider_config = $8,
            node_pools = $9, resource_ids = $10, post_hooks = $11, updated_at = NOW()
        WHERE id = $12
        "#,
    )
    .bind(&cluster.name)
    .bind(&cluster.location)
    .bind(cluster.ttl_minutes)
    .bind(&columns.features)
    .bind(&cluster.secret_id)
    .bind(&cluster.ssh_secret_id)
    .bind(&cluster.config_secret_id)
    .bind(&columns.provider_config)
    .bind(&columns.node_pools)
    .bind(&columns.resource_ids)
    .bind(&columns.post_hooks)
    .bind(cluster.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ClusterNotFound {
            cluster_id: cluster.id,
        });
    }

    Ok(())
}

/// Update status and message, appending history when the status changed.
pub async fn update_status(
    pool: &PgPool,
    id: i64,
    status: ClusterStatus,
    message: Option<&str>,
) -> Result<Option<StatusChange>, CoreError> {
    let mut tx = pool.begin().await?;

    // Row lock serializes concurrent transitions of the same cluster.
    let current: Option<(String, String)> =
        sqlx::query_as("SELECT status, name FROM clusters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((current_status, name)) = current else {
        return Err(CoreError::ClusterNotFound { cluster_id: id });
    };

    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE clusters
        SET status = $1, status_message = $2, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status.as_str())
    .bind(message)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let change = if current_status != status.as_str() {
        let row = sqlx::query_as::<_, StatusChangeRow>(
            r#"
            INSERT INTO cluster_status_history (cluster_id, cluster_name, from_status, to_status, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, cluster_id, cluster_name, from_status, to_status, message, created_at
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(&current_status)
        .bind(status.as_str())
        .bind(message)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        Some(StatusChange::try_from(row)?)
    } else {
        None
    };

    tx.commit().await?;

    Ok(change)
}

/// Delete a cluster row, keeping its history.
pub async fn delete_cluster(pool: &PgPool, id: i64) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM clusters WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Status history of a cluster, oldest first.
pub async fn list_status_history(
    pool: &PgPool,
    cluster_id: i64,
) -> Result<Vec<StatusChange>, CoreError> {
    let rows = sqlx::query_as::<_, StatusChangeRow>(
        r#"
        SELECT id, cluster_id, cluster_name, from_status, to_status, message, created_at
        FROM cluster_status_history
        WHERE cluster_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(cluster_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(StatusChange::try_from).collect()
}

/// Check database health.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn insert_cluster(&self, cluster: &NewCluster) -> Result<ClusterRecord, CoreError> {
        insert_cluster(&self.pool, cluster).await
    }

    async fn get_cluster(&self, id: i64) -> Result<Option<ClusterRecord>, CoreError> {
        get_cluster(&self.pool, id).await
    }

    async fn get_cluster_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<ClusterRecord>, CoreError> {
        get_cluster_by_name(&self.pool, organization_id, name).await
    }

    async fn exists(&self, organization_id: i64, name: &str) -> Result<bool, CoreError> {
        exists(&self.pool, organization_id, name).await
    }

    async fn find_by_organization(
        &self,
        organization_id: i64,
    ) -> Result<Vec<ClusterRecord>, CoreError> {
        list_clusters(&self.pool, Some(organization_id), None).await
    }

    async fn list_clusters(
        &self,
        status: Option<ClusterStatus>,
    ) -> Result<Vec<ClusterRecord>, CoreError> {
        list_clusters(&self.pool, None, status).await
    }

    async fn save_cluster(&self, cluster: &ClusterRecord) -> Result<(), CoreError> {
        save_cluster(&self.pool, cluster).await
    }

    async fn update_status(
        &self,
        id: i64,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<Option<StatusChange>, CoreError> {
        update_status(&self.pool, id, status, message).await
    }

    async fn delete_cluster(&self, id: i64) -> Result<bool, CoreError> {
        delete_cluster(&self.pool, id).await
    }

    async fn list_status_history(&self, cluster_id: i64) -> Result<Vec<StatusChange>, CoreError> {
        list_status_history(&self.pool, cluster_id).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}
