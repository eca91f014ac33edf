// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use crate::cluster::{ClusterRecord, NewCluster};
use crate::error::CoreError;
use crate::migrations;
use crate::status::{ClusterStatus, StatusChange};

use super::{
    CLUSTER_COLUMNS, ClusterRow, EncodedColumns, Persistence, StatusChangeRow, map_insert_error,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file when missing, then runs
    /// all migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/cumulus.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect to a SQLite URL (`sqlite::memory:`, `sqlite:path?mode=rwc`) and migrate.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        // In-memory databases are per connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn insert_cluster(&self, cluster: &NewCluster) -> Result<ClusterRecord, CoreError> {
        cluster.validate_payload()?;

        let columns = EncodedColumns::from_new(cluster)?;
        let uid = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO clusters (
                uid, organization_id, created_by, name, cloud, distribution, location,
                status, status_message, created_at, updated_at, ttl_minutes, features,
                secret_id, ssh_secret_id, config_secret_id, provider_config, node_pools,
                resource_ids, post_hooks
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
            VALUES (?, ?, NULL, ?, NULL, ?)
            "#,
        )
        .bind(id)
        .bind(&cluster.name)
        .bind(ClusterStatus::Creating.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_cluster(id)
            .await?
            .ok_or(CoreError::ClusterNotFound { cluster_id: id })
    }

    async fn get_cluster(&self, id: i64) -> Result<Option<ClusterRecord>, CoreError> {
        let sql = format!("SELECT {} FROM clusters WHERE id = ?", CLUSTER_COLUMNS);
        let row = sqlx::query_as::<_, ClusterRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ClusterRecord::try_from).transpose()
    }

    async fn get_cluster_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<ClusterRecord>, CoreError> {
        let sql = format!(
            "SELECT {} FROM clusters WHERE organization_id = ? AND name = ?",
            CLUSTER_COLUMNS
        );
        let row = sqlx::query_as::<_, ClusterRow>(&sql)
            .bind(organization_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ClusterRecord::try_from).transpose()
    }

    async fn exists(&self, organization_id: i64, name: &str) -> Result<bool, CoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM clusters WHERE organization_id = ? AND name = ?",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn find_by_organization(
        &self,
        organization_id: i64,
    ) -> Result<Vec<ClusterRecord>, CoreError> {
        let sql = format!(
            "SELECT {} FROM clusters WHERE organization_id = ? ORDER BY id",
            CLUSTER_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClusterRow>(&sql)
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ClusterRecord::try_from).collect()
    }

    async fn list_clusters(
        &self,
        status: Option<ClusterStatus>,
    ) -> Result<Vec<ClusterRecord>, CoreError> {
        let sql = format!(
            "SELECT {} FROM clusters WHERE (?1 IS NULL OR status = ?1) ORDER BY id",
            CLUSTER_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClusterRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ClusterRecord::try_from).collect()
    }

    async fn save_cluster(&self, cluster: &ClusterRecord) -> Result<(), CoreError> {
        cluster.validate_payload()?;
        let columns = EncodedColumns::from_record(cluster)?;

        let result = sqlx::query(
            r#"
            UPDATE clusters
            SET name = ?, location = ?, ttl_minutes = ?, features = ?, secret_id = ?,
                ssh_secret_id = ?, config_secret_id = ?, provider_config = ?,
                node_pools = ?, resource_ids = ?, post_hooks = ?, updated_at = ?
            WHERE id = ?
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
        .bind(Utc::now())
        .bind(cluster.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ClusterNotFound {
                cluster_id: cluster.id,
            });
        }

        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: ClusterStatus,
        message: Option<&str>,
    ) -> Result<Option<StatusChange>, CoreError> {
        let mut tx = self.pool.begin().await?;

        // Write before reading: a deferred transaction that reads first cannot
        // wait for the write lock and fails with SQLITE_BUSY under contention.
        let claimed = sqlx::query("UPDATE clusters SET updated_at = updated_at WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Err(CoreError::ClusterNotFound { cluster_id: id });
        }
        let now = Utc::now();

        let (current_status, name): (String, String) =
            sqlx::query_as("SELECT status, name FROM clusters WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            UPDATE clusters
            SET status = ?, status_message = ?, updated_at = ?
            WHERE id = ?
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
                VALUES (?, ?, ?, ?, ?, ?)
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

    async fn delete_cluster(&self, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_status_history(&self, cluster_id: i64) -> Result<Vec<StatusChange>, CoreError> {
        let rows = sqlx::query_as::<_, StatusChangeRow>(
            r#"
            SELECT id, cluster_id, cluster_name, from_status, to_status, message, created_at
            FROM cluster_status_history
            WHERE cluster_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusChange::try_from).collect()
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i64,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{CloudProvider, ClusterFeatures, Distribution, NodePool, ProviderConfig};
    use crate::hooks::PostHookSpec;

    /// Create an in-memory SQLite persistence for testing.
    async fn test_persistence() -> SqlitePersistence {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        SqlitePersistence::new(pool)
    }

    fn new_cluster(organization_id: i64, name: &str) -> NewCluster {
        NewCluster {
            organization_id,
            created_by: 7,
            name: name.to_string(),
            cloud: CloudProvider::Dummy,
            distribution: Distribution::Dummy,
            location: "local".to_string(),
            ttl_minutes: Some(60),
            features: ClusterFeatures::default(),
            secret_id: "cred-1".to_string(),
            ssh_secret_id: None,
            config_secret_id: None,
            provider: ProviderConfig::Dummy {
                kubernetes_version: Some("1.29".to_string()),
            },
            node_pools: vec![NodePool::new("pool1", "small", 2)],
            post_hooks: vec![PostHookSpec::InstallHelm],
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_cluster() {
        let persistence = test_persistence().await;

        let inserted = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .expect("Failed to insert cluster");

        assert!(inserted.id > 0);
        assert_eq!(inserted.uid.len(), 36);
        assert_eq!(inserted.status, ClusterStatus::Creating);
        assert_eq!(inserted.ttl_minutes, Some(60));
        assert_eq!(inserted.node_pools.len(), 1);
        assert_eq!(inserted.post_hooks, vec![PostHookSpec::InstallHelm]);

        let loaded = persistence
            .get_cluster(inserted.id)
            .await
            .expect("Failed to get cluster")
            .expect("Cluster should exist");
        assert_eq!(loaded, inserted);

        let by_name = persistence
            .get_cluster_by_name(1, "alpha")
            .await
            .expect("Query should succeed")
            .expect("Cluster should exist");
        assert_eq!(by_name.id, inserted.id);
    }

    #[tokio::test]
    async fn test_insert_writes_initial_history_entry() {
        let persistence = test_persistence().await;
        let cluster = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();

        let history = persistence.list_status_history(cluster.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, ClusterStatus::Creating);
        assert_eq!(history[0].cluster_name, "alpha");
    }

    #[tokio::test]
    async fn test_name_unique_within_organization() {
        let persistence = test_persistence().await;

        persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();

        let err = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CLUSTER_ALREADY_EXISTS");

        // Same name in another organization is fine.
        persistence
            .insert_cluster(&new_cluster(2, "alpha"))
            .await
            .expect("other organization may reuse the name");

        assert!(persistence.exists(1, "alpha").await.unwrap());
        assert!(!persistence.exists(3, "alpha").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_cluster_not_found() {
        let persistence = test_persistence().await;
        assert!(persistence.get_cluster(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_appends_history_only_on_change() {
        let persistence = test_persistence().await;
        let cluster = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();

        let change = persistence
            .update_status(cluster.id, ClusterStatus::Running, Some("ready"))
            .await
            .unwrap()
            .expect("status changed");
        assert_eq!(change.from_status, Some(ClusterStatus::Creating));
        assert_eq!(change.to_status, ClusterStatus::Running);
        assert_eq!(change.message.as_deref(), Some("ready"));

        let same = persistence
            .update_status(cluster.id, ClusterStatus::Running, Some("still ready"))
            .await
            .unwrap();
        assert!(same.is_none());

        let loaded = persistence.get_cluster(cluster.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ClusterStatus::Running);
        assert_eq!(loaded.status_message.as_deref(), Some("still ready"));

        let history = persistence.list_status_history(cluster.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].is_creation_completed());
    }

    #[tokio::test]
    async fn test_update_status_missing_cluster() {
        let persistence = test_persistence().await;
        let err = persistence
            .update_status(42, ClusterStatus::Error, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CLUSTER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_save_cluster_does_not_touch_status() {
        let persistence = test_persistence().await;
        let mut cluster = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();

        cluster.status = ClusterStatus::Running;
        cluster.resource_ids.insert("vpc".to_string(), "vpc-123".to_string());
        cluster.node_pools.push(NodePool::new("pool2", "large", 1));
        cluster.features.monitoring = true;
        cluster.config_secret_id = Some("kubeconfig-1".to_string());
        persistence.save_cluster(&cluster).await.unwrap();

        let loaded = persistence.get_cluster(cluster.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ClusterStatus::Creating);
        assert_eq!(loaded.resource_ids.get("vpc").map(String::as_str), Some("vpc-123"));
        assert_eq!(loaded.node_pools.len(), 2);
        assert!(loaded.features.monitoring);
        assert_eq!(loaded.config_secret_id.as_deref(), Some("kubeconfig-1"));
    }

    #[tokio::test]
    async fn test_history_survives_delete() {
        let persistence = test_persistence().await;
        let cluster = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();
        persistence
            .update_status(cluster.id, ClusterStatus::Running, None)
            .await
            .unwrap();

        assert!(persistence.delete_cluster(cluster.id).await.unwrap());
        assert!(!persistence.delete_cluster(cluster.id).await.unwrap());
        assert!(persistence.get_cluster(cluster.id).await.unwrap().is_none());

        let history = persistence.list_status_history(cluster.id).await.unwrap();
        assert_eq!(history.len(), 2);

        // The name is free again.
        persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .expect("name should be reusable after delete");
    }

    #[tokio::test]
    async fn test_list_and_find_clusters() {
        let persistence = test_persistence().await;
        let a = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();
        let b = persistence
            .insert_cluster(&new_cluster(1, "beta"))
            .await
            .unwrap();
        persistence
            .insert_cluster(&new_cluster(2, "gamma"))
            .await
            .unwrap();

        persistence
            .update_status(b.id, ClusterStatus::Running, None)
            .await
            .unwrap();

        let org1: Vec<_> = persistence
            .find_by_organization(1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(org1, vec![a.id, b.id]);

        assert_eq!(persistence.list_clusters(None).await.unwrap().len(), 3);
        let creating = persistence
            .list_clusters(Some(ClusterStatus::Creating))
            .await
            .unwrap();
        assert_eq!(creating.len(), 2);
        let running = persistence
            .list_clusters(Some(ClusterStatus::Running))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "beta");
    }

    #[tokio::test]
    async fn test_insert_rejects_mismatched_payload() {
        let persistence = test_persistence().await;
        let mut cluster = new_cluster(1, "alpha");
        cluster.provider = ProviderConfig::Eks {
            version: "1.29".to_string(),
        };

        let err = persistence.insert_cluster(&cluster).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!persistence.exists(1, "alpha").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_writers_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = SqlitePersistence::from_path(dir.path().join("cumulus.db"))
            .await
            .unwrap();
        let cluster = persistence
            .insert_cluster(&new_cluster(1, "alpha"))
            .await
            .unwrap();

        let id = cluster.id;
        let mut writers = tokio::task::JoinSet::new();
        for i in 0..16 {
            let persistence = persistence.clone();
            let status = if i % 2 == 0 {
                ClusterStatus::Running
            } else {
                ClusterStatus::Warning
            };
            writers.spawn(async move { persistence.update_status(id, status, None).await });
        }
        while let Some(result) = writers.join_next().await {
            result.unwrap().expect("status write must not fail under contention");
        }

        let stored = persistence.get_cluster(id).await.unwrap().unwrap();
        let history = persistence.list_status_history(id).await.unwrap();
        assert_eq!(history.last().unwrap().to_status, stored.status);
        for pair in history.windows(2) {
            assert_eq!(pair[1].from_status, Some(pair[0].to_status));
        }
    }

    #[tokio::test]
    async fn test_from_path_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cumulus.db");

        let persistence = SqlitePersistence::from_path(&path).await.unwrap();
        assert!(persistence.health_check_db().await.unwrap());
        assert!(path.exists());
    }
}
