// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Files kept on the manager host.
//!
//! ```text
//! <data_dir>/
//! ├── <organization_id>/<cluster_name>/certs/{ca.crt,client.crt,client.key}
//! └── monitoring/targets/<cluster_uid>.yaml
//! ```
//!
//! Monitoring targets use the Prometheus file service discovery layout, so a
//! global Prometheus can pick up new clusters without a reload.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use cumulus_core::ClusterRecord;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::kubeconfig::KubeCredentials;

#[derive(Debug, Serialize)]
struct TargetGroup {
    targets: Vec<String>,
    labels: BTreeMap<String, String>,
}

/// Per-cluster files under the data directory.
#[derive(Debug, Clone)]
pub struct LocalState {
    data_dir: PathBuf,
}

impl LocalState {
    /// State rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory of one cluster.
    ///
    /// `name` must be a single plain path component, so the directory always
    /// sits below the data directory.
    pub fn cluster_dir(&self, organization_id: i64, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {
                Ok(self.data_dir.join(organization_id.to_string()).join(name))
            }
            _ => Err(Error::InvalidRequest(format!(
                "cluster name '{}' cannot be used as a directory name",
                name
            ))),
        }
    }

    /// Certificates of one cluster.
    pub fn certs_dir(&self, organization_id: i64, name: &str) -> Result<PathBuf> {
        Ok(self.cluster_dir(organization_id, name)?.join("certs"))
    }

    /// Monitoring target file of one cluster.
    pub fn monitoring_target_path(&self, cluster_uid: &str) -> PathBuf {
        self.data_dir
            .join("monitoring")
            .join("targets")
            .join(format!("{}.yaml", cluster_uid))
    }

    /// Write the CA bundle and client credentials that are present. Returns the
    /// written paths.
    pub async fn write_certs(
        &self,
        organization_id: i64,
        name: &str,
        credentials: &KubeCredentials,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.certs_dir(organization_id, name)?;
        tokio::fs::create_dir_all(&dir).await?;

        let files = [
            ("ca.crt", credentials.ca_pem.as_deref()),
            ("client.crt", credentials.client_cert_pem.as_deref()),
            ("client.key", credentials.client_key_pem.as_deref()),
        ];

        let mut written = Vec::new();
        for (file, content) in files {
            let Some(content) = content else { continue };
            let path = dir.join(file);
            tokio::fs::write(&path, content).await?;
            written.push(path);
        }
        debug!(dir = %dir.display(), count = written.len(), "Cluster certificates written");
        Ok(written)
    }

    /// Register the cluster API server as a monitoring target.
    pub async fn write_monitoring_target(
        &self,
        cluster: &ClusterRecord,
        server: &str,
    ) -> Result<PathBuf> {
        let host = server
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        let groups = vec![TargetGroup {
            targets: vec![host],
            labels: BTreeMap::from([
                ("cluster".to_string(), cluster.name.clone()),
                ("cluster_uid".to_string(), cluster.uid.clone()),
                ("organization".to_string(), cluster.organization_id.to_string()),
                ("cloud".to_string(), cluster.cloud.to_string()),
                ("distribution".to_string(), cluster.distribution.to_string()),
            ]),
        }];

        let path = self.monitoring_target_path(&cluster.uid);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_yaml::to_string(&groups)?).await?;
        Ok(path)
    }

    /// Remove the monitoring target. Missing files are fine.
    pub async fn remove_monitoring_target(&self, cluster_uid: &str) -> Result<()> {
        match tokio::fs::remove_file(self.monitoring_target_path(cluster_uid)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Remove the cluster directory. Missing directories are fine.
    pub async fn remove_cluster_dir(&self, organization_id: i64, name: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.cluster_dir(organization_id, name)?).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
