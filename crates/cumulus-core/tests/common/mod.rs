// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for cumulus-core integration tests.

#![allow(dead_code)]

use cumulus_core::{
    CloudProvider, ClusterFeatures, Distribution, NewCluster, NodePool, PostgresPersistence,
    ProviderConfig,
};

/// Connect to the database named by TEST_CUMULUS_DATABASE_URL and migrate it.
///
/// Returns `None` when the variable is unset or the database is unreachable.
pub async fn postgres() -> Option<PostgresPersistence> {
    let database_url = std::env::var("TEST_CUMULUS_DATABASE_URL").ok()?;
    PostgresPersistence::connect(&database_url, 2).await.ok()
}

/// Unique organization id so parallel test runs never collide on names.
pub fn unique_org() -> i64 {
    let uuid = uuid::Uuid::new_v4();
    (uuid.as_u128() as i64).abs() % 1_000_000_000 + 1
}

/// Minimal dummy cluster payload.
pub fn dummy_cluster(organization_id: i64, name: &str) -> NewCluster {
    NewCluster {
        organization_id,
        created_by: 1,
        name: name.to_string(),
        cloud: CloudProvider::Dummy,
        distribution: Distribution::Dummy,
        location: "local".to_string(),
        ttl_minutes: None,
        features: ClusterFeatures::default(),
        secret_id: "cred".to_string(),
        ssh_secret_id: None,
        config_secret_id: None,
        provider: ProviderConfig::Dummy {
            kubernetes_version: None,
        },
        node_pools: vec![NodePool::new("pool1", "small", 1)],
        post_hooks: Vec::new(),
    }
}

/// Helper macro to skip tests if TEST_CUMULUS_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_CUMULUS_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_CUMULUS_DATABASE_URL not set");
            return;
        }
    };
}
