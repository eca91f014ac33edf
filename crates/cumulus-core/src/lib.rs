// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulus Core - cluster model and durable state
//!
//! This crate owns everything about a cluster that must survive a restart: the
//! cluster record, its lifecycle status, the append-only status history and the
//! persistence backends. Orchestration lives in `cumulus-manager`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    cumulus-manager                        │
//! │  (ClusterManager, providers, post hooks, TTL controller)  │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              │ Persistence trait
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  cumulus-core (this crate)                │
//! │   ClusterRecord · ClusterStatus · StatusChange · hooks    │
//! └──────────────────────────────────────────────────────────┘
//!                 │                            │
//!                 ▼                            ▼
//!        ┌────────────────┐          ┌──────────────────┐
//!        │     SQLite     │          │    PostgreSQL    │
//!        └────────────────┘          └──────────────────┘
//! ```
//!
//! # Cluster Status State Machine
//!
//! ```text
//!                ┌──────────┐
//!      ┌────────►│ CREATING │───────────────┐
//!      │         └────┬─────┘               │
//!      │ recover      │ provisioned         │ failure
//!      │              ▼                     ▼
//!      │     ┌─────────────────┐      ┌─────────┐
//!      │     │ RUNNING/WARNING │      │  ERROR  │──┐
//!      │     └──┬──────────┬───┘      └─────────┘  │
//!      │  update│          │delete         ▲       │ delete
//!      │        ▼          ▼               │       │
//!      │  ┌──────────┐ ┌──────────┐        │       │
//!      │  │ UPDATING │ │ DELETING │◄───────┼───────┘
//!      │  └──────────┘ └──────────┘        │
//!      └───────────────────────────────────┘
//! ```
//!
//! Any status may move to `ERROR`. A failed update lands in `WARNING`, and so
//! does a failed non-forced delete.
//!
//! ## Status Descriptions
//!
//! | Status | Description |
//! |--------|-------------|
//! | `CREATING` | Provisioning or post hooks in progress |
//! | `RUNNING` | Provisioned and healthy |
//! | `UPDATING` | Node pool or version change in progress |
//! | `DELETING` | Teardown in progress |
//! | `WARNING` | Usable, last operation reported a problem |
//! | `ERROR` | Creation failed or the cluster is unusable |
//!
//! # Status History
//!
//! Every status change appends a [`status::StatusChange`]. The first entry of each
//! cluster is `None -> CREATING`. History rows are never deleted, not even when the
//! cluster row is, so the effective start time used for TTL expiry
//! ([`status::cluster_start_time`]) is always derivable.
//!
//! # Modules
//!
//! - [`cluster`]: cluster record, node pools, provider payloads
//! - [`status`]: lifecycle status and status history
//! - [`hooks`]: post-hook descriptors persisted with the cluster
//! - [`persistence`]: persistence trait with SQLite and PostgreSQL backends
//! - [`migrations`]: embedded schema migrations
//! - [`error`]: error type with stable error codes

#![deny(missing_docs)]

/// Cluster record, node pools and provider payloads.
pub mod cluster;

/// Error types with stable error codes.
pub mod error;

/// Post-hook descriptors.
pub mod hooks;

/// Embedded database migrations.
pub mod migrations;

/// Persistence trait and backends.
pub mod persistence;

/// Cluster lifecycle status and status history.
pub mod status;

pub use cluster::{
    CloudProvider, ClusterFeature, ClusterFeatures, ClusterRecord, Distribution, NewCluster,
    NodePool, ProviderConfig, is_dns1123_label,
};
pub use error::{CoreError, Result};
pub use hooks::{
    LoggingParams, MonitoringParams, PostHookSpec, SecurityScanParams, ServiceMeshParams,
};
pub use persistence::{Persistence, PostgresPersistence, SqlitePersistence};
pub use status::{ClusterStatus, StatusChange, cluster_start_time};
