// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulus Manager - Kubernetes Cluster Lifecycle Control Plane
//!
//! This crate provisions, updates and tears down Kubernetes clusters across
//! cloud providers behind one lifecycle API. Cluster records and their status
//! history live in `cumulus-core`; this crate holds the orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Embedding application                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ClusterManager (This Crate)                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Creators / │  │  Post hook  │  │ Supervisor  │  │     TTL     │     │
//! │  │  Updaters   │  │  pipeline   │  │ (bounded)   │  │ controller  │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │                              │
//!           ▼                 ▼                              ▼
//! ┌───────────────────┐ ┌─────────────────────────┐ ┌─────────────────────┐
//! │  CommonCluster    │ │ Secrets, Kubernetes,    │ │  cumulus-core       │
//! │  (per provider)   │ │ Helm, DNS collaborators │ │  (SQLite/Postgres)  │
//! │  -> CloudClient   │ └─────────────────────────┘ └─────────────────────┘
//! └───────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Synchronous part | Background part |
//! |-----------|------------------|-----------------|
//! | Create | name check, secret type, provider pre-flight, insert `CREATING` | SSH key, provisioning, post hooks, `RUNNING` |
//! | Update | status check, defaults, no-op check, `UPDATING` | node pool delta, version upgrade, `RUNNING`/`WARNING` |
//! | Delete | status check, `DELETING` | workloads, infrastructure, secrets, DNS, record, local files |
//!
//! Background failures are recorded as cluster status and reported to the
//! [`supervisor::ErrorHandler`]; they never reach the caller.
//!
//! # Cluster Status State Machine
//!
//! ```text
//!                 ┌──────────┐
//!        ┌───────►│ CREATING │◄──────────┐ recovery
//!        │        └────┬─────┘           │
//!        │             │ provisioned     │
//!        │             ▼                 │
//!        │   ┌───────────────────┐  ┌─────────┐
//!        │   │ RUNNING / WARNING │  │  ERROR  │
//!        │   └──┬─────────────┬──┘  └────┬────┘
//!        │      │ update      │ delete   │ delete
//!        │      ▼             ▼          ▼
//!        │ ┌──────────┐   ┌──────────────────┐
//!        │ │ UPDATING │   │     DELETING     │
//!        │ └──────────┘   └──────────────────┘
//! ```
//!
//! A failed non-forced delete lands in `WARNING`, or back in `ERROR` when the
//! cluster started there.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CUMULUS_DATABASE_URL` | Yes | - | `sqlite:` or `postgres://` URL |
//! | `CUMULUS_DATA_DIR` | No | `.data` | Certificates and monitoring targets |
//! | `CUMULUS_TTL_REQUEUE_SECS` | No | `300` | TTL re-evaluation delay |
//! | `CUMULUS_RECOVER_ON_START` | No | `true` | Resume creations left in `CREATING` |
//! | `CUMULUS_MAX_CONCURRENT_OPERATIONS` | No | `32` | Background operation bound |
//! | `CUMULUS_HELM_RETRY_ATTEMPTS` | No | `30` | Helm readiness attempts |
//! | `CUMULUS_HELM_RETRY_INTERVAL_SECS` | No | `10` | Helm readiness interval |
//! | `CUMULUS_HOOK_NAMESPACE` | No | `cumulus-system` | Add-on namespace |

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for manager operations.
pub mod error;

/// Collaborator interfaces: secrets, Kubernetes, deployments, DNS.
pub mod external;

/// Kubeconfig documents.
pub mod kubeconfig;

/// Cluster abstraction, provider variants and the cloud client seam.
pub mod provider;

/// Lifecycle request types.
pub mod request;

/// Cluster creators.
pub mod creator;

/// Cluster updaters.
pub mod updater;

/// Post-creation hook pipeline.
pub mod posthook;

/// Per-cluster files on the manager host.
pub mod local_state;

/// Retry with exponential backoff.
pub mod retry;

/// In-process lifecycle events.
pub mod events;

/// Supervised background operations and per-cluster single flight.
pub mod supervisor;

/// Cluster lifecycle orchestration.
pub mod manager;

/// Deduplicating work queue.
pub mod workqueue;

/// TTL controller.
pub mod ttl;

/// Embeddable runtime.
pub mod runtime;

pub use error::{Error, Result};
pub use manager::ClusterManager;
pub use provider::{ClusterFactory, CommonCluster};
