// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process lifecycle events.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Topic of [`ClusterEvent::Created`].
pub const TOPIC_CLUSTER_CREATED: &str = "cluster_created";
/// Topic of [`ClusterEvent::Updated`].
pub const TOPIC_CLUSTER_UPDATED: &str = "cluster_updated";
/// Topic of [`ClusterEvent::Deleted`].
pub const TOPIC_CLUSTER_DELETED: &str = "cluster_deleted";

/// A finished lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// Creation (including post hooks) completed.
    #[serde(rename = "cluster_created")]
    Created {
        /// Cluster id.
        cluster_id: i64,
        /// Owning organization.
        organization_id: i64,
    },
    /// An update finished, successfully or not.
    #[serde(rename = "cluster_updated")]
    Updated {
        /// Cluster id.
        cluster_id: i64,
        /// Owning organization.
        organization_id: i64,
        /// Whether the update succeeded.
        success: bool,
    },
    /// The cluster was removed.
    #[serde(rename = "cluster_deleted")]
    Deleted {
        /// Cluster id.
        cluster_id: i64,
        /// Owning organization.
        organization_id: i64,
    },
}

impl ClusterEvent {
    /// Topic name.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Created { .. } => TOPIC_CLUSTER_CREATED,
            Self::Updated { .. } => TOPIC_CLUSTER_UPDATED,
            Self::Deleted { .. } => TOPIC_CLUSTER_DELETED,
        }
    }

    /// Cluster the event is about.
    pub fn cluster_id(&self) -> i64 {
        match self {
            Self::Created { cluster_id, .. }
            | Self::Updated { cluster_id, .. }
            | Self::Deleted { cluster_id, .. } => *cluster_id,
        }
    }
}

/// Broadcast bus. Slow subscribers lose old events and see
/// [`broadcast::error::RecvError::Lagged`].
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClusterEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Bus keeping up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: ClusterEvent) -> usize {
        trace!(topic = event.topic(), cluster_id = event.cluster_id(), "Publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to every future event.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }
}
