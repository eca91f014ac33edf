// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TTL controller.
//!
//! Deletes clusters whose time to live has passed. A cluster's life starts at
//! its first `CREATING -> RUNNING|WARNING` transition; clusters that never got
//! there never expire.
//!
//! The controller keeps cluster ids in a [`WorkQueue`] fed by a full listing at
//! start and by creation and update events afterwards. One worker evaluates ids
//! one at a time:
//!
//! - expired: non-forced delete through the [`ClusterManager`];
//! - not yet expired: evaluated again after the requeue interval;
//! - no TTL, not `RUNNING`/`WARNING`, or no start time: dropped until the next event;
//! - evaluation error: retried with per-id backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cumulus_core::{StatusChange, cluster_start_time};
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::ClusterEvent;
use crate::manager::ClusterManager;
use crate::workqueue::WorkQueue;

/// Whether a cluster with this history and TTL has outlived its TTL at `now`.
pub fn is_cluster_end_of_life(
    history: &[StatusChange],
    ttl_minutes: i64,
    now: DateTime<Utc>,
) -> bool {
    if ttl_minutes <= 0 {
        return false;
    }
    match cluster_start_time(history) {
        Some(start) => now > start + chrono::Duration::minutes(ttl_minutes),
        None => false,
    }
}

/// What one evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlOutcome {
    /// The cluster no longer exists.
    Missing,
    /// No TTL, or a status that is not evaluated.
    Skipped,
    /// The cluster never finished provisioning.
    NoStartTime,
    /// Still alive; check again later.
    Requeue,
    /// Deletion was started.
    Expired,
}

/// Watches cluster TTLs.
#[derive(Clone)]
pub struct TtlController {
    manager: ClusterManager,
    queue: WorkQueue<i64>,
    requeue_interval: Duration,
}

impl TtlController {
    /// Controller re-evaluating live clusters every `requeue_interval`.
    pub fn new(manager: ClusterManager, requeue_interval: Duration) -> Self {
        Self {
            manager,
            queue: WorkQueue::new(),
            requeue_interval,
        }
    }

    /// The queue of cluster ids waiting for evaluation.
    pub fn queue(&self) -> &WorkQueue<i64> {
        &self.queue
    }

    /// Enqueue every cluster, then start the event listener and the worker.
    pub async fn start(self) -> Result<TtlControllerHandle> {
        // Subscribe before listing so no creation slips between the two.
        let mut events = self.manager.events().subscribe();
        self.resync().await?;

        let shutdown = Arc::new(Notify::new());

        let listener = {
            let controller = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        received = events.recv() => match received {
                            Ok(ClusterEvent::Created { cluster_id, .. })
                            | Ok(ClusterEvent::Updated { cluster_id, .. }) => {
                                controller.queue.add(cluster_id);
                            }
                            Ok(ClusterEvent::Deleted { cluster_id, .. }) => {
                                controller.queue.forget(&cluster_id);
                            }
                            Err(RecvError::Lagged(missed)) => {
                                warn!(missed, "TTL controller lagged behind events, resyncing");
                                if let Err(e) = controller.resync().await {
                                    error!(error = %e, "TTL resync failed");
                                }
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
                debug!("TTL event listener stopped");
            })
        };

        let queue = self.queue.clone();
        let worker = tokio::spawn(async move { self.run().await });

        info!("TTL controller started");
        Ok(TtlControllerHandle {
            queue,
            shutdown,
            listener,
            worker,
        })
    }

    async fn resync(&self) -> Result<()> {
        let clusters = self
            .manager
            .factory()
            .persistence()
            .list_clusters(None)
            .await?;
        debug!(count = clusters.len(), "Enqueueing clusters for TTL evaluation");
        for cluster in clusters {
            self.queue.add(cluster.id);
        }
        Ok(())
    }

    async fn run(self) {
        while let Some(cluster_id) = self.queue.get().await {
            match self.process(cluster_id, Utc::now()).await {
                Ok(outcome) => {
                    self.queue.forget(&cluster_id);
                    if outcome == TtlOutcome::Requeue {
                        self.queue.add_after(cluster_id, self.requeue_interval);
                    }
                }
                Err(e) => {
                    warn!(cluster_id, error = %e, "TTL evaluation failed, retrying");
                    self.queue.add_rate_limited(cluster_id);
                }
            }
            self.queue.done(&cluster_id);
        }
        debug!("TTL worker stopped");
    }

    /// Evaluate one cluster as of `now`.
    pub async fn process(&self, cluster_id: i64, now: DateTime<Utc>) -> Result<TtlOutcome> {
        let persistence = self.manager.factory().persistence();
        let Some(record) = persistence.get_cluster(cluster_id).await? else {
            return Ok(TtlOutcome::Missing);
        };

        let ttl_minutes = match record.ttl_minutes {
            Some(ttl) if ttl > 0 => ttl,
            _ => return Ok(TtlOutcome::Skipped),
        };
        if !record.status.is_operable() {
            debug!(cluster_id, status = %record.status, "Cluster not evaluated for TTL");
            return Ok(TtlOutcome::Skipped);
        }

        let history = self.manager.get_status_history(cluster_id).await?;
        if cluster_start_time(&history).is_none() {
            return Ok(TtlOutcome::NoStartTime);
        }
        if !is_cluster_end_of_life(&history, ttl_minutes, now) {
            return Ok(TtlOutcome::Requeue);
        }

        info!(cluster_id, ttl_minutes, "Cluster TTL expired, deleting");
        let cluster = self.manager.factory().from_record(record)?;
        self.manager.delete_cluster(cluster, false).await?;
        Ok(TtlOutcome::Expired)
    }
}

/// A running [`TtlController`].
pub struct TtlControllerHandle {
    queue: WorkQueue<i64>,
    shutdown: Arc<Notify>,
    listener: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl TtlControllerHandle {
    /// The controller's queue.
    pub fn queue(&self) -> &WorkQueue<i64> {
        &self.queue
    }

    /// Stop the listener and the worker and wait for both.
    pub async fn shutdown(self) {
        self.queue.shutdown();
        self.shutdown.notify_one();

        if let Err(e) = self.listener.await {
            error!("TTL event listener panicked: {}", e);
        }
        if let Err(e) = self.worker.await {
            error!("TTL worker panicked: {}", e);
        }
        info!("TTL controller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cumulus_core::ClusterStatus;

    fn change(
        from: Option<ClusterStatus>,
        to: ClusterStatus,
        at: DateTime<Utc>,
    ) -> StatusChange {
        StatusChange {
            id: 0,
            cluster_id: 1,
            cluster_name: "c1".to_string(),
            from_status: from,
            to_status: to,
            message: None,
            created_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    #[test]
    fn test_expires_after_ttl_from_start() {
        let history = vec![
            change(None, ClusterStatus::Creating, t0()),
            change(
                Some(ClusterStatus::Creating),
                ClusterStatus::Running,
                t0() + minutes(15),
            ),
        ];

        assert!(is_cluster_end_of_life(&history, 30, t0() + minutes(50)));
        assert!(!is_cluster_end_of_life(&history, 30, t0() + minutes(45)));
        assert!(!is_cluster_end_of_life(&history, 30, t0() + minutes(40)));
    }

    #[test]
    fn test_never_started_cluster_never_expires() {
        let history = vec![
            change(None, ClusterStatus::Creating, t0()),
            change(Some(ClusterStatus::Creating), ClusterStatus::Error, t0()),
        ];
        assert!(!is_cluster_end_of_life(&history, 1, t0() + minutes(10_000)));
    }

    #[test]
    fn test_non_positive_ttl_never_expires() {
        let history = vec![change(
            Some(ClusterStatus::Creating),
            ClusterStatus::Running,
            t0(),
        )];
        assert!(!is_cluster_end_of_life(&history, 0, t0() + minutes(60)));
        assert!(!is_cluster_end_of_life(&history, -5, t0() + minutes(60)));
    }

    #[test]
    fn test_end_of_life_is_monotonic_in_time() {
        let history = vec![change(
            Some(ClusterStatus::Creating),
            ClusterStatus::Warning,
            t0(),
        )];
        let mut expired = false;
        for m in 0..120 {
            let now = is_cluster_end_of_life(&history, 60, t0() + minutes(m));
            assert!(!expired || now, "expiry flipped back at minute {}", m);
            expired = now;
        }
        assert!(expired);
    }
}
