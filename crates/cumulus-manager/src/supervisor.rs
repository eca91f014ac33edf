// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervised background operations.
//!
//! Every asynchronous lifecycle unit runs through [`Supervisor::spawn`]:
//!
//! - a semaphore bounds how many units run at once;
//! - a `JoinSet` tracks them so shutdown can drain them;
//! - a panic inside a unit is caught and reported, never lost.
//!
//! [`InFlight`] hands out [`OperationGuard`]s that keep a second operation off a
//! cluster while one is running.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Sink for failures of background operations.
pub trait ErrorHandler: Send + Sync {
    /// Called once per failed operation.
    fn handle(&self, operation: &'static str, cluster_id: i64, error: &Error);
}

/// [`ErrorHandler`] that logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, operation: &'static str, cluster_id: i64, error: &Error) {
        error!(operation, cluster_id, error = %error, "Background operation failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `fut`, turning a panic into [`Error::Panicked`].
pub async fn catch_panic<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Bounded, tracked, panic-safe task pool.
pub struct Supervisor {
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Supervisor {
    /// Pool running at most `max_concurrent` operations.
    pub fn new(max_concurrent: usize, error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            error_handler,
        }
    }

    /// Start an operation. Failures and panics go to the error handler.
    pub fn spawn<F>(&self, operation: &'static str, cluster_id: i64, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let handler = Arc::clone(&self.error_handler);

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished tasks so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                warn!(operation, cluster_id, "Supervisor closed, dropping operation");
                return;
            };
            if let Err(e) = catch_panic(fut).await {
                handler.handle(operation, cluster_id, &e);
            }
        });
    }

    /// Number of operations not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no operation is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every operation, including ones spawned while waiting, finished.
    pub async fn wait_all(&self) {
        loop {
            let mut drained = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if drained.is_empty() {
                return;
            }
            while let Some(joined) = drained.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Supervised task aborted");
                }
            }
        }
    }

    /// Stop accepting new work and abort what is still running.
    pub async fn shutdown(&self) {
        self.semaphore.close();
        let mut tasks = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        tasks.shutdown().await;
    }
}

/// Keys with an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` when it is already claimed.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<OperationGuard> {
        let key = key.into();
        let inserted = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| OperationGuard {
            key,
            keys: Arc::clone(&self.keys),
        })
    }

    /// Whether `key` is claimed.
    pub fn is_busy(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Key of a cluster operation.
    pub fn cluster_key(cluster_id: i64) -> String {
        format!("cluster:{}", cluster_id)
    }

    /// Key of a creation, before the cluster has an id.
    pub fn name_key(organization_id: i64, name: &str) -> String {
        format!("name:{}/{}", organization_id, name)
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct OperationGuard {
    key: String,
    keys: Arc<Mutex<HashSet<String>>>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        errors: Mutex<Vec<(&'static str, i64, String)>>,
    }

    impl ErrorHandler for Recording {
        fn handle(&self, operation: &'static str, cluster_id: i64, error: &Error) {
            self.errors
                .lock()
                .unwrap()
                .push((operation, cluster_id, error.to_string()));
        }
    }

    #[tokio::test]
    async fn test_panics_are_reported() {
        let handler = Arc::new(Recording::default());
        let supervisor = Supervisor::new(4, handler.clone());

        supervisor.spawn("explode", 7, async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        supervisor.spawn("fail", 8, async { Err(Error::Other("nope".to_string())) });
        supervisor.spawn("ok", 9, async { Ok(()) });
        supervisor.wait_all().await;

        let mut errors = handler.errors.lock().unwrap().clone();
        errors.sort();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, "explode");
        assert!(errors[0].2.contains("kaboom"));
        assert_eq!(errors[1], ("fail", 8, "nope".to_string()));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let supervisor = Supervisor::new(2, Arc::new(LoggingErrorHandler));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for id in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            supervisor.spawn("work", id, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        supervisor.wait_all().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let in_flight = InFlight::new();
        let key = InFlight::cluster_key(1);

        let guard = in_flight.try_acquire(key.clone()).unwrap();
        assert!(in_flight.is_busy(&key));
        assert!(in_flight.try_acquire(key.clone()).is_none());

        drop(guard);
        assert!(!in_flight.is_busy(&key));
        assert!(in_flight.try_acquire(key).is_some());
    }
}
