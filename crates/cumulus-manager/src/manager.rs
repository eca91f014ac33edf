// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster lifecycle orchestration.
//!
//! [`ClusterManager`] validates requests synchronously, makes the cluster record
//! durable, then hands the slow part (provisioning, post hooks, teardown) to the
//! [`Supervisor`]. Failures of that background part never reach the caller: they
//! end up in the cluster status and in the injected [`ErrorHandler`].

use std::future::Future;
use std::sync::Arc;

use cumulus_core::{ClusterStatus, Persistence, StatusChange};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::creator::{ClusterCreator, RecoveryClusterCreator};
use crate::error::{Error, Result};
use crate::events::{ClusterEvent, EventBus};
use crate::external::{Collaborators, WorkloadKind};
use crate::local_state::LocalState;
use crate::posthook::{HookConfig, PostHookRunner};
use crate::provider::{ClusterFactory, CommonCluster};
use crate::request::{CreationContext, UpdateContext};
use crate::supervisor::{ErrorHandler, InFlight, OperationGuard, Supervisor, catch_panic};
use crate::updater::ClusterUpdater;

/// Entry point of every lifecycle operation.
#[derive(Clone)]
pub struct ClusterManager {
    factory: ClusterFactory,
    collaborators: Collaborators,
    local: LocalState,
    hooks: PostHookRunner,
    events: EventBus,
    supervisor: Arc<Supervisor>,
    in_flight: InFlight,
}

impl ClusterManager {
    /// Build a manager. `collaborators.secrets` should be the store the factory
    /// was built with.
    pub fn new(
        factory: ClusterFactory,
        collaborators: Collaborators,
        config: &Config,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        let local = LocalState::new(&config.data_dir);
        let hooks = PostHookRunner::new(
            collaborators.clone(),
            local.clone(),
            HookConfig::from_config(config),
        );
        Self {
            factory,
            collaborators,
            local,
            hooks,
            events: EventBus::default(),
            supervisor: Arc::new(Supervisor::new(
                config.max_concurrent_operations,
                error_handler,
            )),
            in_flight: InFlight::new(),
        }
    }

    /// Replace the post hook configuration.
    pub fn with_hook_config(mut self, config: HookConfig) -> Self {
        self.hooks = PostHookRunner::new(self.collaborators.clone(), self.local.clone(), config);
        self
    }

    /// Lifecycle events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The factory used to build handles.
    pub fn factory(&self) -> &ClusterFactory {
        &self.factory
    }

    /// Local per-cluster files.
    pub fn local_state(&self) -> &LocalState {
        &self.local
    }

    fn persistence(&self) -> &Arc<dyn Persistence> {
        self.factory.persistence()
    }

    /// Whether an operation on the cluster is running.
    pub fn is_busy(&self, cluster_id: i64) -> bool {
        self.in_flight.is_busy(&InFlight::cluster_key(cluster_id))
    }

    /// Create a cluster.
    ///
    /// Returns once the record exists in `CREATING`. Provisioning, SSH key
    /// generation and post hooks continue in the background; the cluster ends up
    /// `RUNNING` or `ERROR`.
    #[instrument(skip_all, fields(organization_id = context.organization_id, name = %context.request.name))]
    pub async fn create_cluster(
        &self,
        context: CreationContext,
        creator: Arc<dyn ClusterCreator>,
    ) -> Result<Arc<dyn CommonCluster>> {
        let organization_id = context.organization_id;
        let request = &context.request;
        let already_exists = || Error::AlreadyExists {
            organization_id,
            name: request.name.clone(),
        };

        let _name_guard = self
            .in_flight
            .try_acquire(InFlight::name_key(organization_id, &request.name))
            .ok_or_else(already_exists)?;

        if self
            .persistence()
            .exists(organization_id, &request.name)
            .await?
        {
            return Err(already_exists());
        }

        self.collaborators
            .secrets
            .validate_secret_type(organization_id, &request.secret_id, request.cloud)
            .await
            .map_err(|e| match e {
                Error::Secret(message) => Error::InvalidRequest(message),
                other => other,
            })?;

        creator.validate().await?;
        let cluster = creator.prepare().await?;
        let guard = self
            .in_flight
            .try_acquire(InFlight::cluster_key(cluster.id()))
            .ok_or_else(|| {
                Error::PreconditionFailed(format!(
                    "an operation on cluster {} is already running",
                    cluster.id()
                ))
            })?;

        info!(cluster_id = cluster.id(), "Cluster creation started");
        self.spawn_creation(creator, guard);
        Ok(cluster)
    }

    /// Re-drive an interrupted creation. Name and secret checks are skipped, the
    /// cluster only has to be `CREATING` or `ERROR`.
    #[instrument(skip_all, fields(cluster_id = cluster.id()))]
    pub async fn recover_cluster(
        &self,
        cluster: Arc<dyn CommonCluster>,
    ) -> Result<Arc<dyn CommonCluster>> {
        let guard = self
            .in_flight
            .try_acquire(InFlight::cluster_key(cluster.id()))
            .ok_or_else(|| {
                Error::PreconditionFailed(format!(
                    "an operation on cluster {} is already running",
                    cluster.id()
                ))
            })?;

        let creator: Arc<dyn ClusterCreator> = Arc::new(RecoveryClusterCreator::new(cluster));
        creator.validate().await?;
        let cluster = creator.prepare().await?;

        info!("Cluster recovery started");
        self.spawn_creation(creator, guard);
        Ok(cluster)
    }

    fn spawn_creation(&self, creator: Arc<dyn ClusterCreator>, guard: OperationGuard) {
        let manager = self.clone();
        let cluster = creator.cluster();
        let cluster_id = cluster.id();

        self.supervisor.spawn("create_cluster", cluster_id, async move {
            let _guard = guard;
            let result = catch_panic(manager.run_creation(creator.as_ref())).await;
            if let Err(e) = &result
                && let Err(status_err) = cluster
                    .set_status(ClusterStatus::Error, Some(&e.to_string()))
                    .await
            {
                error!(cluster_id, error = %status_err, "Failed to mark cluster as failed");
            }
            result
        });
    }

    async fn run_creation(&self, creator: &dyn ClusterCreator) -> Result<()> {
        let cluster = creator.cluster();

        if cluster.requires_ssh_public_key() && cluster.model().ssh_secret_id.is_none() {
            let secret_id = self
                .collaborators
                .secrets
                .generate_ssh_key_pair(cluster.organization_id(), &cluster.uid())
                .await?;
            cluster.set_ssh_secret_id(&secret_id).await?;
            debug!(cluster_id = cluster.id(), "SSH key pair generated");
        }

        creator.create().await?;
        self.hooks.run(&cluster).await?;
        cluster.set_status(ClusterStatus::Running, None).await?;

        info!(cluster_id = cluster.id(), "Cluster created");
        self.events.publish(ClusterEvent::Created {
            cluster_id: cluster.id(),
            organization_id: cluster.organization_id(),
        });
        Ok(())
    }

    /// Update a cluster.
    ///
    /// Returns once the cluster is `UPDATING`. The cluster ends up `RUNNING`, or
    /// `WARNING` with the failure as message; both publish an update event.
    #[instrument(skip_all, fields(organization_id = context.organization_id, cluster_id = updater.cluster().id()))]
    pub async fn update_cluster(
        &self,
        context: UpdateContext,
        updater: Arc<dyn ClusterUpdater>,
    ) -> Result<()> {
        let cluster = updater.cluster();
        if cluster.organization_id() != context.organization_id {
            return Err(Error::NotFound(cluster.id().to_string()));
        }

        let guard = self
            .in_flight
            .try_acquire(InFlight::cluster_key(cluster.id()))
            .ok_or_else(|| {
                Error::PreconditionFailed(format!(
                    "an operation on cluster {} is already running",
                    cluster.id()
                ))
            })?;

        updater.validate().await?;
        updater.prepare().await?;
        info!(user_id = context.user_id, "Cluster update started");

        let events = self.events.clone();
        let cluster_id = cluster.id();
        self.supervisor.spawn("update_cluster", cluster_id, async move {
            let _guard = guard;
            let result = catch_panic(updater.update()).await;

            let status = match &result {
                Ok(()) => cluster.set_status(ClusterStatus::Running, None).await,
                Err(e) => {
                    cluster
                        .set_status(ClusterStatus::Warning, Some(&e.to_string()))
                        .await
                }
            };
            if let Err(e) = status {
                error!(cluster_id, error = %e, "Failed to record update outcome");
            }

            events.publish(ClusterEvent::Updated {
                cluster_id,
                organization_id: cluster.organization_id(),
                success: result.is_ok(),
            });
            result
        });
        Ok(())
    }

    /// Delete a cluster.
    ///
    /// Without `force` the cluster must be `RUNNING`, `WARNING` or `ERROR` with
    /// nothing else running on it. The first failing step leaves it in
    /// `WARNING`, or back in `ERROR` when that is where it started. With
    /// `force` every step runs regardless and the record is always removed.
    #[instrument(skip_all, fields(cluster_id = cluster.id(), force))]
    pub async fn delete_cluster(&self, cluster: Arc<dyn CommonCluster>, force: bool) -> Result<()> {
        let cluster_id = cluster.id();
        let guard = match self.in_flight.try_acquire(InFlight::cluster_key(cluster_id)) {
            Some(guard) => Some(guard),
            None if force => {
                warn!("Forcing deletion while another operation is running");
                None
            }
            None => {
                return Err(Error::PreconditionFailed(format!(
                    "an operation on cluster {} is already running",
                    cluster_id
                )));
            }
        };

        let status = cluster.status();
        if force {
            cluster
                .base()
                .force_status(ClusterStatus::Deleting, Some("Forced deletion"))
                .await?;
        } else {
            if !status.is_deletable() {
                return Err(Error::PreconditionFailed(format!(
                    "cluster {} is {} and cannot be deleted",
                    cluster_id, status
                )));
            }
            cluster.set_status(ClusterStatus::Deleting, None).await?;
        }

        // A cluster that never became operable must not turn operable because
        // its deletion failed.
        let failed_status = match status {
            ClusterStatus::Error => ClusterStatus::Error,
            _ => ClusterStatus::Warning,
        };

        info!("Cluster deletion started");
        let manager = self.clone();
        self.supervisor.spawn("delete_cluster", cluster_id, async move {
            let _guard = guard;
            let result = catch_panic(manager.run_deletion(&cluster, force)).await;
            if !force
                && let Err(e) = &result
                && let Err(status_err) = cluster
                    .set_status(failed_status, Some(&e.to_string()))
                    .await
            {
                error!(cluster_id, error = %status_err, "Failed to record deletion failure");
            }
            result
        });
        Ok(())
    }

    async fn run_deletion(&self, cluster: &Arc<dyn CommonCluster>, force: bool) -> Result<()> {
        let record = cluster.model();
        let cluster_id = record.id;

        step(force, cluster_id, "delete_workloads", self.delete_workloads(cluster)).await?;
        step(force, cluster_id, "delete_infrastructure", async {
            cluster.delete_cluster().await.map_err(Error::from)
        })
        .await?;
        step(
            force,
            cluster_id,
            "delete_secrets",
            self.collaborators
                .secrets
                .delete_cluster_secrets(record.organization_id, &record.uid),
        )
        .await?;
        step(
            force,
            cluster_id,
            "unregister_domain",
            self.collaborators.dns.unregister_domain(&record),
        )
        .await?;
        step(
            force,
            cluster_id,
            "remove_monitoring_target",
            self.local.remove_monitoring_target(&record.uid),
        )
        .await?;
        step(force, cluster_id, "delete_record", async {
            let deleted = self.persistence().delete_cluster(cluster_id).await?;
            if !deleted {
                debug!(cluster_id, "Cluster record was already gone");
            }
            Ok::<(), Error>(())
        })
        .await?;
        step(
            force,
            cluster_id,
            "remove_local_state",
            self.local
                .remove_cluster_dir(record.organization_id, &record.name),
        )
        .await?;

        info!(cluster_id, "Cluster deleted");
        self.events.publish(ClusterEvent::Deleted {
            cluster_id,
            organization_id: record.organization_id,
        });
        Ok(())
    }

    async fn delete_workloads(&self, cluster: &Arc<dyn CommonCluster>) -> Result<()> {
        let kubeconfig = cluster.get_k8s_config().await?;
        let client = self.collaborators.kube.client(&kubeconfig).await?;

        for namespace in client.list_namespaces().await? {
            for kind in WorkloadKind::ALL {
                let removed = client.delete_workloads(kind, &namespace).await?;
                if removed > 0 {
                    debug!(cluster_id = cluster.id(), %namespace, %kind, removed, "Workloads deleted");
                }
            }
        }
        Ok(())
    }

    /// Clusters of an organization.
    pub async fn get_clusters(&self, organization_id: i64) -> Result<Vec<Arc<dyn CommonCluster>>> {
        self.persistence()
            .find_by_organization(organization_id)
            .await?
            .into_iter()
            .map(|record| self.factory.from_record(record).map_err(Error::from))
            .collect()
    }

    /// One cluster of an organization.
    pub async fn get_cluster(
        &self,
        organization_id: i64,
        cluster_id: i64,
    ) -> Result<Arc<dyn CommonCluster>> {
        match self.persistence().get_cluster(cluster_id).await? {
            Some(record) if record.organization_id == organization_id => {
                Ok(self.factory.from_record(record)?)
            }
            _ => Err(Error::NotFound(cluster_id.to_string())),
        }
    }

    /// One cluster of an organization, by name.
    pub async fn get_cluster_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Arc<dyn CommonCluster>> {
        match self
            .persistence()
            .get_cluster_by_name(organization_id, name)
            .await?
        {
            Some(record) => Ok(self.factory.from_record(record)?),
            None => Err(Error::NotFound(format!("{}/{}", organization_id, name))),
        }
    }

    /// Status history of a cluster, oldest first. Kept after deletion.
    pub async fn get_status_history(&self, cluster_id: i64) -> Result<Vec<StatusChange>> {
        Ok(self.persistence().list_status_history(cluster_id).await?)
    }

    /// Re-drive every cluster left in `CREATING`, typically after a restart.
    /// Returns how many recoveries were started.
    pub async fn retry_pending_operations(&self) -> Result<usize> {
        let pending = self
            .persistence()
            .list_clusters(Some(ClusterStatus::Creating))
            .await?;

        let mut started = 0;
        for record in pending {
            let cluster_id = record.id;
            let recovered = match self.factory.from_record(record) {
                Ok(cluster) => self.recover_cluster(cluster).await.map(|_| ()),
                Err(e) => Err(e.into()),
            };
            match recovered {
                Ok(()) => started += 1,
                Err(e) => warn!(cluster_id, error = %e, "Failed to recover pending cluster"),
            }
        }

        if started > 0 {
            info!(count = started, "Pending cluster creations resumed");
        }
        Ok(started)
    }

    /// Wait for every background operation to finish.
    pub async fn wait_for_background_tasks(&self) {
        self.supervisor.wait_all().await;
    }

    /// Abort background operations that are still running.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

/// Run one deletion step. Forced deletions log the failure and carry on.
async fn step<F>(force: bool, cluster_id: i64, name: &'static str, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match fut.await {
        Ok(()) => Ok(()),
        Err(e) if force => {
            warn!(cluster_id, step = name, error = %e, "Deletion step failed, continuing");
            Ok(())
        }
        Err(e) => {
            error!(cluster_id, step = name, error = %e, "Deletion step failed");
            Err(e)
        }
    }
}
