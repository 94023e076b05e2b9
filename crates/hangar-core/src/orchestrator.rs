//! Cluster lifecycle orchestration.
//!
//! The orchestrator owns the two workflows of the system. Creation runs
//! infra init, plan and apply, then configuration provisioning; deletion runs
//! deprovisioning and infra destroy. Each workflow executes as its own
//! background task, retries transient tool failures per policy, and records
//! every step in the cluster's event log. A create workflow that fails after
//! real resources may exist spawns a compensating teardown so nothing leaks.
//!
//! There is no cancellation: once a workflow task is spawned it runs to
//! completion. This is a known limitation carried over deliberately.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use hangar_proto::{
    Cluster, ClusterDefinition, ClusterId, ClusterStatus, ConfigTool, DefinitionError,
    IllegalTransition, InfraTool, NotRunning, ToolContext, ToolError, ToolResult, WorkspaceError,
    WorkspaceManager,
};

use crate::registry::{AdmissionError, ClusterRegistry};
use crate::retry::{self, RetryPolicy};

/// Synchronously reported orchestration failure.
///
/// Everything here happens before a workflow task is spawned and leaves no
/// side effects behind.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("cluster limit reached ({limit} non-terminal clusters)")]
    LimitReached { limit: usize },
    #[error(transparent)]
    NotRunning(#[from] NotRunning),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Drives cluster create and delete workflows against the external tools.
pub struct Orchestrator {
    registry: Arc<ClusterRegistry>,
    workspace: Arc<dyn WorkspaceManager>,
    infra: Arc<dyn InfraTool>,
    provisioner: Arc<dyn ConfigTool>,
    create_retry: RetryPolicy,
    teardown_retry: RetryPolicy,
    // Workflow task handles per cluster, so embedders and tests can await
    // completion. Tasks are fire-and-forget otherwise.
    tasks: Mutex<HashMap<ClusterId, Vec<JoinHandle<()>>>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        workspace: Arc<dyn WorkspaceManager>,
        infra: Arc<dyn InfraTool>,
        provisioner: Arc<dyn ConfigTool>,
        create_retry: RetryPolicy,
        teardown_retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            workspace,
            infra,
            provisioner,
            create_retry,
            teardown_retry,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// Accepts a cluster definition and starts the create workflow.
    ///
    /// Synchronously: validates the definition against the template store,
    /// admits the cluster under the registry lock (capacity check, working
    /// directory preparation, insert — one critical section), then spawns the
    /// workflow task. The returned cluster reflects only what has happened so
    /// far ([`ClusterStatus::WorkingDirCreated`]); callers poll for progress.
    ///
    /// # Errors
    /// Malformed or unresolvable definitions and a full registry are rejected
    /// here with no side effects.
    pub fn create(
        self: &Arc<Self>,
        definition: &ClusterDefinition,
    ) -> Result<Arc<Cluster>, OrchestratorError> {
        self.workspace.resolve_template(definition.template())?;

        let cluster = self
            .registry
            .admit(|| -> Result<Arc<Cluster>, OrchestratorError> {
                let cluster = Arc::new(Cluster::new());
                cluster.transition(
                    ClusterStatus::CreationStarted,
                    "Cluster definition accepted.",
                )?;
                let workdir = self.workspace.prepare(cluster.id(), definition)?;
                cluster.transition(
                    ClusterStatus::WorkingDirCreated,
                    format!("Created working directory {}.", workdir.display()),
                )?;
                Ok(cluster)
            })
            .map_err(|err| match err {
                AdmissionError::LimitReached { limit } => OrchestratorError::LimitReached { limit },
                AdmissionError::Rejected(inner) => inner,
            })?;

        info!(id = %cluster.id(), template = definition.template(), "Cluster creation started");

        let handle = tokio::spawn({
            let this = Arc::clone(self);
            let cluster = Arc::clone(&cluster);
            let definition = definition.clone();
            async move { this.run_create_workflow(&cluster, &definition).await }
        });
        self.track(cluster.id(), handle);

        Ok(cluster)
    }

    /// Starts the delete workflow for a running cluster.
    ///
    /// Returns `Ok(None)` for an unknown id. The status check and the switch
    /// to [`ClusterStatus::DeletionStarted`] are one atomic step on the
    /// cluster; the returned cluster carries that status and callers poll for
    /// completion. The registry entry is kept until the reaper evicts it.
    ///
    /// # Errors
    /// [`OrchestratorError::NotRunning`] when the cluster is in any other
    /// status; nothing changes in that case.
    pub fn delete(
        self: &Arc<Self>,
        id: ClusterId,
    ) -> Result<Option<Arc<Cluster>>, OrchestratorError> {
        let Some(cluster) = self.registry.get(id) else {
            return Ok(None);
        };
        cluster.begin_deletion()?;
        info!(id = %cluster.id(), "Cluster deletion started");

        let handle = tokio::spawn({
            let this = Arc::clone(self);
            let cluster = Arc::clone(&cluster);
            async move { this.run_delete_workflow(&cluster).await }
        });
        self.track(id, handle);

        Ok(Some(cluster))
    }

    pub fn get(&self, id: ClusterId) -> Option<Arc<Cluster>> {
        self.registry.get(id)
    }

    pub fn list(&self, status_filter: Option<&[ClusterStatus]>) -> Vec<Arc<Cluster>> {
        self.registry.list(status_filter)
    }

    /// Operator acknowledgement of a failed cluster, the only externally
    /// triggerable transition (`*Failed` to
    /// [`ClusterStatus::TerminatedManually`]).
    ///
    /// # Errors
    /// Illegal from any status outside the acknowledgeable failures; the
    /// status stays unchanged.
    pub fn acknowledge(&self, id: ClusterId) -> Result<Option<Arc<Cluster>>, OrchestratorError> {
        let Some(cluster) = self.registry.get(id) else {
            return Ok(None);
        };
        cluster.acknowledge_termination()?;
        info!(id = %cluster.id(), "Cluster failure acknowledged");
        Ok(Some(cluster))
    }

    /// Combined tool log of the cluster, `None` for an unknown id.
    pub fn logs(&self, id: ClusterId) -> Option<Result<String, WorkspaceError>> {
        self.registry.get(id)?;
        Some(self.workspace.read_log(id))
    }

    /// Access artifact produced by provisioning, `None` for an unknown id.
    pub fn access_file(&self, id: ClusterId) -> Option<Result<String, WorkspaceError>> {
        self.registry.get(id)?;
        Some(self.workspace.read_access_file(id))
    }

    /// Human-readable cluster summary, `None` for an unknown id.
    pub fn cluster_info(&self, id: ClusterId) -> Option<Result<String, WorkspaceError>> {
        self.registry.get(id)?;
        Some(self.workspace.read_cluster_info(id))
    }

    /// Waits until every workflow task spawned for `id` so far has finished,
    /// including compensating teardowns spawned while waiting.
    pub async fn wait_for(&self, id: ClusterId) {
        loop {
            let handles: Vec<JoinHandle<()>> = match self.tasks.lock().get_mut(&id) {
                Some(handles) if !handles.is_empty() => handles.drain(..).collect(),
                _ => return,
            };
            for handle in handles {
                if let Err(err) = handle.await {
                    error!(id = %id, error = %err, "Workflow task panicked");
                }
            }
        }
    }

    fn track(&self, id: ClusterId, handle: JoinHandle<()>) {
        self.tasks.lock().entry(id).or_default().push(handle);
    }

    async fn run_create_workflow(
        self: &Arc<Self>,
        cluster: &Arc<Cluster>,
        definition: &ClusterDefinition,
    ) {
        let ctx = ToolContext::new(self.workspace.directory(cluster.id()));

        if self
            .run_stage(
                cluster,
                ClusterStatus::InfraInit,
                ClusterStatus::InfraInitFailed,
                "Infrastructure init",
                self.create_retry,
                || self.infra.init(&ctx),
            )
            .await
            .is_none()
        {
            // Nothing real was created yet; the working directory is all
            // there is to clean up.
            self.cleanup_workdir(cluster);
            return;
        }

        match self
            .run_stage(
                cluster,
                ClusterStatus::InfraPlan,
                ClusterStatus::InfraPlanFailed,
                "Infrastructure plan",
                self.create_retry,
                || self.infra.plan(&ctx),
            )
            .await
        {
            Some(ToolResult::ChangesPresent) => {
                cluster.append_event("Infrastructure plan reports pending changes.");
            }
            Some(_) => {}
            None => {
                self.cleanup_workdir(cluster);
                return;
            }
        }

        if self
            .run_stage(
                cluster,
                ClusterStatus::InfraApply,
                ClusterStatus::InfraApplyFailed,
                "Infrastructure apply",
                self.create_retry,
                || self.infra.apply(&ctx),
            )
            .await
            .is_none()
        {
            self.spawn_compensating_teardown(cluster);
            return;
        }

        if let Some(wait) = definition.wait_after_apply()
            && !wait.is_zero()
        {
            cluster.append_event(format!(
                "Waiting {} minute(s) for instances to settle.",
                wait.as_secs() / 60
            ));
            tokio::time::sleep(wait).await;
        }

        if self
            .run_stage(
                cluster,
                ClusterStatus::ConfigProvisioning,
                ClusterStatus::ConfigProvisioningFailed,
                "Provisioning",
                self.create_retry,
                || self.provisioner.provision(&ctx),
            )
            .await
            .is_none()
        {
            self.spawn_compensating_teardown(cluster);
            return;
        }

        if let Err(err) = cluster.transition(ClusterStatus::Running, "Cluster up and running.") {
            error!(id = %cluster.id(), error = %err, "Could not mark cluster running");
            return;
        }
        info!(id = %cluster.id(), "Cluster running");
    }

    /// Runs one workflow stage: enters the in-progress status, drives the
    /// tool through the retry executor, and on exhausted or fatal failure
    /// moves to the stage's failed status. Returns the tool result on
    /// success, `None` once the failed status is set.
    async fn run_stage<F, Fut>(
        &self,
        cluster: &Cluster,
        stage: ClusterStatus,
        failed: ClusterStatus,
        label: &str,
        policy: RetryPolicy,
        task: F,
    ) -> Option<ToolResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ToolResult, ToolError>>,
    {
        if let Err(err) = cluster.transition(stage, format!("{label} started.")) {
            // A stage is only entered from its predecessor; hitting this
            // means the workflow raced something it never should.
            error!(id = %cluster.id(), error = %err, "Stage entry rejected");
            return None;
        }

        let outcome = retry::run(
            policy,
            ToolResult::Error,
            task,
            |attempt| {
                if attempt > 1 {
                    cluster.append_event(format!("{label} started (try #{attempt})."));
                }
            },
            |result, attempts| {
                cluster.append_event(format!(
                    "{label} failed with result {result} after {attempts} tries."
                ));
            },
        )
        .await;

        match outcome {
            Ok(ToolResult::Error) => {
                let _ = cluster.transition(failed, format!("{label} failed."));
                warn!(id = %cluster.id(), stage = label, "Stage failed");
                None
            }
            Ok(result) => {
                cluster.append_event(format!("{label} successful."));
                Some(result)
            }
            Err(fault) => {
                let _ = cluster.transition(failed, format!("{label} aborted: {fault}"));
                error!(id = %cluster.id(), stage = label, error = %fault, "Stage aborted");
                None
            }
        }
    }

    /// Best-effort teardown after a create workflow failed once real
    /// resources may exist: deprovision, destroy, working directory cleanup,
    /// each a single attempt. Runs as its own background task. The cluster is
    /// already in its failed status and stays there no matter what happens
    /// here; every outcome is recorded as an event only.
    fn spawn_compensating_teardown(self: &Arc<Self>, cluster: &Arc<Cluster>) {
        let this = Arc::clone(self);
        let cluster = Arc::clone(cluster);
        let id = cluster.id();
        let handle = tokio::spawn(async move {
            let ctx = ToolContext::new(this.workspace.directory(cluster.id()));

            cluster.append_event("Deprovisioning cleanup started.");
            match this.provisioner.deprovision(&ctx).await {
                Ok(ToolResult::Success) => cluster.append_event("Deprovisioning cleanup successful."),
                Ok(result) => cluster.append_event(format!(
                    "Deprovisioning cleanup failed with result {result}."
                )),
                Err(fault) => {
                    cluster.append_event(format!("Deprovisioning cleanup aborted: {fault}"));
                }
            }

            cluster.append_event("Infrastructure destroy started.");
            match this.infra.destroy(&ctx).await {
                Ok(ToolResult::Success) => {
                    cluster.append_event("Infrastructure destroy successful.");
                }
                Ok(result) => cluster.append_event(format!(
                    "Infrastructure destroy failed with result {result}."
                )),
                Err(fault) => {
                    cluster.append_event(format!("Infrastructure destroy aborted: {fault}"));
                }
            }

            this.cleanup_workdir(&cluster);
        });
        self.track(id, handle);
    }

    async fn run_delete_workflow(self: &Arc<Self>, cluster: &Arc<Cluster>) {
        let ctx = ToolContext::new(self.workspace.directory(cluster.id()));

        // External deregistration first, while the instances still exist.
        // Best effort: a failure here is recorded but never blocks destroy.
        cluster.append_event("Deprovisioning started.");
        let deprovisioned = retry::run(
            self.teardown_retry,
            ToolResult::Error,
            || self.provisioner.deprovision(&ctx),
            |attempt| {
                if attempt > 1 {
                    cluster.append_event(format!("Deprovisioning started (try #{attempt})."));
                }
            },
            |result, attempts| {
                cluster.append_event(format!(
                    "Deprovisioning failed with result {result} after {attempts} tries."
                ));
            },
        )
        .await;
        let deprovision_ok = match deprovisioned {
            Ok(ToolResult::Success) => {
                cluster.append_event("Deprovisioning successful.");
                true
            }
            Ok(_) => false,
            Err(fault) => {
                cluster.append_event(format!("Deprovisioning aborted: {fault}"));
                false
            }
        };

        if let Err(err) =
            cluster.transition(ClusterStatus::InfraDestroy, "Infrastructure destroy started.")
        {
            error!(id = %cluster.id(), error = %err, "Stage entry rejected");
            return;
        }
        let destroyed = retry::run(
            self.teardown_retry,
            ToolResult::Error,
            || self.infra.destroy(&ctx),
            |attempt| {
                if attempt > 1 {
                    cluster.append_event(format!(
                        "Infrastructure destroy started (try #{attempt})."
                    ));
                }
            },
            |result, attempts| {
                cluster.append_event(format!(
                    "Infrastructure destroy failed with result {result} after {attempts} tries."
                ));
            },
        )
        .await;
        let destroy_ok = match destroyed {
            Ok(ToolResult::Success) => {
                cluster.append_event("Infrastructure destroy successful.");
                true
            }
            Ok(_) => false,
            Err(fault) => {
                cluster.append_event(format!("Infrastructure destroy aborted: {fault}"));
                false
            }
        };

        self.cleanup_workdir(cluster);

        if deprovision_ok && destroy_ok {
            let _ = cluster.transition(ClusterStatus::Terminated, "Cluster terminated.");
            info!(id = %cluster.id(), "Cluster terminated");
        } else {
            let _ = cluster.transition(
                ClusterStatus::InfraDestroyFailed,
                "Cluster termination failed.",
            );
            warn!(id = %cluster.id(), "Cluster termination failed");
        }
    }

    fn cleanup_workdir(&self, cluster: &Cluster) {
        cluster.append_event("Working directory cleanup started.");
        self.workspace
            .cleanup(&self.workspace.directory(cluster.id()));
        cluster.append_event("Working directory cleaned up.");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("limit", &self.registry.limit())
            .field("create_retry", &self.create_retry)
            .field("teardown_retry", &self.teardown_retry)
            .finish_non_exhaustive()
    }
}
