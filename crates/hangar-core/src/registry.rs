//! In-memory cluster registry with a bounded admission check.
//!
//! The registry is the only shared structural state of the orchestrator. One
//! lock guards the map; per-cluster status and events are guarded inside the
//! [`Cluster`] itself. Lock order is always registry first, then cluster,
//! never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use hangar_proto::{Cluster, ClusterId, ClusterStatus};

/// Admission rejected or the admission closure itself failed.
#[derive(Debug, Error)]
pub enum AdmissionError<E> {
    /// The configured cap on simultaneously live clusters is reached.
    #[error("cluster limit reached ({limit} non-terminal clusters)")]
    LimitReached { limit: usize },
    /// Preparing the new cluster failed before it was inserted.
    #[error(transparent)]
    Rejected(E),
}

/// Concurrency-safe map of all known clusters.
///
/// Entries are inserted by [`ClusterRegistry::admit`] and removed only by the
/// reaper; a deleted cluster stays visible in a terminal status until reaped
/// so that clients can observe the outcome.
#[derive(Debug)]
pub struct ClusterRegistry {
    limit: usize,
    clusters: Mutex<HashMap<ClusterId, Arc<Cluster>>>,
}

impl ClusterRegistry {
    /// Registry admitting at most `limit` non-terminal clusters at a time.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            clusters: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admits one new cluster under the registry lock.
    ///
    /// The capacity check, the `build` closure, and the insert all happen in
    /// one critical section, so the non-terminal count can never exceed the
    /// limit at admission time. `build` constructs the cluster and performs
    /// the synchronous part of its setup (working directory preparation); if
    /// it fails, nothing is inserted.
    ///
    /// # Errors
    /// [`AdmissionError::LimitReached`] when the cap is hit (before `build`
    /// runs, so there are no side effects), or the `build` error passed
    /// through.
    pub fn admit<E>(
        &self,
        build: impl FnOnce() -> Result<Arc<Cluster>, E>,
    ) -> Result<Arc<Cluster>, AdmissionError<E>> {
        let mut clusters = self.clusters.lock();
        let live = clusters
            .values()
            .filter(|cluster| !cluster.status().is_terminal())
            .count();
        if live >= self.limit {
            return Err(AdmissionError::LimitReached { limit: self.limit });
        }
        let cluster = build().map_err(AdmissionError::Rejected)?;
        debug!(id = %cluster.id(), live = live + 1, "Cluster admitted");
        clusters.insert(cluster.id(), Arc::clone(&cluster));
        Ok(cluster)
    }

    pub fn get(&self, id: ClusterId) -> Option<Arc<Cluster>> {
        self.clusters.lock().get(&id).cloned()
    }

    /// All clusters, optionally narrowed to the given statuses, sorted by
    /// creation time for stable listing output.
    pub fn list(&self, status_filter: Option<&[ClusterStatus]>) -> Vec<Arc<Cluster>> {
        let mut clusters: Vec<Arc<Cluster>> = self
            .clusters
            .lock()
            .values()
            .filter(|cluster| {
                status_filter
                    .is_none_or(|statuses| statuses.is_empty() || statuses.contains(&cluster.status()))
            })
            .cloned()
            .collect();
        clusters.sort_by_key(|cluster| (cluster.created_at(), cluster.id()));
        clusters
    }

    /// Number of clusters not yet in a terminal status.
    pub fn non_terminal_count(&self) -> usize {
        self.clusters
            .lock()
            .values()
            .filter(|cluster| !cluster.status().is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.clusters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.lock().is_empty()
    }

    /// Removes every cluster matching `predicate` and returns how many went.
    /// This is the reaper's eviction path and the only way entries leave the
    /// registry.
    pub fn remove_where(&self, mut predicate: impl FnMut(&Cluster) -> bool) -> usize {
        let mut clusters = self.clusters.lock();
        let before = clusters.len();
        clusters.retain(|_, cluster| !predicate(cluster));
        before - clusters.len()
    }
}
