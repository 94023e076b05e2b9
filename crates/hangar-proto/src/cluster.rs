//! The cluster aggregate: identity, status, and an append-only event log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::status::{ClusterStatus, IllegalTransition};

/// Unique cluster identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(Uuid);

impl ClusterId {
    /// Generates a fresh random (v4) id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ClusterId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One entry in a cluster's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub timestamp: DateTime<Utc>,
    /// Seconds elapsed since the cluster was created.
    pub elapsed_seconds: i64,
    pub description: String,
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (+{}s) {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.elapsed_seconds,
            self.description
        )
    }
}

/// Rejected deletion request: only running clusters can be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cluster not running (status {status})")]
pub struct NotRunning {
    pub status: ClusterStatus,
}

/// Serializable point-in-time view of a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub status: ClusterStatus,
    pub created_at: DateTime<Utc>,
    pub events: Vec<ClusterEvent>,
}

/// A provisioned (or provisioning) cluster.
///
/// Identity and creation time are immutable. Status and the event log live
/// behind a single lock so that a status change and the event recording it
/// land atomically; readers always observe a consistent pair.
#[derive(Debug)]
pub struct Cluster {
    id: ClusterId,
    created_at: DateTime<Utc>,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    status: ClusterStatus,
    events: Vec<ClusterEvent>,
}

impl Cluster {
    /// Creates a cluster in [`ClusterStatus::New`], seeded with its first
    /// log entry. The event log is never empty from here on.
    pub fn new() -> Self {
        let created_at = Utc::now();
        Self {
            id: ClusterId::random(),
            created_at,
            state: Mutex::new(State {
                status: ClusterStatus::New,
                events: vec![ClusterEvent {
                    timestamp: created_at,
                    elapsed_seconds: 0,
                    description: "Cluster creation started.".to_string(),
                }],
            }),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ClusterStatus {
        self.state.lock().status
    }

    /// Appends a progress event without touching the status.
    pub fn append_event(&self, description: impl Into<String>) {
        let description = description.into();
        let mut state = self.state.lock();
        let event = self.make_event(description);
        state.events.push(event);
    }

    /// Moves the cluster to `to` and records the change as an event.
    ///
    /// # Errors
    /// Rejects edges outside the lifecycle table; the status is left
    /// unchanged and no event is appended.
    pub fn transition(
        &self,
        to: ClusterStatus,
        description: impl Into<String>,
    ) -> Result<(), IllegalTransition> {
        let description = description.into();
        let mut state = self.state.lock();
        if !state.status.can_transition_to(to) {
            return Err(IllegalTransition {
                from: state.status,
                to,
            });
        }
        state.status = to;
        let event = self.make_event(description);
        state.events.push(event);
        Ok(())
    }

    /// Atomically verifies the cluster is running and marks deletion started.
    ///
    /// # Errors
    /// Returns the current status when it is anything but
    /// [`ClusterStatus::Running`]; nothing is changed in that case.
    pub fn begin_deletion(&self) -> Result<(), NotRunning> {
        let mut state = self.state.lock();
        if state.status != ClusterStatus::Running {
            return Err(NotRunning {
                status: state.status,
            });
        }
        state.status = ClusterStatus::DeletionStarted;
        let event = self.make_event("Cluster deletion started.".to_string());
        state.events.push(event);
        Ok(())
    }

    /// Manual operator acknowledgement of a failed cluster, the only
    /// externally triggerable transition.
    ///
    /// # Errors
    /// Legal only from the post-resource failure states; everything else is
    /// rejected with the offending edge.
    pub fn acknowledge_termination(&self) -> Result<(), IllegalTransition> {
        self.transition(
            ClusterStatus::TerminatedManually,
            "Failure acknowledged, cluster marked as manually terminated.",
        )
    }

    /// Snapshot of the event log in append order.
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.state.lock().events.clone()
    }

    /// Timestamp of the most recent event.
    pub fn last_event_at(&self) -> DateTime<Utc> {
        self.state
            .lock()
            .events
            .last()
            .map_or(self.created_at, |event| event.timestamp)
    }

    /// Consistent serializable view of id, status and events.
    pub fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.lock();
        ClusterSnapshot {
            id: self.id,
            status: state.status,
            created_at: self.created_at,
            events: state.events.clone(),
        }
    }

    // Callers hold the state lock, so timestamps rise with append order.
    fn make_event(&self, description: String) -> ClusterEvent {
        let timestamp = Utc::now();
        ClusterEvent {
            timestamp,
            elapsed_seconds: (timestamp - self.created_at).num_seconds(),
            description,
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cluster_is_seeded() {
        let cluster = Cluster::new();
        assert_eq!(cluster.status(), ClusterStatus::New);
        let events = cluster.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].description, "Cluster creation started.");
        assert_eq!(events[0].elapsed_seconds, 0);
    }

    #[test]
    fn transition_appends_event() {
        let cluster = Cluster::new();
        cluster
            .transition(ClusterStatus::CreationStarted, "Definition accepted.")
            .unwrap();
        assert_eq!(cluster.status(), ClusterStatus::CreationStarted);
        let events = cluster.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events.last().unwrap().description, "Definition accepted.");
    }

    #[test]
    fn illegal_transition_leaves_everything_untouched() {
        let cluster = Cluster::new();
        let err = cluster
            .transition(ClusterStatus::Running, "nope")
            .unwrap_err();
        assert_eq!(err.from, ClusterStatus::New);
        assert_eq!(err.to, ClusterStatus::Running);
        assert_eq!(cluster.status(), ClusterStatus::New);
        assert_eq!(cluster.events().len(), 1);
    }

    #[test]
    fn begin_deletion_requires_running() {
        let cluster = Cluster::new();
        let err = cluster.begin_deletion().unwrap_err();
        assert_eq!(err.status, ClusterStatus::New);
        assert_eq!(cluster.status(), ClusterStatus::New);
    }

    #[test]
    fn begin_deletion_from_running() {
        let cluster = running_cluster();
        cluster.begin_deletion().unwrap();
        assert_eq!(cluster.status(), ClusterStatus::DeletionStarted);
        assert_eq!(
            cluster.events().last().unwrap().description,
            "Cluster deletion started."
        );
    }

    #[test]
    fn acknowledge_only_from_acknowledgeable_failures() {
        let cluster = running_cluster();
        assert!(cluster.acknowledge_termination().is_err());
        assert_eq!(cluster.status(), ClusterStatus::Running);

        cluster.begin_deletion().unwrap();
        cluster
            .transition(ClusterStatus::InfraDestroy, "destroying")
            .unwrap();
        cluster
            .transition(ClusterStatus::InfraDestroyFailed, "destroy failed")
            .unwrap();
        cluster.acknowledge_termination().unwrap();
        assert_eq!(cluster.status(), ClusterStatus::TerminatedManually);
    }

    #[test]
    fn last_event_at_tracks_appends() {
        let cluster = Cluster::new();
        let seeded = cluster.last_event_at();
        cluster.append_event("something happened");
        assert!(cluster.last_event_at() >= seeded);
        assert_eq!(cluster.events().len(), 2);
    }

    #[test]
    fn concurrent_appends_keep_timestamps_in_append_order() {
        let cluster = std::sync::Arc::new(Cluster::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cluster = std::sync::Arc::clone(&cluster);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cluster.append_event(format!("worker {worker} step {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = cluster.events();
        assert_eq!(events.len(), 1 + 8 * 50);
        assert!(events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert!(events
            .windows(2)
            .all(|pair| pair[0].elapsed_seconds <= pair[1].elapsed_seconds));
    }

    #[test]
    fn snapshot_is_consistent() {
        let cluster = running_cluster();
        let snapshot = cluster.snapshot();
        assert_eq!(snapshot.id, cluster.id());
        assert_eq!(snapshot.status, ClusterStatus::Running);
        assert_eq!(snapshot.events.len(), cluster.events().len());
    }

    #[test]
    fn cluster_id_round_trips_through_display() {
        let id = ClusterId::random();
        let parsed: ClusterId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    fn running_cluster() -> Cluster {
        let cluster = Cluster::new();
        for (status, note) in [
            (ClusterStatus::CreationStarted, "accepted"),
            (ClusterStatus::WorkingDirCreated, "workdir"),
            (ClusterStatus::InfraInit, "init"),
            (ClusterStatus::InfraPlan, "plan"),
            (ClusterStatus::InfraApply, "apply"),
            (ClusterStatus::ConfigProvisioning, "provision"),
            (ClusterStatus::Running, "running"),
        ] {
            cluster.transition(status, note).unwrap();
        }
        cluster
    }
}
