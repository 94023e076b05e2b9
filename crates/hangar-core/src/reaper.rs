//! Periodic eviction of stale registry entries.
//!
//! Clusters in a terminal status stay visible so clients can observe the
//! outcome, but not forever: the reaper sweeps the registry on a fixed
//! schedule and removes every cluster that is not running and has been
//! inactive past the configured threshold. Running clusters are never
//! touched regardless of age. This sweep is the only path that removes
//! registry entries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use hangar_proto::ClusterStatus;

use crate::registry::ClusterRegistry;

#[derive(Debug)]
pub struct Reaper {
    registry: Arc<ClusterRegistry>,
    interval: Duration,
    max_inactivity: chrono::Duration,
}

impl Reaper {
    /// Reaper sweeping every `interval`, evicting clusters whose last event
    /// is older than `max_inactivity`.
    pub fn new(registry: Arc<ClusterRegistry>, interval: Duration, max_inactivity: Duration) -> Self {
        Self {
            registry,
            // tokio::time::interval panics on a zero period.
            interval: interval.max(Duration::from_secs(1)),
            max_inactivity: chrono::Duration::from_std(max_inactivity)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    /// One sweep against the clock.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// One sweep, evaluated as if the current time were `now`.
    ///
    /// Removes every cluster that is not [`ClusterStatus::Running`] and whose
    /// most recent event is older than the inactivity threshold. Returns the
    /// number of evicted clusters.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.max_inactivity;
        let reaped = self.registry.remove_where(|cluster| {
            cluster.status() != ClusterStatus::Running && cluster.last_event_at() < cutoff
        });
        if reaped > 0 {
            info!(reaped, "Reaped stale clusters");
        } else {
            debug!("Reaper sweep found nothing to evict");
        }
        reaped
    }

    /// Runs the sweep on its schedule until the task is dropped or the
    /// process exits.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh start
            // does not sweep an empty registry.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
