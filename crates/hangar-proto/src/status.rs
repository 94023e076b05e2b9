//! Cluster lifecycle states and the legal transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a cluster.
///
/// A cluster moves strictly along the edges accepted by
/// [`ClusterStatus::can_transition_to`]. The two terminated states and every
/// `*Failed` state are terminal: no workflow advances a cluster out of them,
/// and only the three post-resource failure states accept the manual
/// acknowledgement edge to [`ClusterStatus::TerminatedManually`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    New,
    CreationStarted,
    WorkingDirCreated,
    InfraInit,
    InfraPlan,
    InfraApply,
    ConfigProvisioning,
    Running,
    DeletionStarted,
    InfraDestroy,
    Terminated,
    TerminatedManually,
    InfraInitFailed,
    InfraPlanFailed,
    InfraApplyFailed,
    ConfigProvisioningFailed,
    InfraDestroyFailed,
}

impl ClusterStatus {
    /// Wire/display form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::CreationStarted => "CREATION_STARTED",
            Self::WorkingDirCreated => "WORKING_DIR_CREATED",
            Self::InfraInit => "INFRA_INIT",
            Self::InfraPlan => "INFRA_PLAN",
            Self::InfraApply => "INFRA_APPLY",
            Self::ConfigProvisioning => "CONFIG_PROVISIONING",
            Self::Running => "RUNNING",
            Self::DeletionStarted => "DELETION_STARTED",
            Self::InfraDestroy => "INFRA_DESTROY",
            Self::Terminated => "TERMINATED",
            Self::TerminatedManually => "TERMINATED_MANUALLY",
            Self::InfraInitFailed => "INFRA_INIT_FAILED",
            Self::InfraPlanFailed => "INFRA_PLAN_FAILED",
            Self::InfraApplyFailed => "INFRA_APPLY_FAILED",
            Self::ConfigProvisioningFailed => "CONFIG_PROVISIONING_FAILED",
            Self::InfraDestroyFailed => "INFRA_DESTROY_FAILED",
        }
    }

    /// True once no workflow will ever advance this cluster again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::TerminatedManually) || self.is_failed()
    }

    /// True for every stage-failure state.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Self::InfraInitFailed
                | Self::InfraPlanFailed
                | Self::InfraApplyFailed
                | Self::ConfigProvisioningFailed
                | Self::InfraDestroyFailed
        )
    }

    /// Whether the edge `self -> to` is legal.
    ///
    /// The `*Failed -> TerminatedManually` edges exist only for failures that
    /// may have left real infrastructure behind (apply, provisioning, destroy);
    /// an init or plan failure never created anything to acknowledge.
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::New, Self::CreationStarted)
                | (Self::CreationStarted, Self::WorkingDirCreated)
                | (Self::WorkingDirCreated, Self::InfraInit)
                | (Self::InfraInit, Self::InfraPlan | Self::InfraInitFailed)
                | (Self::InfraPlan, Self::InfraApply | Self::InfraPlanFailed)
                | (Self::InfraApply, Self::ConfigProvisioning | Self::InfraApplyFailed)
                | (Self::ConfigProvisioning, Self::Running | Self::ConfigProvisioningFailed)
                | (Self::Running, Self::DeletionStarted)
                | (Self::DeletionStarted, Self::InfraDestroy)
                | (Self::InfraDestroy, Self::Terminated | Self::InfraDestroyFailed)
                | (
                    Self::InfraApplyFailed | Self::ConfigProvisioningFailed | Self::InfraDestroyFailed,
                    Self::TerminatedManually,
                )
        )
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change. The cluster keeps its previous status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal state transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ClusterStatus,
    pub to: ClusterStatus,
}
