//! Working-directory management for cluster workspaces.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cluster::ClusterId;
use crate::definition::ClusterDefinition;

/// Workspace operation failure.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The requested template does not exist or is deactivated.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    /// An artifact was requested before the stage producing it ran.
    #[error("no {artifact} present for cluster {id}")]
    MissingArtifact { id: ClusterId, artifact: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates, resolves, and cleans per-cluster working directories.
///
/// Implementations own the mapping from cluster id to directory and the
/// template material copied into fresh workspaces. All methods are called
/// from workflow tasks; implementations must be thread-safe.
pub trait WorkspaceManager: Send + Sync {
    /// Checks that `name` resolves to a selectable template and returns its
    /// source directory. Never has side effects.
    fn resolve_template(&self, name: &str) -> Result<PathBuf, WorkspaceError>;

    /// Creates the working directory for `id` and populates it: the
    /// definition document first, then shared template files, then the files
    /// of the named template. Returns the directory path.
    fn prepare(&self, id: ClusterId, definition: &ClusterDefinition)
    -> Result<PathBuf, WorkspaceError>;

    /// Directory assigned to `id`, whether or not it exists yet.
    fn directory(&self, id: ClusterId) -> PathBuf;

    /// Best-effort removal of tool caches once a cluster is gone. Keeps logs
    /// and generated artifacts in place for post-mortems; never fails the
    /// caller.
    fn cleanup(&self, dir: &Path);

    /// Combined tool log streamed during provisioning.
    fn read_log(&self, id: ClusterId) -> Result<String, WorkspaceError>;

    /// Access artifact generated by provisioning (connection endpoints,
    /// credentials pointer).
    fn read_access_file(&self, id: ClusterId) -> Result<String, WorkspaceError>;

    /// Human-readable summary generated by provisioning.
    fn read_cluster_info(&self, id: ClusterId) -> Result<String, WorkspaceError>;
}
