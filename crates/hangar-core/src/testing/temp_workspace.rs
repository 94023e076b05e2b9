//! Temp-dir backed workspace manager for tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempDir;

use hangar_proto::{
    ClusterDefinition, ClusterId, LOG_FILE_NAME, WorkspaceError, WorkspaceManager,
};

/// [`WorkspaceManager`] rooted in a temporary directory.
///
/// Templates are registered by name instead of existing on disk; `prepare`
/// creates the per-cluster directory and writes the definition, nothing more.
/// Cleanup invocations are recorded for assertions.
#[derive(Debug)]
pub struct TempWorkspace {
    root: TempDir,
    templates: HashSet<String>,
    cleaned: Mutex<Vec<PathBuf>>,
}

impl TempWorkspace {
    /// Workspace knowing a single template named `demo`.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: TempDir::new()?,
            templates: HashSet::from(["demo".to_string()]),
            cleaned: Mutex::new(Vec::new()),
        })
    }

    /// Registers an additional selectable template name.
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.templates.insert(name.into());
        self
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directories handed to [`WorkspaceManager::cleanup`] so far.
    pub fn cleaned(&self) -> Vec<PathBuf> {
        self.cleaned.lock().clone()
    }

    /// Drops a file into a cluster's working directory, creating parents.
    pub fn write_artifact(
        &self,
        id: ClusterId,
        relative: impl AsRef<Path>,
        content: &str,
    ) -> std::io::Result<()> {
        let path = self.directory(id).join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn read(&self, id: ClusterId, relative: &str, artifact: &str) -> Result<String, WorkspaceError> {
        let path = self.directory(id).join(relative);
        if !path.exists() {
            return Err(WorkspaceError::MissingArtifact {
                id,
                artifact: artifact.to_string(),
            });
        }
        Ok(fs::read_to_string(path)?)
    }
}

impl WorkspaceManager for TempWorkspace {
    fn resolve_template(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.starts_with('_') || !self.templates.contains(name) {
            return Err(WorkspaceError::UnknownTemplate(name.to_string()));
        }
        Ok(self.root.path().join("templates").join(name))
    }

    fn prepare(
        &self,
        id: ClusterId,
        definition: &ClusterDefinition,
    ) -> Result<PathBuf, WorkspaceError> {
        self.resolve_template(definition.template())?;
        let dir = self.directory(id);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("cluster.yml"), definition.as_yaml())?;
        Ok(dir)
    }

    fn directory(&self, id: ClusterId) -> PathBuf {
        self.root.path().join(id.to_string())
    }

    fn cleanup(&self, dir: &Path) {
        self.cleaned.lock().push(dir.to_path_buf());
        let _ = fs::remove_dir_all(dir.join(".terraform"));
    }

    fn read_log(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read(id, LOG_FILE_NAME, "log")
    }

    fn read_access_file(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read(id, "resources/access.yml", "access file")
    }

    fn read_cluster_info(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read(id, "resources/cluster-info.txt", "cluster info")
    }
}
