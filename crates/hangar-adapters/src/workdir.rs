//! Filesystem-backed workspace manager.
//!
//! Each cluster gets `root/<id>`: the submitted definition as `cluster.yml`,
//! the shared `_common` template files, then the files of the selected
//! template on top. Template directories whose name starts with `_` are
//! deactivated and never selectable. Cleanup removes only the infra tool's
//! cache directory; logs and generated artifacts stay behind for
//! post-mortems.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use hangar_proto::{
    ClusterDefinition, ClusterId, LOG_FILE_NAME, WorkspaceError, WorkspaceManager,
};

const DEFINITION_FILE: &str = "cluster.yml";
const COMMON_TEMPLATE: &str = "_common";
const INFRA_CACHE_DIR: &str = ".terraform";
const ACCESS_FILE: &str = "resources/access.yml";
const CLUSTER_INFO_FILE: &str = "resources/cluster-info.txt";

#[derive(Debug)]
pub struct FsWorkspace {
    root: PathBuf,
    templates: PathBuf,
}

impl FsWorkspace {
    /// Workspace rooted at `root` with templates under `templates`. Both
    /// directories are created if missing.
    pub fn new(root: impl Into<PathBuf>, templates: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let templates = templates.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(&templates)?;
        Ok(Self { root, templates })
    }

    /// Names of the selectable (non-deactivated) templates, sorted.
    pub fn template_names(&self) -> Result<Vec<String>, WorkspaceError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.templates)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('_') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, id: ClusterId, relative: &str, artifact: &str) -> Result<String, WorkspaceError> {
        let path = self.directory(id).join(relative);
        if !path.is_file() {
            return Err(WorkspaceError::MissingArtifact {
                id,
                artifact: artifact.to_string(),
            });
        }
        Ok(fs::read_to_string(path)?)
    }
}

impl WorkspaceManager for FsWorkspace {
    fn resolve_template(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        // Deactivated templates are treated as nonexistent.
        if name.is_empty() || name.starts_with('_') || name.contains(['/', '\\']) {
            return Err(WorkspaceError::UnknownTemplate(name.to_string()));
        }
        let path = self.templates.join(name);
        if !path.is_dir() {
            return Err(WorkspaceError::UnknownTemplate(name.to_string()));
        }
        Ok(path)
    }

    fn prepare(
        &self,
        id: ClusterId,
        definition: &ClusterDefinition,
    ) -> Result<PathBuf, WorkspaceError> {
        let template = self.resolve_template(definition.template())?;
        let dir = self.directory(id);
        fs::create_dir_all(&dir)?;

        fs::write(dir.join(DEFINITION_FILE), definition.as_yaml())?;

        let common = self.templates.join(COMMON_TEMPLATE);
        if common.is_dir() {
            copy_dir_recursive(&common, &dir)?;
        }
        copy_dir_recursive(&template, &dir)?;

        debug!(id = %id, dir = %dir.display(), "Prepared working directory");
        Ok(dir)
    }

    fn directory(&self, id: ClusterId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn cleanup(&self, dir: &Path) {
        let cache = dir.join(INFRA_CACHE_DIR);
        if !cache.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&cache) {
            warn!(dir = %dir.display(), error = %err, "Working directory could not be cleaned up");
        }
    }

    fn read_log(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read_file(id, LOG_FILE_NAME, "log")
    }

    fn read_access_file(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read_file(id, ACCESS_FILE, "access file")
    }

    fn read_cluster_info(&self, id: ClusterId) -> Result<String, WorkspaceError> {
        self.read_file(id, CLUSTER_INFO_FILE, "cluster info")
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
