//! Interfaces to the external provisioning tools.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// File inside each working directory receiving the combined tool output.
pub const LOG_FILE_NAME: &str = "cluster.log";

/// Classified outcome of one tool invocation that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResult {
    /// The tool exited reporting success.
    Success,
    /// The tool exited reporting failure; eligible for retry.
    Error,
    /// Infra plan only: the plan succeeded and found pending changes.
    /// Advisory, workflows treat it like success.
    ChangesPresent,
}

impl ToolResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::ChangesPresent => "CHANGES_PRESENT",
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault launching or supervising a tool subprocess.
///
/// Distinct from [`ToolResult::Error`]: the tool never ran (or its output
/// could not be captured), so retrying is pointless and callers surface the
/// fault instead.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O failure while streaming tool output: {0}")]
    Stream(#[from] std::io::Error),
}

/// Where a tool invocation runs and logs.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Per-cluster working directory the subprocess runs in.
    pub workdir: PathBuf,
    /// Append target for the prefixed combined output stream.
    pub log_path: PathBuf,
}

impl ToolContext {
    /// Context rooted at `workdir`, logging to the standard log file inside it.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let log_path = workdir.join(LOG_FILE_NAME);
        Self { workdir, log_path }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Declarative-infrastructure tool driving the lifecycle of real resources.
#[async_trait]
pub trait InfraTool: Send + Sync {
    /// Prepares the working directory (backends, providers).
    async fn init(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Dry run. May report [`ToolResult::ChangesPresent`].
    async fn plan(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Creates or updates the real resources.
    async fn apply(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Tears the resources down.
    async fn destroy(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Configuration-management tool run against the provisioned instances.
#[async_trait]
pub trait ConfigTool: Send + Sync {
    /// Installs and configures the software stack.
    async fn provision(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Best-effort external deregistration before resources go away.
    async fn deprovision(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}
