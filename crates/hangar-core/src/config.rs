//! Configuration types for the Hangar orchestrator.
//!
//! Loaded from a single YAML file (`hangar.yml` by default). Every field has
//! a default so an empty or missing file yields a usable development setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retry::RetryPolicy;

/// Top-level configuration for the Hangar orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HangarConfig {
    /// Workspace and template locations.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Capacity limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Retry policy for the stages of the create workflow.
    #[serde(default)]
    pub create_retry: RetryConfig,

    /// Retry policy for deletion (deprovision and destroy).
    #[serde(default)]
    pub teardown_retry: RetryConfig,

    /// Stale-cluster eviction.
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Infrastructure tool settings.
    #[serde(default)]
    pub infra: InfraConfig,

    /// Configuration-management tool settings.
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

/// Workspace and template locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory receiving one working directory per cluster.
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Directory holding the cluster templates.
    #[serde(default = "default_templates_dir")]
    pub templates: PathBuf,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("./templates")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            templates: default_templates_dir(),
        }
    }
}

/// Capacity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of simultaneously live (non-terminal) clusters.
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
}

fn default_max_clusters() -> usize {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_clusters: default_max_clusters(),
        }
    }
}

/// Bounded retry settings for one workflow family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per tool invocation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds to wait between attempts.
    #[serde(default = "default_retry_interval")]
    pub interval_seconds: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_seconds: default_retry_interval(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.interval_seconds))
    }
}

/// Stale-cluster eviction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether the periodic sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_reaper_interval")]
    pub interval_seconds: u64,

    /// Hours a non-running cluster may sit without events before eviction.
    #[serde(default = "default_max_inactivity")]
    pub max_inactivity_hours: u64,
}

fn default_true() -> bool {
    true
}

fn default_reaper_interval() -> u64 {
    3600
}

fn default_max_inactivity() -> u64 {
    24
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_seconds: default_reaper_interval(),
            max_inactivity_hours: default_max_inactivity(),
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn max_inactivity(&self) -> Duration {
        Duration::from_secs(self.max_inactivity_hours * 3600)
    }
}

/// Infrastructure tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Binary to invoke.
    #[serde(default = "default_infra_binary")]
    pub binary: String,

    /// Variables handed to the tool as `TF_VAR_<name>` environment entries.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

fn default_infra_binary() -> String {
    "terraform".to_string()
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            binary: default_infra_binary(),
            variables: BTreeMap::new(),
        }
    }
}

/// Configuration-management tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Binary to invoke.
    #[serde(default = "default_provisioner_binary")]
    pub binary: String,

    /// Playbook run to set a cluster up.
    #[serde(default = "default_provision_playbook")]
    pub provision_playbook: String,

    /// Playbook run to deregister a cluster before teardown.
    #[serde(default = "default_deprovision_playbook")]
    pub deprovision_playbook: String,

    /// Extra arguments inserted before the playbook.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_provisioner_binary() -> String {
    "ansible-playbook".to_string()
}

fn default_provision_playbook() -> String {
    "playbooks/provision.yml".to_string()
}

fn default_deprovision_playbook() -> String {
    "playbooks/deprovision.yml".to_string()
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            binary: default_provisioner_binary(),
            provision_playbook: default_provision_playbook(),
            deprovision_playbook: default_deprovision_playbook(),
            extra_args: Vec::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: String, reason: String },
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone)]
pub enum ConfigWarning {
    /// Field has a suspicious but workable value.
    SuspiciousValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::SuspiciousValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

impl HangarConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            workspace = %config.workspace.root.display(),
            max_clusters = config.limits.max_clusters,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validates the configuration, returning non-fatal warnings.
    ///
    /// # Errors
    /// Values that make the orchestrator unable to do anything at all
    /// (a zero cluster limit, zero retry attempts) are errors.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.limits.max_clusters == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_clusters".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, retry) in [
            ("create_retry", &self.create_retry),
            ("teardown_retry", &self.teardown_retry),
        ] {
            if retry.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    field: format!("{field}.max_attempts"),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.reaper.enabled && self.reaper.interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "reaper.interval_seconds".to_string(),
                reason: "must be at least 1 when the reaper is enabled".to_string(),
            });
        }

        let mut warnings = Vec::new();
        for (field, retry) in [
            ("create_retry", &self.create_retry),
            ("teardown_retry", &self.teardown_retry),
        ] {
            if retry.interval_seconds == 0 && retry.max_attempts > 1 {
                warnings.push(ConfigWarning::SuspiciousValue {
                    field: format!("{field}.interval_seconds"),
                    message: "retries will hammer the tool without any pause".to_string(),
                });
            }
        }
        if self.reaper.enabled && self.reaper.interval_seconds < 60 {
            warnings.push(ConfigWarning::SuspiciousValue {
                field: "reaper.interval_seconds".to_string(),
                message: format!(
                    "sweeping every {}s is unusually aggressive",
                    self.reaper.interval_seconds
                ),
            });
        }
        if self.reaper.enabled && self.reaper.max_inactivity_hours == 0 {
            warnings.push(ConfigWarning::SuspiciousValue {
                field: "reaper.max_inactivity_hours".to_string(),
                message: "terminal clusters will be evicted on the next sweep".to_string(),
            });
        }
        Ok(warnings)
    }
}
