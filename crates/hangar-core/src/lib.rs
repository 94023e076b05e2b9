//! # hangar-core
//!
//! Orchestration engine for Hangar: the cluster registry, the bounded retry
//! executor, the create/delete workflows, and the stale-cluster reaper.
//!
//! The engine is transport-agnostic. It consumes the tool and workspace
//! interfaces from `hangar-proto` and exposes the orchestrator API surface
//! (`create`, `delete`, `get`, `list`, `acknowledge`, artifact readers) to
//! whatever front end embeds it.

pub mod config;
pub mod orchestrator;
pub mod reaper;
pub mod registry;
pub mod retry;
pub mod testing;

pub use config::{ConfigError, ConfigWarning, HangarConfig};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use reaper::Reaper;
pub use registry::{AdmissionError, ClusterRegistry};
pub use retry::RetryPolicy;
