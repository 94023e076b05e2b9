//! # hangar-proto
//!
//! Shared types, error definitions, and traits for the Hangar orchestrator.
//!
//! This crate provides the foundational abstractions used across all Hangar
//! crates, including:
//! - The cluster aggregate, its lifecycle states and event log
//! - Cluster definition documents
//! - Interfaces to the external infrastructure and configuration tools
//! - The working-directory manager interface

mod cluster;
mod definition;
mod status;
mod tool;
mod workspace;

pub use cluster::{Cluster, ClusterEvent, ClusterId, ClusterSnapshot, NotRunning};
pub use definition::{ClusterDefinition, DefinitionError};
pub use status::{ClusterStatus, IllegalTransition};
pub use tool::{ConfigTool, InfraTool, LOG_FILE_NAME, ToolContext, ToolError, ToolResult};
pub use workspace::{WorkspaceError, WorkspaceManager};
