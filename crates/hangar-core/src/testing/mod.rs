//! Test support: scripted tool doubles and a temp-dir workspace.
//!
//! Public so that integration suites and downstream crates can exercise the
//! orchestrator without touching real Terraform, Ansible, or a configured
//! workspace tree.

mod scripted_tools;
mod temp_workspace;

pub use scripted_tools::{errors, ScriptedConfigTool, ScriptedInfraTool};
pub use temp_workspace::TempWorkspace;
