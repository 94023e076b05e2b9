//! # hangar-adapters
//!
//! Concrete integrations behind the `hangar-proto` interfaces: a shared
//! subprocess runner with live per-cluster log streaming, the Terraform and
//! Ansible adapters, and the filesystem workspace manager.

mod ansible;
pub mod runner;
mod terraform;
mod workdir;

pub use ansible::AnsiblePlaybook;
pub use runner::CommandSpec;
pub use terraform::TerraformCli;
pub use workdir::FsWorkspace;
