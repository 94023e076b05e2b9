//! Terraform adapter for the infrastructure tool interface.

use async_trait::async_trait;
use tracing::info;

use hangar_proto::{InfraTool, ToolContext, ToolError, ToolResult};

use crate::runner::{self, CommandSpec};

/// [`InfraTool`] implementation driving the `terraform` CLI.
///
/// Variables are exported as `TF_VAR_<name>` environment entries on every
/// invocation. All commands run with `-no-color` so the streamed cluster log
/// stays free of escape sequences.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
    variables: Vec<(String, String)>,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            variables: Vec::new(),
        }
    }

    /// Adds variables passed to every command as `TF_VAR_<name>`.
    pub fn with_variables<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.variables.extend(
            variables
                .into_iter()
                .map(|(key, value)| (format!("TF_VAR_{}", key.into()), value.into())),
        );
        self
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(&self.binary).args(args);
        for (key, value) in &self.variables {
            spec = spec.env(key, value);
        }
        spec
    }
}

#[async_trait]
impl InfraTool for TerraformCli {
    async fn init(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        info!(workdir = %ctx.workdir.display(), "Running terraform init");
        let spec = self.command(["init", "-input=false", "-no-color"]);
        let code = runner::run(&spec, ctx, "terraform-init").await?;
        Ok(if code == 0 {
            ToolResult::Success
        } else {
            ToolResult::Error
        })
    }

    async fn plan(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        info!(workdir = %ctx.workdir.display(), "Running terraform plan");
        let spec = self.command(["plan", "-detailed-exitcode", "-input=false", "-no-color"]);
        // -detailed-exitcode: 0 clean, 2 plan succeeded with pending changes.
        match runner::run(&spec, ctx, "terraform-plan").await? {
            0 => Ok(ToolResult::Success),
            2 => Ok(ToolResult::ChangesPresent),
            _ => Ok(ToolResult::Error),
        }
    }

    async fn apply(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        info!(workdir = %ctx.workdir.display(), "Running terraform apply");
        let spec = self.command(["apply", "-auto-approve", "-input=false", "-no-color"]);
        let code = runner::run(&spec, ctx, "terraform-apply").await?;
        Ok(if code == 0 {
            ToolResult::Success
        } else {
            ToolResult::Error
        })
    }

    async fn destroy(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        info!(workdir = %ctx.workdir.display(), "Running terraform destroy");
        let spec = self.command(["destroy", "-auto-approve", "-no-color"]);
        let code = runner::run(&spec, ctx, "terraform-destroy").await?;
        Ok(if code == 0 {
            ToolResult::Success
        } else {
            ToolResult::Error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> (TempDir, ToolContext) {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }

    // Exercised with a shell fake standing in for the terraform binary: the
    // classification only depends on the exit code.

    fn fake_terraform(dir: &TempDir, script: &str) -> String {
        let path = dir.path().join("terraform-fake");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn init_maps_zero_to_success() {
        let (dir, ctx) = context();
        let tool = TerraformCli::new(fake_terraform(&dir, "exit 0"));
        assert_eq!(tool.init(&ctx).await.unwrap(), ToolResult::Success);
    }

    #[tokio::test]
    async fn plan_distinguishes_changes_present() {
        let (dir, ctx) = context();
        let tool = TerraformCli::new(fake_terraform(&dir, "exit 2"));
        assert_eq!(tool.plan(&ctx).await.unwrap(), ToolResult::ChangesPresent);

        let tool = TerraformCli::new(fake_terraform(&dir, "exit 1"));
        assert_eq!(tool.plan(&ctx).await.unwrap(), ToolResult::Error);
    }

    #[tokio::test]
    async fn apply_exit_two_is_an_error() {
        // Only plan treats 2 specially.
        let (dir, ctx) = context();
        let tool = TerraformCli::new(fake_terraform(&dir, "exit 2"));
        assert_eq!(tool.apply(&ctx).await.unwrap(), ToolResult::Error);
    }

    #[tokio::test]
    async fn variables_reach_the_process_environment() {
        let (dir, ctx) = context();
        let fake = fake_terraform(&dir, "test \"$TF_VAR_datacenter\" = fra1");
        let tool = TerraformCli::new(fake).with_variables([("datacenter", "fra1")]);
        assert_eq!(tool.destroy(&ctx).await.unwrap(), ToolResult::Success);
    }

    #[tokio::test]
    async fn missing_binary_is_a_fault() {
        let (_dir, ctx) = context();
        let tool = TerraformCli::new("no-such-terraform-binary-4711");
        assert!(matches!(
            tool.init(&ctx).await,
            Err(ToolError::Spawn { .. })
        ));
    }
}
