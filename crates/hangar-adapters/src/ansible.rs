//! Ansible adapter for the configuration tool interface.

use async_trait::async_trait;
use tracing::info;

use hangar_proto::{ConfigTool, ToolContext, ToolError, ToolResult};

use crate::runner::{self, CommandSpec};

/// [`ConfigTool`] implementation driving `ansible-playbook`.
///
/// Provisioning and deprovisioning run different playbooks out of the
/// cluster's working directory; classification is binary on the exit code.
#[derive(Debug, Clone)]
pub struct AnsiblePlaybook {
    binary: String,
    provision_playbook: String,
    deprovision_playbook: String,
    extra_args: Vec<String>,
}

impl AnsiblePlaybook {
    pub fn new(
        binary: impl Into<String>,
        provision_playbook: impl Into<String>,
        deprovision_playbook: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            provision_playbook: provision_playbook.into(),
            deprovision_playbook: deprovision_playbook.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments inserted before the playbook, e.g. `--private-key`.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    async fn run_playbook(
        &self,
        ctx: &ToolContext,
        playbook: &str,
        stage: &str,
    ) -> Result<ToolResult, ToolError> {
        info!(workdir = %ctx.workdir.display(), playbook, "Running ansible-playbook");
        let spec = CommandSpec::new(&self.binary)
            .args(self.extra_args.iter().cloned())
            .arg(playbook);
        let code = runner::run(&spec, ctx, stage).await?;
        Ok(if code == 0 {
            ToolResult::Success
        } else {
            ToolResult::Error
        })
    }
}

#[async_trait]
impl ConfigTool for AnsiblePlaybook {
    async fn provision(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.run_playbook(ctx, &self.provision_playbook, "ansible-provision")
            .await
    }

    async fn deprovision(&self, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.run_playbook(ctx, &self.deprovision_playbook, "ansible-deprovision")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_ansible(dir: &TempDir) -> String {
        // Succeeds only for the provision playbook, so the two operations
        // are distinguishable in tests.
        let path = dir.path().join("ansible-fake");
        std::fs::write(
            &path,
            "#!/bin/sh\nfor last; do :; done\ntest \"$last\" = playbooks/provision.yml\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn provision_and_deprovision_use_their_playbooks() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path());
        let tool = AnsiblePlaybook::new(
            fake_ansible(&dir),
            "playbooks/provision.yml",
            "playbooks/deprovision.yml",
        );

        assert_eq!(tool.provision(&ctx).await.unwrap(), ToolResult::Success);
        assert_eq!(tool.deprovision(&ctx).await.unwrap(), ToolResult::Error);
    }

    #[tokio::test]
    async fn extra_args_precede_the_playbook() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path());
        let path = dir.path().join("args-fake");
        std::fs::write(
            &path,
            "#!/bin/sh\ntest \"$1\" = --check && test \"$2\" = playbooks/provision.yml\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let tool = AnsiblePlaybook::new(
            path.to_string_lossy().into_owned(),
            "playbooks/provision.yml",
            "playbooks/deprovision.yml",
        )
        .with_extra_args(["--check"]);
        assert_eq!(tool.provision(&ctx).await.unwrap(), ToolResult::Success);
    }
}
