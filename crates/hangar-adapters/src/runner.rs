//! Shared subprocess runner with live log streaming.
//!
//! Both tool adapters funnel through [`run`]: spawn the command in the
//! cluster's working directory, drain stdout and stderr concurrently (a
//! sequential read would deadlock once the unread pipe's buffer fills), and
//! append every line to the per-cluster log file prefixed with a timestamp
//! and the stage label. The exit code comes back for per-variant
//! classification; spawn and stream faults surface as [`ToolError`].

use std::process::Stdio;

use chrono::{SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use hangar_proto::{ToolContext, ToolError};

/// One external command, fully specified.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Environment entry merged into the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Runs the command in `ctx.workdir`, streaming combined output to the
/// cluster log, and returns the exit code.
///
/// The log file is opened in append mode (created if missing, never
/// truncated) so successive stages share one chronological record. Both
/// pipes are fully drained before this returns.
///
/// # Errors
/// [`ToolError::Spawn`] when the command cannot be launched at all,
/// [`ToolError::Stream`] for I/O faults on the pipes or the log file. Both
/// are fatal to the stage; they are never folded into an exit code.
pub async fn run(spec: &CommandSpec, ctx: &ToolContext, stage: &str) -> Result<i32, ToolError> {
    debug!(
        program = %spec.program,
        args = ?spec.args,
        workdir = %ctx.workdir.display(),
        stage,
        "Spawning tool subprocess"
    );

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.env.iter().cloned())
        .current_dir(&ctx.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    let log = Mutex::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ctx.log_path)
            .await?,
    );

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::try_join!(
        drain(stdout, &log, stage),
        drain(stderr, &log, stage)
    )?;

    let status = child.wait().await?;
    let exit_code = status.code().unwrap_or(-1);
    append_line(&log, stage, &format!("process exited with code {exit_code}")).await?;

    debug!(program = %spec.program, stage, exit_code, "Tool subprocess finished");
    Ok(exit_code)
}

async fn drain<R>(stream: Option<R>, log: &Mutex<File>, stage: &str) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(());
    };
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        append_line(log, stage, &line).await?;
    }
    Ok(())
}

async fn append_line(log: &Mutex<File>, stage: &str, line: &str) -> std::io::Result<()> {
    let entry = format!(
        "[{}][{}] {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        stage,
        line
    );
    let mut file = log.lock().await;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
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

    #[tokio::test]
    async fn captures_exit_code_zero() {
        let (_dir, ctx) = context();
        let spec = CommandSpec::new("sh").arg("-c").arg("echo hello");
        assert_eq!(run(&spec, &ctx, "test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn captures_nonzero_exit_codes() {
        let (_dir, ctx) = context();
        let spec = CommandSpec::new("sh").arg("-c").arg("exit 2");
        assert_eq!(run(&spec, &ctx, "test").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn log_lines_carry_timestamp_and_stage_prefix() {
        let (_dir, ctx) = context();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo out-line; echo err-line >&2");
        run(&spec, &ctx, "infra-plan").await.unwrap();

        let log = std::fs::read_to_string(&ctx.log_path).unwrap();
        let out = log.lines().find(|l| l.ends_with("out-line")).unwrap();
        assert!(out.contains("][infra-plan] "), "bad prefix in '{out}'");
        // ISO-8601 UTC timestamp in the first bracket pair.
        let timestamp = &out[1..out.find(']').unwrap()];
        assert!(timestamp.ends_with('Z'), "not a UTC timestamp: {timestamp}");
        // Both streams are captured.
        assert!(log.lines().any(|l| l.ends_with("err-line")));
    }

    #[tokio::test]
    async fn log_appends_across_invocations() {
        let (_dir, ctx) = context();
        let first = CommandSpec::new("sh").arg("-c").arg("echo first");
        let second = CommandSpec::new("sh").arg("-c").arg("echo second");
        run(&first, &ctx, "stage-a").await.unwrap();
        run(&second, &ctx, "stage-b").await.unwrap();

        let log = std::fs::read_to_string(&ctx.log_path).unwrap();
        let first_at = log.find("first").unwrap();
        let second_at = log.find("second").unwrap();
        assert!(first_at < second_at);
    }

    #[tokio::test]
    async fn environment_is_merged_not_replaced() {
        let (_dir, ctx) = context();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo var=$HANGAR_TEST_VAR; test -n \"$PATH\"")
            .env("HANGAR_TEST_VAR", "42");
        assert_eq!(run(&spec, &ctx, "env").await.unwrap(), 0);

        let log = std::fs::read_to_string(&ctx.log_path).unwrap();
        assert!(log.contains("var=42"));
    }

    #[tokio::test]
    async fn spawn_failure_is_a_fault_not_an_exit_code() {
        let (_dir, ctx) = context();
        let spec = CommandSpec::new("definitely-not-a-real-binary-4711");
        let err = run(&spec, &ctx, "test").await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn large_interleaved_output_does_not_deadlock() {
        let (_dir, ctx) = context();
        // Enough output on both streams to overflow a pipe buffer if one
        // side were drained only after the other finished.
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("i=0; while [ $i -lt 2000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done");
        assert_eq!(run(&spec, &ctx, "bulk").await.unwrap(), 0);

        let log = std::fs::read_to_string(&ctx.log_path).unwrap();
        assert!(log.contains("line-1999"));
        assert!(log.contains("err-1999"));
    }
}
