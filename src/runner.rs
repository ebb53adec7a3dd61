//! External command execution.
//!
//! `ProcessRunner` spawns provider CLIs and Terraform:
//! - Blocking: stdout and stderr are read concurrently line by line, merged in
//!   arrival order, appended to the action log and returned to the caller
//! - Non-blocking: the process is detached with its output redirected into
//!   the action log; nothing is returned
//!
//! The runner never decides whether a non-zero exit is fatal. It logs the
//! failure and hands the exit code back; callers use
//! [`CommandOutput::into_result`] when a failure should abort.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::action_log::ActionLog;
use crate::errors::{LabError, LabResult};
use crate::provider::Provider;

/// A fully formed external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn to_tokio(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl std::fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Which action log a command writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Generic,
    Provider(Provider),
}

impl std::fmt::Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTarget::Generic => write!(f, "generic"),
            LogTarget::Provider(provider) => write!(f, "{}", provider.as_str()),
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Interleaved stdout and stderr. Empty for detached commands.
    pub output: String,
    /// `None` for detached commands; -1 when killed by a signal.
    pub exit_code: Option<i32>,
    pub detached: bool,
}

impl CommandOutput {
    pub fn detached() -> Self {
        Self {
            output: String::new(),
            exit_code: None,
            detached: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into `ExternalCommandFailed`.
    pub fn into_result(self, command: &ExternalCommand) -> LabResult<String> {
        if self.detached || self.success() {
            return Ok(self.output);
        }
        Err(LabError::ExternalCommandFailed {
            command: command.to_string(),
            exit_code: self.exit_code.unwrap_or(-1),
            output: self.output,
        })
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &ExternalCommand,
        target: LogTarget,
        blocking: bool,
    ) -> LabResult<CommandOutput>;
}

/// Runs commands as real child processes.
pub struct ProcessRunner {
    log: ActionLog,
}

impl ProcessRunner {
    pub fn new(log: ActionLog) -> Self {
        Self { log }
    }

    async fn run_blocking(
        &self,
        command: &ExternalCommand,
        target: LogTarget,
    ) -> LabResult<CommandOutput> {
        self.log
            .info(target, format!("Running `{}` in foreground", command));

        let mut child = command
            .to_tokio()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LabError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut merged = String::new();
        while let Some(line) = rx.recv().await {
            merged.push_str(&line);
            merged.push('\n');
        }

        let status = child.wait().await.map_err(|source| LabError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let exit_code = status.code().unwrap_or(-1);

        if let Err(err) = self.log.append_output(target, &merged) {
            tracing::warn!(error = %err, "failed to append command output");
        }
        if status.success() {
            tracing::debug!(%command, "command succeeded");
        } else {
            self.log.error(
                target,
                format!("Error running `{}` (exit code {})", command, exit_code),
            );
        }

        Ok(CommandOutput {
            output: merged,
            exit_code: Some(exit_code),
            detached: false,
        })
    }

    fn spawn_detached(
        &self,
        command: &ExternalCommand,
        target: LogTarget,
    ) -> LabResult<CommandOutput> {
        let stdout = self.log.open(target)?;
        let path = self.log.path(target);
        let stderr = stdout.try_clone().map_err(|e| LabError::io(path, e))?;

        let mut cmd = std::process::Command::new(command.program());
        cmd.args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }

        // The child is intentionally not waited on; it outlives this call.
        cmd.spawn().map_err(|source| LabError::Spawn {
            command: command.to_string(),
            source,
        })?;

        self.log
            .info(target, format!("Running `{}` in background", command));
        Ok(CommandOutput::detached())
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                // Provider CLIs occasionally emit non-UTF-8 bytes; keep the line.
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read command output");
                break;
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &ExternalCommand,
        target: LogTarget,
        blocking: bool,
    ) -> LabResult<CommandOutput> {
        if blocking {
            self.run_blocking(command, target).await
        } else {
            self.spawn_detached(command, target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> (ProcessRunner, ActionLog) {
        let log = ActionLog::new(dir.path());
        (ProcessRunner::new(log.clone()), log)
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let cmd = ExternalCommand::new("terraform")
            .args(["apply", "-auto-approve"])
            .arg("-var")
            .arg("tags=team a");
        assert_eq!(
            cmd.to_string(),
            "terraform apply -auto-approve -var 'tags=team a'"
        );
    }

    #[test]
    fn test_into_result_maps_failure() {
        let cmd = ExternalCommand::new("aws").arg("eks");
        let failed = CommandOutput {
            output: "boom".into(),
            exit_code: Some(254),
            detached: false,
        };
        match failed.into_result(&cmd) {
            Err(LabError::ExternalCommandFailed {
                command,
                exit_code,
                output,
            }) => {
                assert_eq!(command, "aws eks");
                assert_eq!(exit_code, 254);
                assert_eq!(output, "boom");
            }
            other => panic!("Expected ExternalCommandFailed, got {:?}", other),
        }
        assert!(CommandOutput::detached().into_result(&cmd).is_ok());
    }

    #[tokio::test]
    async fn test_blocking_run_captures_both_streams() {
        let dir = TempDir::new().unwrap();
        let (runner, log) = runner(&dir);
        let cmd = ExternalCommand::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2");

        let output = runner.run(&cmd, LogTarget::Generic, true).await.unwrap();

        assert!(output.success());
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
        let logged = log.read(LogTarget::Generic).unwrap();
        assert!(logged.contains("in foreground"));
        assert!(logged.contains("out\n"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_logged_not_raised() {
        let dir = TempDir::new().unwrap();
        let (runner, log) = runner(&dir);
        let cmd = ExternalCommand::new("sh").arg("-c").arg("exit 3");
        let target = LogTarget::Provider(Provider::Aws);

        let output = runner.run(&cmd, target, true).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        let logged = log.read(target).unwrap();
        assert!(logged.contains("ERROR Error running `sh -c 'exit 3'` (exit code 3)"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_truncate_output() {
        let dir = TempDir::new().unwrap();
        let (runner, log) = runner(&dir);
        let cmd = ExternalCommand::new("sh")
            .arg("-c")
            .arg("printf 'before\\n\\377bad\\nafter\\n'");

        let output = runner.run(&cmd, LogTarget::Generic, true).await.unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.output, "before\n\u{FFFD}bad\nafter\n");
        assert!(log.read(LogTarget::Generic).unwrap().contains("after\n"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let (runner, _log) = runner(&dir);
        let cmd = ExternalCommand::new("kubelab-definitely-not-installed");
        let result = runner.run(&cmd, LogTarget::Generic, true).await;
        assert!(matches!(result, Err(LabError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_detached_run_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let (runner, log) = runner(&dir);
        let cmd = ExternalCommand::new("sh").arg("-c").arg("sleep 0");

        let output = runner.run(&cmd, LogTarget::Generic, false).await.unwrap();

        assert!(output.detached);
        assert_eq!(output.exit_code, None);
        assert!(log.read(LogTarget::Generic).unwrap().contains("in background"));
    }

    #[tokio::test]
    async fn test_working_dir_is_honoured() {
        let dir = TempDir::new().unwrap();
        let (runner, _log) = runner(&dir);
        let cmd = ExternalCommand::new("pwd").current_dir(dir.path());
        let output = runner.run(&cmd, LogTarget::Generic, true).await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(output.output.trim())
                .canonicalize()
                .unwrap(),
            expected
        );
    }
}
