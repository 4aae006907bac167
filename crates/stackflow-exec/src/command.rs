//! External command invocation
//!
//! The command receives the action (`provision` / `destroy`) as its last
//! argument and the request as JSON on stdin. On success it prints a JSON
//! object of outputs on stdout (empty stdout means no outputs).

use crate::error::{ExecError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// stderr lines kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// How to run one provisioner command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory (defaults to the current directory)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Kill the command after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run the command for `action`, feeding `stdin`, and return its stdout
    ///
    /// The child is killed when `cancel` fires or the timeout elapses.
    pub async fn run(
        &self,
        action: &str,
        stdin: &[u8],
        extra_env: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(action)
            .envs(&self.env)
            .envs(extra_env.iter().copied())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(command = %self.command, args = ?self.args, action, "Running provisioner command");
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let timeout = self
            .timeout_secs
            .map_or(Duration::MAX, Duration::from_secs);

        // stdin is written alongside draining stdout/stderr so a child that
        // never reads its request still hits the timeout and cancellation
        let finished = async {
            tokio::join!(
                write_stdin(stdin_pipe, stdin),
                child.wait(),
                read_pipe(stdout),
                read_pipe(stderr)
            )
        };

        let (written, status, stdout, stderr) = tokio::select! {
            result = tokio::time::timeout(timeout, finished) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(ExecError::Timeout {
                        command: self.command.clone(),
                        secs: self.timeout_secs.unwrap_or_default(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ExecError::Cancelled { command: self.command.clone() });
            }
        };

        let status = status?;
        let stderr = stderr.map_err(|source| self.pipe_error("stderr", source))?;
        let stderr = String::from_utf8_lossy(&stderr);
        if !status.success() {
            return Err(ExecError::Exited {
                command: self.command.clone(),
                status: status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            });
        }
        written.map_err(|source| self.pipe_error("stdin", source))?;
        let stdout = stdout.map_err(|source| self.pipe_error("stdout", source))?;
        String::from_utf8(stdout).map_err(|source| ExecError::InvalidUtf8 {
            command: self.command.clone(),
            source,
        })
    }

    fn pipe_error(&self, stream: &'static str, source: std::io::Error) -> ExecError {
        ExecError::Pipe {
            command: self.command.clone(),
            stream,
            source,
        }
    }
}

async fn write_stdin(pipe: Option<ChildStdin>, data: &[u8]) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    match pipe.write_all(data).await {
        // commands that ignore stdin may exit before reading it
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn read_pipe(pipe: Option<impl AsyncRead + Unpin>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
