//! Process runner: spawns external commands with captured output and a
//! per-call timeout.
//!
//! Arguments are always passed as a discrete vector; nothing is ever routed
//! through a shell, so caller-supplied text stays an opaque argument and can
//! never splice into the command line.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Normalized outcome of one external command invocation.
///
/// Either fully populated or the call failed before producing one; a timeout
/// or spawn failure yields a `RunnerError`, never a partial result.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// Shell-quoted command line, for display and logging only.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was killed by a signal.
    pub exit_code: i32,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
    /// `exit_code == 0`.
    pub ok: bool,
}

impl CommandResult {
    /// Plain-text rendering used by the HTTP layer: the command line, then
    /// the exit status, then both streams, each under its own marker.
    pub fn render_text(&self) -> String {
        let mut out = format!("$ {}\n", self.command);
        match self.signal {
            Some(sig) => out.push_str(&format!("exit={} signal={}\n", self.exit_code, sig)),
            None => out.push_str(&format!("exit={}\n", self.exit_code)),
        }
        out.push_str("--- stdout ---\n");
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("--- stderr ---\n");
        out.push_str(&self.stderr);
        if !self.stderr.is_empty() && !self.stderr.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the process and fail the call if it has not exited by then.
    pub timeout: Option<Duration>,
    /// Text written to the child's stdin before waiting.
    pub stdin: Option<String>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            stdin: None,
        }
    }
}

/// Seam for everything that invokes external commands.
///
/// The daemon uses [`ProcessRunner`]; tests substitute a scripted
/// implementation to exercise routing, policy and reconciliation without
/// spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        opts: RunOptions,
    ) -> Result<CommandResult, RunnerError>;
}

/// Shell-quoted command line for display.
pub fn display_command(program: &str, args: &[String]) -> String {
    shell_words::join(std::iter::once(program).chain(args.iter().map(|s| s.as_str())))
}

/// Real implementation backed by `tokio::process`.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        opts: RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        let cmdline = display_command(program, args);
        debug!(target: "runner", command = %cmdline, "spawning");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: cmdline.clone(),
            source,
        })?;

        if let Some(text) = &opts.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // The child may exit before reading everything; EPIPE here is
                // an outcome for the exit status to report, not an error.
                let _ = stdin.write_all(text.as_bytes()).await;
                drop(stdin);
            }
        }

        // Drain both pipes concurrently while waiting so a chatty child can
        // never deadlock on a full pipe buffer.
        let stdout_task = drain_pipe(child.stdout.take());
        let stderr_task = drain_pipe(child.stderr.take());

        let status = match opts.timeout {
            Some(timeout) if !timeout.is_zero() => {
                match tokio::time::timeout(timeout, child.wait()).await {
                    Ok(waited) => waited.map_err(|source| RunnerError::Io {
                        command: cmdline.clone(),
                        source,
                    })?,
                    Err(_) => {
                        let _ = child.start_kill();
                        let _ = child.wait().await; // reap, no zombie
                        return Err(RunnerError::Timeout {
                            command: cmdline,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                }
            }
            _ => child.wait().await.map_err(|source| RunnerError::Io {
                command: cmdline.clone(),
                source,
            })?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            target: "runner",
            command = %cmdline,
            exit_code,
            signal = ?signal,
            "finished"
        );

        Ok(CommandResult {
            command: cmdline,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            signal,
            ok: status.success(),
        })
    }
}

fn drain_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}
