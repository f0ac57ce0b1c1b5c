//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` runs provider CLI calls with a hard deadline: on
//! timeout the child is killed rather than left to finish in the background.

use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::application::ports::CommandRunner;

/// Default deadline for a single provider call. Stack creation can take a
/// while, so this is generous.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Production `CommandRunner` backed by `tokio::process`.
///
/// `tokio::time::timeout` around `.output().await` only drops the future;
/// the process keeps running on some platforms. This implementation races
/// the wait against a sleep and kills the child explicitly.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

async fn drain<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let started = Instant::now();
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let output = tokio::select! {
            result = async {
                let (status, stdout, stderr) =
                    tokio::join!(child.wait(), drain(stdout_handle), drain(stderr_handle));
                Ok::<_, anyhow::Error>(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result?,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        };
        debug!(
            program,
            status = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis(),
            "command finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
#[cfg(unix)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let runner = TokioCommandRunner::default();
        let output = runner.run("sh", &["-c", "echo hello; exit 3"]).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_times_out() {
        let runner = TokioCommandRunner::default();
        let err = runner
            .run_with_timeout("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let runner = TokioCommandRunner::default();
        let err = runner.run("strata-no-such-program", &[]).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
