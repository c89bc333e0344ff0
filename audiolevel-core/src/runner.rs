//! Media Runner
//!
//! Launches the external media toolchain, streams its stdout/stderr
//! concurrently, and enforces a wall-clock deadline. A non-zero exit code is
//! not itself a Runner failure — it is handed back to the caller to
//! interpret; only a spawn failure or a deadline overrun is a `RunnerError`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("process exceeded {0:?} deadline and was killed")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStream {
    Stdout,
    Stderr,
}

/// Full captured output of one Runner invocation.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Per-line callback, invoked as chunks arrive on either stream. Used for
/// progress estimation and debugging; never required for correctness.
pub type LineCallback = Arc<dyn Fn(RunnerStream, &str) + Send + Sync>;

/// Spawn `program` with `args`, stream both output channels concurrently,
/// and enforce `deadline`. Kills and reaps the child on timeout.
pub async fn run(
    program: &str,
    args: &[String],
    env: &[(String, String)],
    deadline: Duration,
    on_line: Option<LineCallback>,
) -> Result<RunnerOutput, RunnerError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env.iter().cloned())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let (tx, mut rx) = mpsc::unbounded_channel::<(RunnerStream, String)>();

    let stdout_task = spawn_line_reader(stdout, RunnerStream::Stdout, tx.clone());
    let stderr_task = spawn_line_reader(stderr, RunnerStream::Stderr, tx);

    let collector = tokio::spawn(async move {
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        while let Some((stream, line)) = rx.recv().await {
            if let Some(cb) = &on_line {
                cb(stream, &line);
            }
            match stream {
                RunnerStream::Stdout => {
                    stdout_buf.push_str(&line);
                    stdout_buf.push('\n');
                }
                RunnerStream::Stderr => {
                    stderr_buf.push_str(&line);
                    stderr_buf.push('\n');
                }
            }
        }
        (stdout_buf, stderr_buf)
    });

    let wait_result = tokio::time::timeout(deadline, child.wait()).await;

    match wait_result {
        Ok(status) => {
            let status = status?;
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let (stdout, stderr) = collector.await.unwrap_or_default();
            Ok(RunnerOutput {
                stdout,
                stderr,
                exit_code: status.code(),
            })
        }
        Err(_) => {
            // Deadline exceeded: kill and reap before surfacing Timeout so
            // the child never outlives this call.
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            collector.abort();
            Err(RunnerError::Timeout(deadline))
        }
    }
}

fn spawn_line_reader<R>(
    reader: R,
    stream: RunnerStream,
    tx: mpsc::UnboundedSender<(RunnerStream, String)>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run(
            "sh",
            &["-c".to_string(), "echo hello; echo world 1>&2; exit 3".to_string()],
            &[],
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();

        assert!(out.stdout.contains("hello"));
        assert!(out.stderr.contains("world"));
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_a_runner_error() {
        let result = run("sh", &["-c".to_string(), "exit 1".to_string()], &[], Duration::from_secs(5), None).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().exit_code, Some(1));
    }

    #[tokio::test]
    async fn deadline_kills_and_reports_timeout() {
        let result = run(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            &[],
            Duration::from_millis(100),
            None,
        )
        .await;
        assert!(matches!(result, Err(RunnerError::Timeout(_))));
    }

    #[tokio::test]
    async fn line_callback_observes_both_streams() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let cb: LineCallback = Arc::new(move |stream, line| {
            seen2.lock().unwrap().push((stream, line.to_string()));
        });

        run(
            "sh",
            &["-c".to_string(), "echo out1; echo err1 1>&2".to_string()],
            &[],
            Duration::from_secs(5),
            Some(cb),
        )
        .await
        .unwrap();

        let lines = seen.lock().unwrap();
        assert!(lines.iter().any(|(s, l)| *s == RunnerStream::Stdout && l == "out1"));
        assert!(lines.iter().any(|(s, l)| *s == RunnerStream::Stderr && l == "err1"));
    }
}
