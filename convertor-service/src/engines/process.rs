//! Bounded, time-limited execution of engine work.

use std::future::Future;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{TransformError, TransformResult};

/// Longest stderr excerpt kept in logs
const STDERR_LOG_LIMIT: usize = 2000;

/// Shared gate for external engines: at most `max_concurrent` at once, each
/// killed after `timeout`.
#[derive(Clone)]
pub struct ProcessRunner {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    async fn acquire(&self, engine: &'static str) -> TransformResult<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransformError::engine(engine, "engine pool is closed"))
    }

    /// Run a subprocess to completion and require a zero exit status.
    ///
    /// The child is killed if the timeout elapses. Stderr is logged but kept
    /// out of the returned error, since engines echo absolute scratch paths.
    pub async fn run(&self, engine: &'static str, mut command: Command) -> TransformResult<Output> {
        let _permit = self.acquire(engine).await?;

        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(engine, "Starting engine subprocess");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                warn!(
                    engine,
                    timeout_secs = self.timeout.as_secs(),
                    "Engine subprocess timed out"
                );
                return Err(TransformError::engine(
                    engine,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            }
            Ok(Err(e)) => {
                warn!(engine, error = %e, "Engine subprocess could not be started");
                return Err(TransformError::engine(
                    engine,
                    format!("could not be started ({})", e.kind()),
                ));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                engine,
                status = %output.status,
                stderr = %truncate(stderr.trim(), STDERR_LOG_LIMIT),
                "Engine subprocess failed"
            );
            return Err(TransformError::engine(engine, output.status.to_string()));
        }

        Ok(output)
    }

    /// Run in-process async engine work under the same concurrency and time limits
    pub async fn run_bounded<T, F>(&self, engine: &'static str, work: F) -> TransformResult<T>
    where
        F: Future<Output = TransformResult<T>>,
    {
        let _permit = self.acquire(engine).await?;

        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    engine,
                    timeout_secs = self.timeout.as_secs(),
                    "Engine timed out"
                );
                Err(TransformError::engine(
                    engine,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ))
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_successful_run_returns_stdout() {
        let runner = ProcessRunner::new(2, Duration::from_secs(10));
        let output = runner.run("sh", shell("printf hello")).await.unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_engine_error() {
        let runner = ProcessRunner::new(2, Duration::from_secs(10));
        let err = runner
            .run("sh", shell("echo /secret/scratch/path >&2; exit 3"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::EngineInvocation { .. }));
        assert!(!err.to_string().contains("/secret/scratch/path"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let runner = ProcessRunner::new(1, Duration::from_secs(10));
        let command = Command::new("/nonexistent/engine-binary");
        let err = runner.run("engine", command).await.unwrap_err();
        assert!(err.to_string().contains("could not be started"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = ProcessRunner::new(1, Duration::from_millis(200));
        let started = Instant::now();
        let err = runner.run("sh", shell("sleep 10")).await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let runner = ProcessRunner::new(1, Duration::from_secs(10));
        let started = Instant::now();

        let (a, b) = tokio::join!(
            runner.run("sh", shell("sleep 0.3")),
            runner.run("sh", shell("sleep 0.3"))
        );
        a.unwrap();
        b.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_run_bounded_times_out() {
        let runner = ProcessRunner::new(1, Duration::from_millis(50));
        let result: TransformResult<()> = runner
            .run_bounded("browser", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
