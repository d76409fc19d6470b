//! Real child processes via `tokio::process`

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{CapturedOutput, ChildProcess, ExecError, ProcessRunner, ProcessSpec};

/// Grace period for reader tasks to drain pipes after exit
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, ExecError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let output = Arc::new(Mutex::new(CapturedOutput::default()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(capture_lines(stdout, Arc::clone(&output), Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(capture_lines(stderr, Arc::clone(&output), Stream::Stderr));
        }

        Ok(Box::new(TokioChild {
            child,
            output,
            readers,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn capture_lines<R>(
    reader: R,
    output: Arc<Mutex<CapturedOutput>>,
    stream: Stream,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match stream {
                Stream::Stdout => debug!(target: "reprodesk::child", "stdout: {line}"),
                Stream::Stderr => debug!(target: "reprodesk::child", "stderr: {line}"),
            }
            if let Ok(mut out) = output.lock() {
                let buf = match stream {
                    Stream::Stdout => &mut out.stdout,
                    Stream::Stderr => &mut out.stderr,
                };
                buf.push_str(&line);
                buf.push('\n');
            }
        }
    })
}

struct TokioChild {
    child: Child,
    output: Arc<Mutex<CapturedOutput>>,
    readers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl ChildProcess for TokioChild {
    async fn wait(&mut self) -> Result<Option<i32>, ExecError> {
        let status = self.child.wait().await.map_err(ExecError::Wait)?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        self.child.kill().await.map_err(ExecError::Kill)
    }

    /// Background jobs may keep the pipes open past exit
    async fn drain(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader).await;
        }
    }

    fn output(&self) -> CapturedOutput {
        self.output.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::run_with_deadline;

    #[tokio::test]
    async fn test_captures_both_streams() {
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; exit 3");
        let outcome = run_with_deadline(&TokioProcessRunner, &spec, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert_eq!(outcome.output.stdout, "out\n");
        assert_eq!(outcome.output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_kills_on_deadline() {
        let spec = ProcessSpec::new("sleep").arg("30");
        let started = std::time::Instant::now();
        let outcome = run_with_deadline(&TokioProcessRunner, &spec, Duration::from_millis(200))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = std::collections::BTreeMap::new();
        env.insert("REPRODESK_PROBE".to_string(), "yes".to_string());
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("pwd; echo $REPRODESK_PROBE")
            .cwd(dir.path())
            .envs(&env);
        let outcome = run_with_deadline(&TokioProcessRunner, &spec, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.output.stdout.ends_with("yes\n"));
    }

    #[tokio::test]
    async fn test_exit_wins_while_background_job_holds_pipes() {
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("echo done; sleep 3 & exit 0");
        let outcome = run_with_deadline(&TokioProcessRunner, &spec, Duration::from_millis(300))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
        assert_eq!(outcome.output.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = ProcessSpec::new("reprodesk-definitely-not-installed");
        let err = run_with_deadline(&TokioProcessRunner, &spec, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
