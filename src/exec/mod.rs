//! Child process execution
//!
//! `ProcessRunner` spawns children whose output is captured incrementally.
//! [`run_with_deadline`] races a child against a wall-clock deadline and
//! kills it when the deadline wins.

pub mod fake;
pub mod git;
pub mod process;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub use fake::{FakeBehavior, FakeProcessRunner};
pub use git::clone_repository;
pub use process::TokioProcessRunner;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to kill child process: {0}")]
    Kill(#[source] std::io::Error),

    #[error("git clone failed with exit code {}: {stderr}", exit_code_text(.code))]
    CloneFailed { code: Option<i32>, stderr: String },
}

fn exit_code_text(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
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

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output captured so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A running child process
#[async_trait]
pub trait ChildProcess: Send {
    /// Wait for exit; `None` when the child ended without an exit code
    async fn wait(&mut self) -> Result<Option<i32>, ExecError>;

    /// Forcibly terminate the child
    async fn kill(&mut self) -> Result<(), ExecError>;

    /// Let output capture catch up once the child is gone
    async fn drain(&mut self) {}

    /// Snapshot of captured output
    fn output(&self) -> CapturedOutput;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, ExecError>;
}

/// Result of a deadline-bounded run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output: CapturedOutput,
    pub duration: Duration,
}

/// Spawn `spec` and race it against `deadline`
///
/// The loser of the race is discarded: on timeout the child is killed and
/// `timed_out` is set; otherwise the exit code is reported. Only the exit
/// races the timer, output is drained afterwards.
pub async fn run_with_deadline(
    runner: &dyn ProcessRunner,
    spec: &ProcessSpec,
    deadline: Duration,
) -> Result<RunOutcome, ExecError> {
    let start = Instant::now();
    debug!(command = %spec.display(), ?deadline, "Spawning child process");
    let mut child = runner.spawn(spec).await?;

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = tokio::time::sleep(deadline) => None,
    };

    let (exit_code, timed_out) = match waited {
        Some(status) => (status?, false),
        None => {
            warn!(command = %spec.display(), ?deadline, "Child process timed out, killing");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out child: {e}");
            }
            (None, true)
        }
    };
    child.drain().await;

    Ok(RunOutcome {
        exit_code,
        timed_out,
        output: child.output(),
        duration: start.elapsed(),
    })
}
