//! Scripted process runner for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{CapturedOutput, ChildProcess, ExecError, ProcessRunner, ProcessSpec};

/// How a fake child behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBehavior {
    exit_code: Option<i32>,
    hang: bool,
    delay: Duration,
    spawn_error: Option<String>,
    stdout: String,
    stderr: String,
}

impl FakeBehavior {
    /// Exit immediately with `code`
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            hang: false,
            delay: Duration::ZERO,
            spawn_error: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Never exit on its own
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::exit(0)
        }
    }

    /// Fail at spawn time, as a missing executable would
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::exit(0)
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = text.into();
        self
    }

    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }
}

/// Process runner keyed by program name
///
/// Programs without a behavior fail to spawn.
#[derive(Default)]
pub struct FakeProcessRunner {
    behaviors: HashMap<String, FakeBehavior>,
    spawned: Mutex<Vec<ProcessSpec>>,
    kills: Arc<AtomicUsize>,
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<String>, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(program.into(), behavior);
        self
    }

    /// Every spec passed to `spawn`, including failed spawns
    pub fn spawned(&self) -> Vec<ProcessSpec> {
        self.spawned.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of children killed
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, ExecError> {
        if let Ok(mut spawned) = self.spawned.lock() {
            spawned.push(spec.clone());
        }

        let behavior = self.behaviors.get(&spec.program).cloned().unwrap_or_else(|| {
            FakeBehavior::spawn_error(format!("{}: command not found", spec.program))
        });
        if let Some(message) = &behavior.spawn_error {
            return Err(ExecError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, message.clone()),
            });
        }

        Ok(Box::new(FakeChild {
            output: CapturedOutput {
                stdout: behavior.stdout.clone(),
                stderr: behavior.stderr.clone(),
            },
            behavior,
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct FakeChild {
    behavior: FakeBehavior,
    output: CapturedOutput,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ChildProcess for FakeChild {
    async fn wait(&mut self) -> Result<Option<i32>, ExecError> {
        if self.behavior.hang {
            std::future::pending::<()>().await;
        }
        if !self.behavior.delay.is_zero() {
            tokio::time::sleep(self.behavior.delay).await;
        }
        Ok(self.behavior.exit_code)
    }

    async fn kill(&mut self) -> Result<(), ExecError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn output(&self) -> CapturedOutput {
        self.output.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::run_with_deadline;

    #[tokio::test]
    async fn test_scripted_exit_and_output() {
        let runner = FakeProcessRunner::new()
            .program("ts-node", FakeBehavior::exit(1).stdout("ran\n").stderr("boom\n"));
        let spec = ProcessSpec::new("ts-node").arg("issue-test.ts");
        let outcome = run_with_deadline(&runner, &spec, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(outcome.output.stdout, "ran\n");
        assert_eq!(outcome.output.stderr, "boom\n");
        assert_eq!(runner.spawned(), vec![spec]);
    }

    #[tokio::test]
    async fn test_hang_is_killed() {
        let runner = FakeProcessRunner::new().program("ts-node", FakeBehavior::hang());
        let outcome = run_with_deadline(
            &runner,
            &ProcessSpec::new("ts-node"),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(runner.kills(), 1);
    }

    #[tokio::test]
    async fn test_unknown_program_fails_to_spawn() {
        let runner = FakeProcessRunner::new();
        let result = runner.spawn(&ProcessSpec::new("git")).await;
        assert!(matches!(result, Err(ExecError::Spawn { .. })));
        assert_eq!(runner.spawned().len(), 1);
    }
}
