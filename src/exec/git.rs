//! Version control calls

use std::path::Path;
use tracing::{info, warn};

use super::{ExecError, ProcessRunner, ProcessSpec};

/// `git clone <url> <target>`
///
/// Waits for git to finish; a nonzero exit is an error carrying git's
/// stderr.
pub async fn clone_repository(
    runner: &dyn ProcessRunner,
    url: &str,
    target: &Path,
) -> Result<(), ExecError> {
    info!("Cloning {url} into {}", target.display());
    let spec = ProcessSpec::new("git")
        .arg("clone")
        .arg(url)
        .arg(target.to_string_lossy());

    let mut child = runner.spawn(&spec).await?;
    let code = child.wait().await?;
    if code == Some(0) {
        return Ok(());
    }

    let stderr = child.output().stderr;
    warn!(?code, "git clone failed: {}", stderr.trim());
    Err(ExecError::CloneFailed { code, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{FakeBehavior, FakeProcessRunner};

    #[tokio::test]
    async fn test_clone_builds_git_command() {
        let runner = FakeProcessRunner::new().program("git", FakeBehavior::exit(0));
        clone_repository(&runner, "https://example.invalid/p.git", Path::new("/tmp/w/project"))
            .await
            .unwrap();

        let spawned = runner.spawned();
        assert_eq!(
            spawned[0].args,
            vec!["clone", "https://example.invalid/p.git", "/tmp/w/project"]
        );
    }

    #[tokio::test]
    async fn test_clone_failure_carries_stderr() {
        let runner = FakeProcessRunner::new().program(
            "git",
            FakeBehavior::exit(128).stderr("fatal: repository not found\n"),
        );
        let err = clone_repository(&runner, "https://example.invalid/x.git", Path::new("/tmp/x"))
            .await
            .unwrap_err();

        match err {
            ExecError::CloneFailed { code, stderr } => {
                assert_eq!(code, Some(128));
                assert!(stderr.contains("repository not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
