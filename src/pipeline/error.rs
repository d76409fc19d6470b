//! Unrecoverable investigation errors

use reprodesk_core::{IssueStatus, StoreError};
use thiserror::Error;

use crate::exec::ExecError;

/// Anything that aborts an investigation
///
/// Recoverable model-output problems never become a `PipelineError`; the
/// stages replace them with fallbacks.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store operation failed")]
    Store(#[from] StoreError),

    #[error("could not clone project repository")]
    Clone(#[source] ExecError),

    #[error("process execution failed")]
    Exec(#[from] ExecError),

    #[error("working directory I/O failed")]
    Io(#[from] std::io::Error),

    #[error("serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: IssueStatus, to: IssueStatus },
}

/// Render an error and its whole `source()` chain, one cause per line
pub fn format_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\n  caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
