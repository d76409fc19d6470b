//! Investigation artifacts: audit entries, reproduction outcomes and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::IssueId;
use crate::status::IssueStatus;
use crate::store::Details;

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationUpdate {
    pub id: i64,
    pub issue_id: IssueId,
    pub status: IssueStatus,
    pub message: String,
    pub details: Option<Details>,
    pub timestamp: DateTime<Utc>,
}

/// What happened when the reproduction artifact ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproductionOutcome {
    /// The process completed without infrastructure failure
    pub success: bool,
    /// The reported defect was observed
    pub reproduced: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub repository_url: Option<String>,
}

impl ReproductionOutcome {
    /// Outcome for a run that never got to execute the artifact
    pub fn infrastructure_failure(stderr: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            reproduced: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: None,
            duration_ms,
            timed_out: false,
            repository_url: None,
        }
    }
}

/// Creation request for an archival result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvestigationResult {
    pub issue_id: IssueId,
    pub success: bool,
    pub reproduced: bool,
    pub test_case_path: String,
    pub repository_url: Option<String>,
    pub archive_url: Option<String>,
    pub result_summary: String,
    pub execution_time_ms: u64,
    pub maintainer_notes: Option<String>,
}

/// Archival record of one completed investigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub id: i64,
    pub issue_id: IssueId,
    pub success: bool,
    pub reproduced: bool,
    pub test_case_path: String,
    pub repository_url: Option<String>,
    pub archive_url: Option<String>,
    pub result_summary: String,
    pub execution_time_ms: u64,
    pub maintainer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InvestigationResult {
    pub fn from_new(id: i64, new: NewInvestigationResult, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            issue_id: new.issue_id,
            success: new.success,
            reproduced: new.reproduced,
            test_case_path: new.test_case_path,
            repository_url: new.repository_url,
            archive_url: new.archive_url,
            result_summary: new.result_summary,
            execution_time_ms: new.execution_time_ms,
            maintainer_notes: new.maintainer_notes,
            created_at,
        }
    }
}
