//! Tracked issues

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::status::IssueStatus;

pub type IssueId = i64;

/// Where the report came from on the chat side
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OriginRef {
    pub message_id: String,
    pub channel_id: String,
    /// Origin time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

/// A tracked user-reported problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub user_id: String,
    pub username: String,
    pub report: String,
    pub analysis: Option<AnalysisResult>,
    pub status: IssueStatus,
    pub origin: OriginRef,
    pub repository_url: Option<String>,
    pub test_case_path: Option<String>,
    pub recreation_steps: Option<Vec<String>>,
    pub archive_url: Option<String>,
    pub result_summary: Option<String>,
    pub assigned_maintainer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Build a stored issue from a creation request
    pub fn from_new(id: IssueId, new: NewIssue, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            username: new.username,
            report: new.report,
            analysis: new.analysis,
            status: new.status,
            origin: new.origin,
            repository_url: None,
            test_case_path: None,
            recreation_steps: None,
            archive_url: None,
            result_summary: None,
            assigned_maintainer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply every populated field of `update`
    pub fn apply(&mut self, update: IssueUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(analysis) = update.analysis {
            self.analysis = Some(analysis);
        }
        if let Some(url) = update.repository_url {
            self.repository_url = Some(url);
        }
        if let Some(path) = update.test_case_path {
            self.test_case_path = Some(path);
        }
        if let Some(steps) = update.recreation_steps {
            self.recreation_steps = Some(steps);
        }
        if let Some(url) = update.archive_url {
            self.archive_url = Some(url);
        }
        if let Some(summary) = update.result_summary {
            self.result_summary = Some(summary);
        }
        if let Some(maintainer) = update.assigned_maintainer_id {
            self.assigned_maintainer_id = Some(maintainer);
        }
        self.updated_at = now;
    }
}

/// Creation request for an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub user_id: String,
    pub username: String,
    pub report: String,
    pub analysis: Option<AnalysisResult>,
    pub status: IssueStatus,
    pub origin: OriginRef,
}

impl NewIssue {
    /// A PENDING issue without analysis
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        report: impl Into<String>,
        origin: OriginRef,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            report: report.into(),
            analysis: None,
            status: IssueStatus::Pending,
            origin,
        }
    }
}

/// Explicit partial update of the mutable issue fields
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueUpdate {
    pub status: Option<IssueStatus>,
    pub analysis: Option<AnalysisResult>,
    pub repository_url: Option<String>,
    pub test_case_path: Option<String>,
    pub recreation_steps: Option<Vec<String>>,
    pub archive_url: Option<String>,
    pub result_summary: Option<String>,
    pub assigned_maintainer_id: Option<String>,
}

impl IssueUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: IssueStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn analysis(mut self, analysis: AnalysisResult) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn repository_url(mut self, url: Option<String>) -> Self {
        self.repository_url = url;
        self
    }

    pub fn test_case_path(mut self, path: impl Into<String>) -> Self {
        self.test_case_path = Some(path.into());
        self
    }

    pub fn recreation_steps(mut self, steps: Vec<String>) -> Self {
        self.recreation_steps = Some(steps);
        self
    }

    pub fn archive_url(mut self, url: Option<String>) -> Self {
        self.archive_url = url;
        self
    }

    pub fn result_summary(mut self, summary: impl Into<String>) -> Self {
        self.result_summary = Some(summary.into());
        self
    }

    pub fn assigned_maintainer(mut self, maintainer: Option<String>) -> Self {
        self.assigned_maintainer_id = maintainer;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
