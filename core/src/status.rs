//! Issue lifecycle status
//!
//! Progression is forward-only:
//!
//! ```text
//! PENDING → IN_PROGRESS → ANALYZING → TESTING → RESOLVED | NEEDS_MAINTAINER
//!                 └──────────┴───────────┴──→ FAILED
//! ```
//!
//! RESOLVED and NEEDS_MAINTAINER are success terminals, FAILED is the
//! failure terminal. Nothing leaves a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a tracked issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Created, no investigation started yet
    Pending,
    /// Investigation accepted and running
    InProgress,
    /// Report analysis and planning
    Analyzing,
    /// Reproduction in an isolated environment
    Testing,
    /// Investigation finished without confirming the defect
    Resolved,
    /// Investigation aborted by an unrecoverable error
    Failed,
    /// Defect reproduced, a human has to take over
    NeedsMaintainer,
}

impl IssueStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [IssueStatus; 7] = [
        IssueStatus::Pending,
        IssueStatus::InProgress,
        IssueStatus::Analyzing,
        IssueStatus::Testing,
        IssueStatus::Resolved,
        IssueStatus::Failed,
        IssueStatus::NeedsMaintainer,
    ];

    /// Stable storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Analyzing => "analyzing",
            IssueStatus::Testing => "testing",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Failed => "failed",
            IssueStatus::NeedsMaintainer => "needs_maintainer",
        }
    }

    /// Parse the storage representation
    pub fn from_str(s: &str) -> Option<Self> {
        IssueStatus::ALL.iter().copied().find(|st| st.as_str() == s)
    }

    /// RESOLVED, NEEDS_MAINTAINER or FAILED
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IssueStatus::Resolved | IssueStatus::Failed | IssueStatus::NeedsMaintainer
        )
    }

    /// RESOLVED or NEEDS_MAINTAINER
    pub fn is_success_terminal(&self) -> bool {
        matches!(self, IssueStatus::Resolved | IssueStatus::NeedsMaintainer)
    }

    fn rank(&self) -> u8 {
        match self {
            IssueStatus::Pending => 0,
            IssueStatus::InProgress => 1,
            IssueStatus::Analyzing => 2,
            IssueStatus::Testing => 3,
            IssueStatus::Resolved | IssueStatus::Failed | IssueStatus::NeedsMaintainer => 4,
        }
    }

    /// Whether `next` is a legal forward move from `self`
    ///
    /// FAILED is reachable from every non-terminal state. Success
    /// terminals are only reachable from TESTING.
    pub fn can_advance_to(&self, next: IssueStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            IssueStatus::Failed => true,
            IssueStatus::Resolved | IssueStatus::NeedsMaintainer => {
                *self == IssueStatus::Testing
            }
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
