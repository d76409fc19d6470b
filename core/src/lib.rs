//! Reprodesk Core
//!
//! Domain model for issue triage: the tracked issue and its lifecycle
//! status, the structured artifacts produced by each investigation stage,
//! the append-only audit trail, and the `Store` contract every persistence
//! backend implements.

pub mod analysis;
pub mod investigation;
pub mod issue;
pub mod plan;
pub mod status;
pub mod store;

pub use analysis::{AnalysisError, AnalysisResult, Complexity, ProblemCategory};
pub use investigation::{
    InvestigationResult, InvestigationUpdate, NewInvestigationResult, ReproductionOutcome,
};
pub use issue::{Issue, IssueId, IssueUpdate, NewIssue, OriginRef};
pub use plan::{TestFileSpec, TestPlan};
pub use status::IssueStatus;
pub use store::{Details, Store, StoreError};
