//! Persistence contract
//!
//! Implementations must be durable and safe under concurrent callers.
//! Generated identifiers and timestamps are echoed back in the returned
//! records.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::investigation::{InvestigationResult, InvestigationUpdate, NewInvestigationResult};
use crate::issue::{Issue, IssueId, IssueUpdate, NewIssue};
use crate::status::IssueStatus;

/// Open-ended JSON details map
pub type Details = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("issue {0} not found")]
    NotFound(IssueId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new issue and return it with its generated id
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, StoreError>;

    async fn get_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError>;

    async fn update_issue_status(
        &self,
        id: IssueId,
        status: IssueStatus,
    ) -> Result<Issue, StoreError>;

    async fn update_issue_fields(
        &self,
        id: IssueId,
        update: IssueUpdate,
    ) -> Result<Issue, StoreError>;

    /// Append an audit entry; entries are never mutated afterwards
    async fn append_investigation_update(
        &self,
        issue_id: IssueId,
        status: IssueStatus,
        message: &str,
        details: Option<Details>,
    ) -> Result<InvestigationUpdate, StoreError>;

    /// Audit entries for an issue, oldest first
    async fn list_investigation_updates(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationUpdate>, StoreError>;

    async fn create_investigation_result(
        &self,
        result: NewInvestigationResult,
    ) -> Result<InvestigationResult, StoreError>;

    async fn list_investigation_results(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationResult>, StoreError>;

    /// Issues whose status is not terminal
    async fn list_active_issues(&self) -> Result<Vec<Issue>, StoreError>;
}
