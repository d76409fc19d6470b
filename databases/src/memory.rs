//! In-process store for tests and offline harness runs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use reprodesk_core::{
    Details, InvestigationResult, InvestigationUpdate, Issue, IssueId, IssueStatus, IssueUpdate,
    NewInvestigationResult, NewIssue, Store, StoreError,
};

#[derive(Default)]
struct Tables {
    issues: BTreeMap<IssueId, Issue>,
    updates: Vec<InvestigationUpdate>,
    results: Vec<InvestigationResult>,
    next_issue_id: IssueId,
    next_row_id: i64,
}

impl Tables {
    fn next_row(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }
}

/// Volatile `Store` guarded by an async read/write lock
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue_count(&self) -> usize {
        self.tables.read().await.issues.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_issue_id += 1;
        let created = Issue::from_new(tables.next_issue_id, issue, Utc::now());
        tables.issues.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError> {
        Ok(self.tables.read().await.issues.get(&id).cloned())
    }

    async fn update_issue_status(
        &self,
        id: IssueId,
        status: IssueStatus,
    ) -> Result<Issue, StoreError> {
        self.update_issue_fields(id, IssueUpdate::new().status(status))
            .await
    }

    async fn update_issue_fields(
        &self,
        id: IssueId,
        update: IssueUpdate,
    ) -> Result<Issue, StoreError> {
        let mut tables = self.tables.write().await;
        let issue = tables.issues.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        issue.apply(update, Utc::now());
        Ok(issue.clone())
    }

    async fn append_investigation_update(
        &self,
        issue_id: IssueId,
        status: IssueStatus,
        message: &str,
        details: Option<Details>,
    ) -> Result<InvestigationUpdate, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.issues.contains_key(&issue_id) {
            return Err(StoreError::NotFound(issue_id));
        }
        let update = InvestigationUpdate {
            id: tables.next_row(),
            issue_id,
            status,
            message: message.to_string(),
            details,
            timestamp: Utc::now(),
        };
        tables.updates.push(update.clone());
        Ok(update)
    }

    async fn list_investigation_updates(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationUpdate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .updates
            .iter()
            .filter(|u| u.issue_id == issue_id)
            .cloned()
            .collect())
    }

    async fn create_investigation_result(
        &self,
        result: NewInvestigationResult,
    ) -> Result<InvestigationResult, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.issues.contains_key(&result.issue_id) {
            return Err(StoreError::NotFound(result.issue_id));
        }
        let id = tables.next_row();
        let stored = InvestigationResult::from_new(id, result, Utc::now());
        tables.results.push(stored.clone());
        Ok(stored)
    }

    async fn list_investigation_results(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationResult>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.issue_id == issue_id)
            .cloned()
            .collect())
    }

    async fn list_active_issues(&self) -> Result<Vec<Issue>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .issues
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprodesk_core::OriginRef;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_writers_get_distinct_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let issue = store
                    .create_issue(NewIssue::new(
                        format!("u{n}"),
                        "user",
                        "report",
                        OriginRef::default(),
                    ))
                    .await
                    .unwrap();
                store
                    .append_investigation_update(issue.id, IssueStatus::InProgress, "go", None)
                    .await
                    .unwrap();
                issue.id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(store.issue_count().await, 16);
        for id in ids {
            assert_eq!(store.list_investigation_updates(id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_active_issues_exclude_terminals() {
        let store = MemoryStore::new();
        let a = store
            .create_issue(NewIssue::new("a", "a", "r", OriginRef::default()))
            .await
            .unwrap();
        let b = store
            .create_issue(NewIssue::new("b", "b", "r", OriginRef::default()))
            .await
            .unwrap();
        store
            .update_issue_status(b.id, IssueStatus::Failed)
            .await
            .unwrap();

        let active = store.list_active_issues().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }
}
