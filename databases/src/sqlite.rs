//! SQLite store
//!
//! Durable `Store` backed by a single rusqlite connection shared behind a
//! mutex. Analysis, details and step lists are kept as JSON text columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use reprodesk_core::{
    AnalysisResult, Details, InvestigationResult, InvestigationUpdate, Issue, IssueId,
    IssueStatus, IssueUpdate, NewInvestigationResult, NewIssue, OriginRef, Store, StoreError,
};

const ISSUE_COLUMNS: &str = "id, user_id, username, report, analysis, status, \
     origin_message_id, origin_channel_id, origin_timestamp, repository_url, test_case_path, \
     recreation_steps, archive_url, result_summary, assigned_maintainer_id, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, issue_id, success, reproduced, test_case_path, \
     repository_url, archive_url, result_summary, execution_time_ms, maintainer_notes, created_at";

/// SQLite-backed store
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
    db_path: String,
}

/// Table sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub issues: i64,
    pub investigation_updates: i64,
    pub investigation_results: i64,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let path = db_path.as_ref().to_string_lossy().to_string();
        info!("Opening SQLite store at {path}");

        let conn = Connection::open(&path).map_err(StoreError::backend)?;
        Self::from_connection(conn, path)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::from_connection(conn, ":memory:".to_string())
    }

    fn from_connection(conn: Connection, db_path: String) -> Result<Self, StoreError> {
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StoreError::backend)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))
            .map_err(StoreError::backend)?;

        let store = Self {
            connection: Arc::new(Mutex::new(conn)),
            db_path,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        debug!("Initializing SQLite schema");
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                report TEXT NOT NULL,
                analysis TEXT,
                status TEXT NOT NULL,
                origin_message_id TEXT NOT NULL,
                origin_channel_id TEXT NOT NULL,
                origin_timestamp INTEGER NOT NULL,
                repository_url TEXT,
                test_case_path TEXT,
                recreation_steps TEXT,
                archive_url TEXT,
                result_summary TEXT,
                assigned_maintainer_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS investigation_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id INTEGER NOT NULL REFERENCES issues (id),
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS investigation_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id INTEGER NOT NULL REFERENCES issues (id),
                success INTEGER NOT NULL,
                reproduced INTEGER NOT NULL,
                test_case_path TEXT NOT NULL,
                repository_url TEXT,
                archive_url TEXT,
                result_summary TEXT NOT NULL,
                execution_time_ms INTEGER NOT NULL,
                maintainer_notes TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_issues_status ON issues (status);
            CREATE INDEX IF NOT EXISTS idx_updates_issue ON investigation_updates (issue_id);
            CREATE INDEX IF NOT EXISTS idx_results_issue ON investigation_results (issue_id);",
        )
        .map_err(StoreError::backend)?;
        Ok(())
    }

    pub fn database_path(&self) -> &str {
        &self.db_path
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<i64, StoreError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(StoreError::backend)
        };
        Ok(StoreStats {
            issues: count("issues")?,
            investigation_updates: count("investigation_updates")?,
            investigation_results: count("investigation_results")?,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))
    }

    fn load_issue(conn: &Connection, id: IssueId) -> Result<Option<Issue>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1"),
                params![id],
                IssueRow::read,
            )
            .optional()
            .map_err(StoreError::backend)?;
        row.map(IssueRow::into_issue).transpose()
    }

    fn write_issue(conn: &Connection, issue: &Issue) -> Result<(), StoreError> {
        let analysis = issue.analysis.as_ref().map(serde_json::to_string).transpose()?;
        let steps = issue
            .recreation_steps
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "UPDATE issues SET analysis = ?2, status = ?3, repository_url = ?4,
                 test_case_path = ?5, recreation_steps = ?6, archive_url = ?7,
                 result_summary = ?8, assigned_maintainer_id = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                issue.id,
                analysis,
                issue.status.as_str(),
                issue.repository_url,
                issue.test_case_path,
                steps,
                issue.archive_url,
                issue.result_summary,
                issue.assigned_maintainer_id,
                issue.updated_at.to_rfc3339(),
            ],
        )
        .map_err(StoreError::backend)?;
        Ok(())
    }

    fn issue_exists(conn: &Connection, id: IssueId) -> Result<bool, StoreError> {
        conn.query_row("SELECT 1 FROM issues WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(StoreError::backend)
    }
}

/// Raw column values of an `issues` row
struct IssueRow {
    id: IssueId,
    user_id: String,
    username: String,
    report: String,
    analysis: Option<String>,
    status: String,
    origin_message_id: String,
    origin_channel_id: String,
    origin_timestamp: i64,
    repository_url: Option<String>,
    test_case_path: Option<String>,
    recreation_steps: Option<String>,
    archive_url: Option<String>,
    result_summary: Option<String>,
    assigned_maintainer_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl IssueRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            report: row.get(3)?,
            analysis: row.get(4)?,
            status: row.get(5)?,
            origin_message_id: row.get(6)?,
            origin_channel_id: row.get(7)?,
            origin_timestamp: row.get(8)?,
            repository_url: row.get(9)?,
            test_case_path: row.get(10)?,
            recreation_steps: row.get(11)?,
            archive_url: row.get(12)?,
            result_summary: row.get(13)?,
            assigned_maintainer_id: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_issue(self) -> Result<Issue, StoreError> {
        let analysis: Option<AnalysisResult> = self
            .analysis
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let recreation_steps: Option<Vec<String>> = self
            .recreation_steps
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Issue {
            id: self.id,
            user_id: self.user_id,
            username: self.username,
            report: self.report,
            analysis,
            status: parse_status(&self.status)?,
            origin: OriginRef {
                message_id: self.origin_message_id,
                channel_id: self.origin_channel_id,
                timestamp_ms: self.origin_timestamp,
            },
            repository_url: self.repository_url,
            test_case_path: self.test_case_path,
            recreation_steps,
            archive_url: self.archive_url,
            result_summary: self.result_summary,
            assigned_maintainer_id: self.assigned_maintainer_id,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

fn parse_status(raw: &str) -> Result<IssueStatus, StoreError> {
    IssueStatus::from_str(raw).ok_or_else(|| StoreError::Corrupt(format!("unknown status '{raw}'")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn read_update(row: &Row<'_>) -> rusqlite::Result<(i64, IssueId, String, String, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn read_result(row: &Row<'_>) -> rusqlite::Result<(InvestigationResult, String)> {
    let created_at: String = row.get(10)?;
    let execution_time_ms: i64 = row.get(8)?;
    Ok((
        InvestigationResult {
            id: row.get(0)?,
            issue_id: row.get(1)?,
            success: row.get(2)?,
            reproduced: row.get(3)?,
            test_case_path: row.get(4)?,
            repository_url: row.get(5)?,
            archive_url: row.get(6)?,
            result_summary: row.get(7)?,
            execution_time_ms: execution_time_ms.max(0) as u64,
            maintainer_notes: row.get(9)?,
            created_at: Utc::now(),
        },
        created_at,
    ))
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, StoreError> {
        let now = Utc::now();
        let analysis = issue.analysis.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO issues (user_id, username, report, analysis, status,
                 origin_message_id, origin_channel_id, origin_timestamp, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                issue.user_id,
                issue.username,
                issue.report,
                analysis,
                issue.status.as_str(),
                issue.origin.message_id,
                issue.origin.channel_id,
                issue.origin.timestamp_ms,
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::backend)?;
        let id = conn.last_insert_rowid();
        debug!(issue_id = id, "Issue created");
        Ok(Issue::from_new(id, issue, now))
    }

    async fn get_issue(&self, id: IssueId) -> Result<Option<Issue>, StoreError> {
        let conn = self.conn()?;
        Self::load_issue(&conn, id)
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
        let conn = self.conn()?;
        let mut issue = Self::load_issue(&conn, id)?.ok_or(StoreError::NotFound(id))?;
        issue.apply(update, Utc::now());
        Self::write_issue(&conn, &issue)?;
        debug!(issue_id = id, status = %issue.status, "Issue updated");
        Ok(issue)
    }

    async fn append_investigation_update(
        &self,
        issue_id: IssueId,
        status: IssueStatus,
        message: &str,
        details: Option<Details>,
    ) -> Result<InvestigationUpdate, StoreError> {
        let timestamp = Utc::now();
        let details_json = details.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        if !Self::issue_exists(&conn, issue_id)? {
            return Err(StoreError::NotFound(issue_id));
        }
        conn.execute(
            "INSERT INTO investigation_updates (issue_id, status, message, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                issue_id,
                status.as_str(),
                message,
                details_json,
                timestamp.to_rfc3339()
            ],
        )
        .map_err(StoreError::backend)?;

        Ok(InvestigationUpdate {
            id: conn.last_insert_rowid(),
            issue_id,
            status,
            message: message.to_string(),
            details,
            timestamp,
        })
    }

    async fn list_investigation_updates(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationUpdate>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, issue_id, status, message, details, timestamp
                 FROM investigation_updates WHERE issue_id = ?1 ORDER BY id ASC",
            )
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map(params![issue_id], read_update)
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(id, issue_id, status, message, details, timestamp)| {
                Ok(InvestigationUpdate {
                    id,
                    issue_id,
                    status: parse_status(&status)?,
                    message,
                    details: details.as_deref().map(serde_json::from_str).transpose()?,
                    timestamp: parse_time(&timestamp)?,
                })
            })
            .collect()
    }

    async fn create_investigation_result(
        &self,
        result: NewInvestigationResult,
    ) -> Result<InvestigationResult, StoreError> {
        let created_at = Utc::now();
        let conn = self.conn()?;
        if !Self::issue_exists(&conn, result.issue_id)? {
            return Err(StoreError::NotFound(result.issue_id));
        }
        conn.execute(
            "INSERT INTO investigation_results (issue_id, success, reproduced, test_case_path,
                 repository_url, archive_url, result_summary, execution_time_ms,
                 maintainer_notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                result.issue_id,
                result.success,
                result.reproduced,
                result.test_case_path,
                result.repository_url,
                result.archive_url,
                result.result_summary,
                i64::try_from(result.execution_time_ms).unwrap_or(i64::MAX),
                result.maintainer_notes,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(StoreError::backend)?;
        let id = conn.last_insert_rowid();
        debug!(issue_id = result.issue_id, result_id = id, "Investigation result stored");
        Ok(InvestigationResult::from_new(id, result, created_at))
    }

    async fn list_investigation_results(
        &self,
        issue_id: IssueId,
    ) -> Result<Vec<InvestigationResult>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM investigation_results
                 WHERE issue_id = ?1 ORDER BY id ASC"
            ))
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map(params![issue_id], read_result)
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|(mut result, created_at)| {
                result.created_at = parse_time(&created_at)?;
                Ok(result)
            })
            .collect()
    }

    async fn list_active_issues(&self) -> Result<Vec<Issue>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ISSUE_COLUMNS} FROM issues
                 WHERE status NOT IN ('resolved', 'failed', 'needs_maintainer')
                 ORDER BY id ASC"
            ))
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map([], IssueRow::read)
            .map_err(StoreError::backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::backend)?;
        rows.into_iter().map(IssueRow::into_issue).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprodesk_core::Complexity;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn new_issue(report: &str) -> NewIssue {
        NewIssue::new(
            "user-1",
            "alice",
            report,
            OriginRef {
                message_id: "m-1".into(),
                channel_id: "c-1".into(),
                timestamp_ms: 1_700_000_000_000,
            },
        )
    }

    #[tokio::test]
    async fn test_open_creates_schema() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(temp_file.path()).unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.issues, 0);
        assert_eq!(stats.investigation_updates, 0);
        assert_eq!(stats.investigation_results, 0);
        assert_eq!(store.database_path(), temp_file.path().to_string_lossy());
    }

    #[tokio::test]
    async fn test_issue_lifecycle_persists() {
        let temp_file = NamedTempFile::new().unwrap();
        let id = {
            let store = SqliteStore::open(temp_file.path()).unwrap();
            let issue = store.create_issue(new_issue("crash on save")).await.unwrap();
            assert_eq!(issue.status, IssueStatus::Pending);

            let mut analysis = AnalysisResult::fallback();
            analysis.complexity = Complexity::High;
            store
                .update_issue_fields(
                    issue.id,
                    IssueUpdate::new()
                        .status(IssueStatus::Analyzing)
                        .analysis(analysis)
                        .recreation_steps(vec!["open".into(), "save".into()]),
                )
                .await
                .unwrap();
            issue.id
        };

        // Reopen to make sure the data is on disk
        let store = SqliteStore::open(temp_file.path()).unwrap();
        let issue = store.get_issue(id).await.unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Analyzing);
        assert_eq!(issue.analysis.unwrap().complexity, Complexity::High);
        assert_eq!(issue.recreation_steps.unwrap().len(), 2);
        assert_eq!(issue.origin.channel_id, "c-1");
    }

    #[tokio::test]
    async fn test_updates_are_appended_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issue = store.create_issue(new_issue("slow query")).await.unwrap();

        let mut details = Details::new();
        details.insert("workingDir".into(), json!("/tmp/issue-1"));
        store
            .append_investigation_update(issue.id, IssueStatus::InProgress, "started", Some(details))
            .await
            .unwrap();
        store
            .append_investigation_update(issue.id, IssueStatus::Analyzing, "analyzing", None)
            .await
            .unwrap();

        let updates = store.list_investigation_updates(issue.id).await.unwrap();
        let statuses: Vec<_> = updates.iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec![IssueStatus::InProgress, IssueStatus::Analyzing]);
        assert_eq!(
            updates[0].details.as_ref().unwrap()["workingDir"],
            json!("/tmp/issue-1")
        );
        assert!(updates[1].details.is_none());
    }

    #[tokio::test]
    async fn test_results_and_active_issues() {
        let store = SqliteStore::open_in_memory().unwrap();
        let open = store.create_issue(new_issue("open")).await.unwrap();
        let done = store.create_issue(new_issue("done")).await.unwrap();
        store
            .update_issue_status(done.id, IssueStatus::Resolved)
            .await
            .unwrap();

        let result = store
            .create_investigation_result(NewInvestigationResult {
                issue_id: done.id,
                success: true,
                reproduced: false,
                test_case_path: "/tmp/issue-2/tests".into(),
                repository_url: None,
                archive_url: Some("file:///tmp/results.json".into()),
                result_summary: "could not reproduce".into(),
                execution_time_ms: 1200,
                maintainer_notes: None,
            })
            .await
            .unwrap();
        assert!(result.id > 0);

        let results = store.list_investigation_results(done.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].execution_time_ms, 1200);
        assert!(!results[0].reproduced);

        let active: Vec<_> = store
            .list_active_issues()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(active, vec![open.id]);
    }

    #[tokio::test]
    async fn test_missing_issue_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_issue(42).await.unwrap().is_none());
        assert!(matches!(
            store.update_issue_status(42, IssueStatus::Failed).await,
            Err(StoreError::NotFound(42))
        ));
        assert!(matches!(
            store
                .append_investigation_update(42, IssueStatus::Failed, "x", None)
                .await,
            Err(StoreError::NotFound(42))
        ));
    }
}
