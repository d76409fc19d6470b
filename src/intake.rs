//! Report intake and per-conversation state
//!
//! A report is acknowledged first and investigated once the conversation
//! confirms it. Between the two the conversation lives in a
//! [`SessionTracker`] keyed by the acknowledgement message. Expiry is checked
//! lazily on lookup and by explicit sweeps; there are no timers.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use reprodesk_core::{NewIssue, OriginRef, Store, StoreError};

use crate::pipeline::{InvestigationOutcome, Investigator};
use crate::reporter::{edit_logged, reply_logged, MessageHandle, Reporter, ReporterError};

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("user {0} already has an open help session")]
    UserBusy(String),

    #[error("help session {0} has expired")]
    SessionExpired(MessageHandle),

    #[error("no help session for message {0}")]
    UnknownSession(MessageHandle),

    #[error("could not record issue: {0}")]
    Store(#[from] StoreError),

    #[error("could not acknowledge report: {0}")]
    Reporter(#[from] ReporterError),
}

/// One conversation between acknowledgement and investigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpSession {
    pub outward: MessageHandle,
    pub user_id: String,
    pub username: String,
    pub report: String,
    pub origin: OriginRef,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Live(HelpSession),
    Expired(HelpSession),
    Unknown,
}

#[derive(Debug)]
pub struct SessionTracker {
    ttl: Duration,
    sessions: HashMap<MessageHandle, HelpSession>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
    }
}

impl SessionTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, session: &HelpSession, now: DateTime<Utc>) -> bool {
        now - session.opened_at > self.ttl
    }

    /// Whether `user_id` has a session that has not expired
    pub fn is_busy(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.sessions
            .values()
            .any(|s| s.user_id == user_id && !self.is_expired(s, now))
    }

    /// Open a session unless the user already has a live one
    pub fn open(&mut self, session: HelpSession, now: DateTime<Utc>) -> Result<(), IntakeError> {
        if self.is_busy(&session.user_id, now) {
            return Err(IntakeError::UserBusy(session.user_id));
        }
        self.sessions.retain(|_, s| s.user_id != session.user_id);
        self.sessions.insert(session.outward.clone(), session);
        Ok(())
    }

    /// Find a session; an expired one is removed and reported as such
    pub fn lookup(&mut self, outward: &MessageHandle, now: DateTime<Utc>) -> Lookup {
        let Some(session) = self.sessions.get(outward) else {
            return Lookup::Unknown;
        };
        if self.is_expired(session, now) {
            match self.sessions.remove(outward) {
                Some(expired) => Lookup::Expired(expired),
                None => Lookup::Unknown,
            }
        } else {
            Lookup::Live(session.clone())
        }
    }

    pub fn close(&mut self, outward: &MessageHandle) -> Option<HelpSession> {
        self.sessions.remove(outward)
    }

    /// Drop every expired session, returning how many were removed
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, s| now - s.opened_at <= ttl);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// A report as it arrives from the chat side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundReport {
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub origin: OriginRef,
}

pub struct Intake {
    store: Arc<dyn Store>,
    investigator: Arc<Investigator>,
    sessions: Mutex<SessionTracker>,
}

impl Intake {
    pub fn new(investigator: Arc<Investigator>) -> Self {
        Self::with_tracker(investigator, SessionTracker::default())
    }

    pub fn with_tracker(investigator: Arc<Investigator>, tracker: SessionTracker) -> Self {
        Self {
            store: Arc::clone(investigator.store()),
            investigator,
            sessions: Mutex::new(tracker),
        }
    }

    pub fn investigator(&self) -> &Arc<Investigator> {
        &self.investigator
    }

    /// Acknowledge a report and open its session
    ///
    /// Returns `Ok(None)` when the user already has a session in flight.
    pub async fn receive(
        &self,
        report: InboundReport,
        reporter: &dyn Reporter,
    ) -> Result<Option<MessageHandle>, IntakeError> {
        self.receive_at(report, reporter, Utc::now()).await
    }

    pub async fn receive_at(
        &self,
        report: InboundReport,
        reporter: &dyn Reporter,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageHandle>, IntakeError> {
        if self.sessions.lock().await.is_busy(&report.user_id, now) {
            debug!(user_id = %report.user_id, "Ignoring report from busy user");
            return Ok(None);
        }

        let outward = reporter
            .reply(&format!(
                "Thanks {}, I've received your report and will start investigating it.",
                report.username
            ))
            .await?;
        self.sessions.lock().await.open(
            HelpSession {
                outward: outward.clone(),
                user_id: report.user_id,
                username: report.username,
                report: report.content,
                origin: report.origin,
                opened_at: now,
            },
            now,
        )?;
        info!(session = %outward, "Help session opened");
        Ok(Some(outward))
    }

    /// Record the issue behind `outward` and investigate it
    pub async fn begin(
        &self,
        outward: &MessageHandle,
        reporter: &dyn Reporter,
    ) -> Result<InvestigationOutcome, IntakeError> {
        self.begin_at(outward, reporter, Utc::now()).await
    }

    pub async fn begin_at(
        &self,
        outward: &MessageHandle,
        reporter: &dyn Reporter,
        now: DateTime<Utc>,
    ) -> Result<InvestigationOutcome, IntakeError> {
        let lookup = {
            let mut sessions = self.sessions.lock().await;
            let lookup = sessions.lookup(outward, now);
            if matches!(lookup, Lookup::Live(_)) {
                sessions.close(outward);
            }
            lookup
        };
        let session = match lookup {
            Lookup::Live(session) => session,
            Lookup::Expired(_) => {
                warn!(session = %outward, "Help session expired before investigation");
                reply_logged(
                    reporter,
                    "This help session has expired. Please describe your issue again.",
                )
                .await;
                return Err(IntakeError::SessionExpired(outward.clone()));
            }
            Lookup::Unknown => return Err(IntakeError::UnknownSession(outward.clone())),
        };

        let issue = self
            .store
            .create_issue(NewIssue::new(
                session.user_id,
                session.username,
                session.report,
                session.origin,
            ))
            .await?;
        info!(issue_id = issue.id, "Issue recorded");
        edit_logged(
            reporter,
            outward,
            &format!(
                "Your issue has been recorded as #{}. Starting the investigation...",
                issue.id
            ),
        )
        .await;

        Ok(self.investigator.investigate(issue, reporter, outward).await)
    }

    /// Close the session behind `outward` without investigating
    pub async fn cancel(&self, outward: &MessageHandle, reporter: &dyn Reporter) -> bool {
        let closed = self.sessions.lock().await.close(outward).is_some();
        if closed {
            edit_logged(
                reporter,
                outward,
                "Okay, I've cancelled this report. Feel free to open a new one anytime.",
            )
            .await;
        }
        closed
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let removed = self.sessions.lock().await.sweep(now);
        if removed > 0 {
            debug!(removed, "Expired help sessions swept");
        }
        removed
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
