//! Lifecycle and counters of one crawl run
//!
//! Counters are atomics so concurrent workers can bump them without a
//! lock. The stored row is written at `begin`, at periodic checkpoints and
//! once more at `end`; a second `end` is rejected.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crawling::error::CrawlError;
use crate::domain::{CrawlScope, CrawlSession, SessionKind, SessionStatus};
use crate::infrastructure::ReviewRepository;

pub struct SessionTracker {
    repository: ReviewRepository,
    session_id: String,
    kind: SessionKind,
    scope: String,
    started_at: DateTime<Utc>,
    pages_processed: AtomicU64,
    records_found: AtomicU64,
    records_saved: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
    ended: AtomicBool,
}

impl SessionTracker {
    /// Open a session and persist it as `running`
    pub async fn begin(repository: ReviewRepository, kind: SessionKind, scope: &CrawlScope) -> Result<Self> {
        let tracker = Self {
            repository,
            session_id: Uuid::new_v4().to_string(),
            kind,
            scope: scope.to_string(),
            started_at: Utc::now(),
            pages_processed: AtomicU64::new(0),
            records_found: AtomicU64::new(0),
            records_saved: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
            ended: AtomicBool::new(false),
        };
        tracker.repository.write_session(&tracker.snapshot()).await?;
        info!("🚀 Session {} started: {} ({})", tracker.session_id, kind, tracker.scope);
        Ok(tracker)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn record_page(&self) {
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_found(&self, count: u64) {
        self.records_found.fetch_add(count, Ordering::Relaxed);
    }

    /// Saved never overtakes found; callers record what they found first
    pub fn record_saved(&self, count: u64) {
        let found = self.records_found.load(Ordering::Acquire);
        let _ = self
            .records_saved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |saved| {
                Some(saved.saturating_add(count).min(found.max(saved)))
            });
    }

    /// Count the error if the taxonomy says it counts, and keep its text
    pub fn record_error(&self, error: &CrawlError) {
        if !error.counts_as_error() {
            return;
        }
        self.errors.fetch_add(1, Ordering::Relaxed);
        let mut last_error = match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last_error = Some(error.to_string());
    }

    pub fn records_saved(&self) -> u64 {
        self.records_saved.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Current state as a running session row
    pub fn snapshot(&self) -> CrawlSession {
        CrawlSession {
            session_id: self.session_id.clone(),
            kind: self.kind,
            scope: self.scope.clone(),
            started_at: self.started_at,
            ended_at: None,
            status: SessionStatus::Running,
            pages_processed: self.pages_processed.load(Ordering::Acquire),
            records_found: self.records_found.load(Ordering::Acquire),
            records_saved: self.records_saved.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
            error_message: None,
        }
    }

    /// Persist the current counters while the session is still running
    pub async fn checkpoint(&self) -> Result<()> {
        if self.is_ended() {
            return Ok(());
        }
        self.repository.write_session(&self.snapshot()).await
    }

    /// Close the session. Only the first call has any effect.
    pub async fn end(&self, status: SessionStatus, fatal_cause: Option<String>) -> Result<CrawlSession> {
        if !status.is_terminal() {
            bail!("Session {} cannot end as {}", self.session_id, status);
        }
        if self.ended.swap(true, Ordering::AcqRel) {
            bail!("Session {} already ended", self.session_id);
        }

        let last_error = match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let mut session = self.snapshot();
        session.status = status;
        session.ended_at = Some(Utc::now());
        session.error_message = fatal_cause.or(last_error);

        self.repository.write_session(&session).await?;
        match status {
            SessionStatus::Completed => info!(
                "✅ Session {} completed: {} pages, {} found, {} saved, {} errors",
                session.session_id, session.pages_processed, session.records_found, session.records_saved, session.errors
            ),
            _ => warn!(
                "❌ Session {} failed: {} pages, {} found, {} saved, {} errors ({})",
                session.session_id,
                session.pages_processed,
                session.records_found,
                session.records_saved,
                session.errors,
                session.error_message.as_deref().unwrap_or("unknown cause")
            ),
        }
        Ok(session)
    }
}
