//! # Crawl Orchestrator
//!
//! Composes walker, fetcher, extractor, deduplicator and gateway into one
//! bounded pipeline per session: the walker feeds a bounded queue and N
//! workers drain it. Interrupted sessions from a previous process are
//! reconciled before the orchestrator accepts any run.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawling::catalog_walker::{CatalogDiff, CatalogWalker};
use crate::crawling::error::CrawlError;
use crate::crawling::session_tracker::SessionTracker;
use crate::crawling::state::SharedState;
use crate::crawling::work_queue::work_queue;
use crate::crawling::workers::{CrawlLimits, ReviewWorker};
use crate::domain::{CrawlScope, CrawlSession, CrawlStatistics, ReviewVariant, SessionKind, SessionStatus};
use crate::infrastructure::{AppConfig, HttpTransport, ReviewRepository};

/// How often running counters are written to the session row
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

/// Result of a catalog discovery run
#[derive(Debug, Clone)]
pub struct CatalogOutcome {
    pub session: CrawlSession,
    /// `None` when the run failed before a snapshot could be taken
    pub diff: Option<CatalogDiff>,
}

pub struct CrawlOrchestrator {
    state: Arc<SharedState>,
    walker: Arc<CatalogWalker>,
    current: RwLock<Option<Arc<SessionTracker>>>,
}

impl CrawlOrchestrator {
    /// Build the pipeline and reconcile sessions a crashed process left
    /// running
    pub async fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn HttpTransport>,
        repository: ReviewRepository,
        cancellation_token: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let state = Arc::new(SharedState::new(config, transport, repository, cancellation_token)?);
        let reconciled = state
            .repository
            .reconcile_interrupted_sessions()
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;
        if reconciled > 0 {
            info!("🧹 Reconciled {} interrupted session(s)", reconciled);
        }

        Ok(Self {
            walker: Arc::new(CatalogWalker::new(state.clone())),
            state,
            current: RwLock::new(None),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancellation_token.clone()
    }

    pub fn repository(&self) -> &ReviewRepository {
        &self.state.repository
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    /// Live counters of the running session, if any
    pub async fn current_session(&self) -> Option<CrawlSession> {
        self.current.read().await.as_ref().map(|tracker| tracker.snapshot())
    }

    async fn begin(&self, kind: SessionKind, scope: &CrawlScope) -> Result<Arc<SessionTracker>, CrawlError> {
        let tracker = SessionTracker::begin(self.state.repository.clone(), kind, scope)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;
        let tracker = Arc::new(tracker);
        *self.current.write().await = Some(tracker.clone());
        Ok(tracker)
    }

    /// Close the session as completed only when the run finished on its own
    async fn close(&self, tracker: &SessionTracker, outcome: Result<(), CrawlError>) -> Result<CrawlSession, CrawlError> {
        let (status, cause) = match outcome {
            Ok(()) if self.state.is_shutdown_requested() => (SessionStatus::Failed, Some("cancelled".to_string())),
            Ok(()) => (SessionStatus::Completed, None),
            Err(CrawlError::Cancelled) => (SessionStatus::Failed, Some("cancelled".to_string())),
            Err(e) => {
                tracker.record_error(&e);
                (SessionStatus::Failed, Some(e.to_string()))
            }
        };

        let ended = tracker.end(status, cause).await;
        *self.current.write().await = None;
        ended.map_err(|e| CrawlError::from_storage(&e))
    }

    /// Discover brands and models and write them through to storage
    pub async fn run_catalog_discovery(&self) -> Result<CatalogOutcome, CrawlError> {
        let tracker = self.begin(SessionKind::Catalog, &CrawlScope::all()).await?;

        let (outcome, diff) = match self.walker.run_discovery(&tracker, &self.state.cancellation_token).await {
            Ok(diff) => (Ok(()), Some(diff)),
            Err(e) => (Err(e), None),
        };
        let session = self.close(&tracker, outcome).await?;
        Ok(CatalogOutcome { session, diff })
    }

    /// Crawl one review variant for every model in `scope`
    pub async fn run_review_crawl(
        &self,
        scope: &CrawlScope,
        variant: ReviewVariant,
        limits: CrawlLimits,
    ) -> Result<CrawlSession, CrawlError> {
        let tracker = self.begin(SessionKind::for_variant(variant), scope).await?;
        let crawl = &self.state.config.crawl;
        let run_token = self.state.cancellation_token.child_token();
        let (sender, receiver) = work_queue(crawl.queue_capacity);

        info!(
            "🚀 Crawling {} reviews for {} with {} workers (max {} pages per model)",
            variant, scope, crawl.max_workers, limits.max_pages
        );

        let workers: Vec<JoinHandle<Result<u64, CrawlError>>> = (0..crawl.max_workers)
            .map(|id| {
                let worker = ReviewWorker::new(id, self.state.clone(), tracker.clone(), limits, run_token.clone());
                let receiver = receiver.clone();
                let run_token = run_token.clone();
                tokio::spawn(async move {
                    let result = worker.run(receiver).await;
                    if result.as_ref().is_err_and(CrawlError::is_session_fatal) {
                        run_token.cancel();
                    }
                    result
                })
            })
            .collect();
        drop(receiver);

        let producer: JoinHandle<Result<usize, CrawlError>> = {
            let walker = self.walker.clone();
            let tracker = tracker.clone();
            let scope = scope.clone();
            let run_token = run_token.clone();
            tokio::spawn(async move {
                let result = walker.feed(&scope, variant, sender, &tracker, &run_token).await;
                if result.as_ref().is_err_and(|e| !matches!(e, CrawlError::Cancelled)) {
                    run_token.cancel();
                }
                result
            })
        };

        let pipeline = async move { (producer.await, join_all(workers).await) };
        tokio::pin!(pipeline);
        let mut checkpoints = tokio::time::interval(CHECKPOINT_INTERVAL);
        checkpoints.tick().await;

        let (fed, finished) = loop {
            tokio::select! {
                done = &mut pipeline => break done,
                _ = checkpoints.tick() => {
                    if let Err(e) = tracker.checkpoint().await {
                        warn!("⚠️ Session checkpoint failed: {:#}", e);
                    }
                }
            }
        };

        let mut failure = match fed {
            Ok(Ok(_)) | Ok(Err(CrawlError::Cancelled)) => None,
            Ok(Err(e)) => Some(e),
            Err(join_error) => Some(CrawlError::Configuration(format!("work emission aborted: {join_error}"))),
        };
        for result in finished {
            let error = match result {
                Ok(Ok(_)) | Ok(Err(CrawlError::Cancelled)) => continue,
                Ok(Err(e)) => e,
                Err(join_error) => CrawlError::Configuration(format!("worker aborted: {join_error}")),
            };
            failure.get_or_insert(error);
        }

        self.close(&tracker, failure.map_or(Ok(()), Err)).await
    }

    /// Aggregate snapshot across catalog, reviews and recent sessions
    pub async fn get_statistics(&self) -> Result<CrawlStatistics, CrawlError> {
        self.state
            .repository
            .statistics()
            .await
            .map_err(|e| CrawlError::from_storage(&e))
    }
}
