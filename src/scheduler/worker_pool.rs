//! Worker pool for archiving queued articles.
//!
//! Each [`Worker`] runs an independent loop against the shared store:
//! blocking dequeue, load the article, run extraction under a timeout, record
//! the outcome. Workers need no coordination with each other; the queue pop
//! hands every id to exactly one of them, whether they live in one pool or in
//! separate processes.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Graceful shutdown through a shared cancellation token
//! - Bounded save retries on transient backend errors
//! - Pool statistics tracking

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::article::Article;
use crate::error::{ExtractionError, StoreError};
use crate::extract::Extractor;
use crate::store::ArticleStore;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for workers and the pool that runs them.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Time budget for one extraction call.
    pub extraction_timeout: Duration,
    /// Pause after a dequeue error before trying again.
    pub error_backoff: Duration,
    /// Total attempts for saving a job's result.
    pub save_attempts: u32,
    /// Delay before the first save retry; doubled for each further retry.
    pub save_retry_backoff: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            extraction_timeout: Duration::from_secs(30),
            error_backoff: Duration::from_secs(1),
            save_attempts: 3,
            save_retry_backoff: Duration::from_millis(500),
            // One in-flight extraction plus slack
            shutdown_timeout: Duration::from_secs(35),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Sets the total save attempts (at least one).
    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts.max(1);
        self
    }

    pub fn with_save_retry_backoff(mut self, backoff: Duration) -> Self {
        self.save_retry_backoff = backoff;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// What happened to one dequeued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Content extracted and stored; article is `archived`.
    Archived,
    /// Failure recorded; article is `failed`.
    Failed,
    /// Nothing recorded: the article was missing, not pending, or its result
    /// could not be saved. The id is already off the queue.
    Dropped,
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing jobs.
    pub active_workers: usize,
    /// Jobs that ended `archived`.
    pub jobs_archived: u64,
    /// Jobs that ended `failed`.
    pub jobs_failed: u64,
    /// Jobs dropped without a recorded outcome.
    pub jobs_dropped: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed.
    pub fn total_processed(&self) -> u64 {
        self.jobs_archived + self.jobs_failed + self.jobs_dropped
    }

    /// Returns the share of processed jobs that were archived, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_archived as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
#[derive(Default)]
struct SharedPoolStats {
    jobs_archived: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_dropped: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn record(&self, outcome: JobOutcome, duration: Duration) {
        let counter = match outcome {
            JobOutcome::Archived => &self.jobs_archived,
            JobOutcome::Failed => &self.jobs_failed,
            JobOutcome::Dropped => &self.jobs_dropped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let archived = self.jobs_archived.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let dropped = self.jobs_dropped.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total_jobs = archived + failed + dropped;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            jobs_archived: archived,
            jobs_failed: failed,
            jobs_dropped: dropped,
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that manages multiple workers draining one queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    store: Arc<dyn ArticleStore>,
    extractor: Arc<dyn Extractor>,
    shutdown: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        store: Arc<dyn ArticleStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            config,
            store,
            extractor,
            shutdown: CancellationToken::new(),
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::default()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        // A previous shutdown leaves the old token cancelled
        self.shutdown = CancellationToken::new();

        for i in 0..self.config.num_workers {
            let worker = Worker::with_stats(
                format!("worker-{}", i),
                Arc::clone(&self.store),
                Arc::clone(&self.extractor),
                self.config.clone(),
                Arc::clone(&self.stats),
            );
            let cancel = self.shutdown.clone();

            self.worker_handles
                .push(tokio::spawn(async move { worker.run(cancel).await }));
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Worker pool started");

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Blocked dequeues return promptly; a worker in the middle of a job
    /// finishes it first, which the extraction timeout bounds.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");
        self.shutdown.cancel();

        let handles: Vec<_> = self.worker_handles.drain(..).collect();
        let result = tokio::time::timeout(
            self.config.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await;
        self.is_running.store(false, Ordering::SeqCst);

        match result {
            Ok(joined) => {
                for joined in joined {
                    if let Err(e) = joined {
                        error!(error = %e, "Worker task panicked during shutdown");
                    }
                }
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }
}

/// A single worker that archives jobs from the queue.
pub struct Worker {
    /// Unique identifier for this worker.
    id: String,
    store: Arc<dyn ArticleStore>,
    extractor: Arc<dyn Extractor>,
    config: WorkerPoolConfig,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn ArticleStore>,
        extractor: Arc<dyn Extractor>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self::with_stats(
            id.into(),
            store,
            extractor,
            config,
            Arc::new(SharedPoolStats::default()),
        )
    }

    fn with_stats(
        id: String,
        store: Arc<dyn ArticleStore>,
        extractor: Arc<dyn Extractor>,
        config: WorkerPoolConfig,
        stats: Arc<SharedPoolStats>,
    ) -> Self {
        Self {
            id,
            store,
            extractor,
            config,
            stats,
        }
    }

    /// Main worker loop; returns once `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = %self.id, "Worker started, waiting for jobs");

        while !cancel.is_cancelled() {
            match self.store.dequeue(&cancel).await {
                Ok(id) => {
                    self.process_job(id).await;
                }
                Err(StoreError::Cancelled) => break,
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Advances one dequeued job to a terminal state.
    pub async fn process_job(&self, id: Uuid) -> JobOutcome {
        let start_time = Instant::now();
        self.stats.increment_active();

        let outcome = self.execute_job(id).await;

        self.stats.decrement_active();
        self.stats.record(outcome, start_time.elapsed());
        outcome
    }

    /// Returns this worker's statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(1)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn execute_job(&self, id: Uuid) -> JobOutcome {
        info!(worker_id = %self.id, job_id = %id, "Processing started");

        let pending = match self.store.get(id).await {
            Ok(article) => article,
            Err(e) => {
                error!(worker_id = %self.id, job_id = %id, error = %e, "Job dropped: article could not be loaded");
                return JobOutcome::Dropped;
            }
        };

        if !pending.is_pending() {
            warn!(
                worker_id = %self.id,
                job_id = %id,
                status = %pending.status,
                "Job dropped: article is no longer pending"
            );
            return JobOutcome::Dropped;
        }

        info!(worker_id = %self.id, job_id = %id, url = %pending.url, "Downloading");

        let extracted = match self.extract_with_timeout(&pending.url).await {
            Ok(extracted) if extracted.content.trim().is_empty() => {
                return self
                    .fail_job(pending, "extraction returned no content".to_string())
                    .await;
            }
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(worker_id = %self.id, job_id = %id, error = %e, "Extraction failed");
                return self.fail_job(pending, e.to_string()).await;
            }
        };

        let mut article = pending.clone();
        if let Err(e) = article.mark_archived(extracted.title, extracted.excerpt, extracted.content)
        {
            error!(worker_id = %self.id, job_id = %id, error = %e, "Job dropped: invalid transition");
            return JobOutcome::Dropped;
        }

        match self.save_with_retry(&article).await {
            Ok(()) => {
                info!(worker_id = %self.id, job_id = %id, title = %article.title, "Archiving complete");
                JobOutcome::Archived
            }
            Err(StoreError::ContentStoreUnavailable) => {
                // Terminal either way: record why instead of leaving it pending
                self.fail_job(pending, StoreError::ContentStoreUnavailable.to_string())
                    .await
            }
            Err(e) => {
                error!(worker_id = %self.id, job_id = %id, error = %e, "Job dropped: failed to save result");
                JobOutcome::Dropped
            }
        }
    }

    async fn extract_with_timeout(
        &self,
        url: &str,
    ) -> Result<crate::extract::Extracted, ExtractionError> {
        let timeout = self.config.extraction_timeout;
        match tokio::time::timeout(timeout, self.extractor.extract(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(timeout)),
        }
    }

    async fn fail_job(&self, mut article: Article, message: String) -> JobOutcome {
        let id = article.id;
        if let Err(e) = article.mark_failed(message) {
            error!(worker_id = %self.id, job_id = %id, error = %e, "Job dropped: invalid transition");
            return JobOutcome::Dropped;
        }

        match self.save_with_retry(&article).await {
            Ok(()) => JobOutcome::Failed,
            Err(e) => {
                error!(worker_id = %self.id, job_id = %id, error = %e, "Job dropped: failed to record failure");
                JobOutcome::Dropped
            }
        }
    }

    /// Saves with bounded retries on transient backend errors.
    async fn save_with_retry(&self, article: &Article) -> Result<(), StoreError> {
        let mut backoff = self.config.save_retry_backoff;
        let mut attempt = 1;

        loop {
            match self.store.save(article).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.config.save_attempts => {
                    warn!(
                        worker_id = %self.id,
                        job_id = %article.id,
                        attempt = attempt,
                        error = %e,
                        "Save failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
