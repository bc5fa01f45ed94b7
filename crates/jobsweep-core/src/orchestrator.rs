//! Scrape cycle orchestration.
//!
//! One cycle fans out to all enabled sources under a bounded concurrency
//! pool, rate-governs and retries each fetch, and folds completed batches
//! into the dataset store incrementally — later-arriving sources merge
//! against the most recent snapshot, so results become visible to queries
//! progressively rather than only at cycle end.
//!
//! The orchestrator holds no timers; external triggers call [`Orchestrator::run_cycle`]
//! on a schedule or on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{OrchestratorConfig, SourceConfig};
use crate::error::AppError;
use crate::governor::{Admission, RateGovernor};
use crate::merge::{evict_older_than, merge};
use crate::models::{JobRecord, record_id};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::source::SourceAdapter;
use crate::store::SnapshotStore;

/// Default admission interval for sources missing from the governor's
/// registry (should not happen for configured sources).
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Overall result of one scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every enabled source produced a batch.
    FullSuccess,
    /// At least one source succeeded, at least one failed.
    PartialSuccess,
    /// No source succeeded. The dataset store was left untouched.
    FullFailure,
}

/// Per-source result for one cycle.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceReport {
    pub source_id: String,
    /// Records in the source's batch (0 on failure).
    pub records: usize,
    /// Fetch attempts made this cycle, including the first try.
    pub attempts: u32,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary returned to the scheduling trigger after each cycle.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub outcome: CycleOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    /// Records in the snapshot after the cycle's last commit.
    pub total_records: usize,
}

/// Per-source scheduling state, created on first reference and kept for the
/// orchestrator's lifetime. Never persisted — recoverable by re-probing.
#[derive(Debug, Clone, Default)]
pub struct SourceState {
    pub last_attempt: Option<Instant>,
    pub last_success: Option<Instant>,
    pub consecutive_failures: u32,
    /// No fetch attempts are permitted before this instant.
    pub backoff_until: Option<Instant>,
}

type SharedStates = Arc<Mutex<HashMap<String, SourceState>>>;

fn lock_states(states: &SharedStates) -> std::sync::MutexGuard<'_, HashMap<String, SourceState>> {
    states.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned source-state mutex");
        poisoned.into_inner()
    })
}

/// Result handed back by one source task.
struct SourceOutcome {
    source_id: String,
    attempts: u32,
    result: Result<Vec<JobRecord>, AppError>,
}

/// Drives scrape cycles across all configured sources.
///
/// Generic over the source adapter and snapshot store seams; per-source
/// state lives in an explicit map owned by this instance, so multiple
/// orchestrators (e.g. in tests) never share state.
pub struct Orchestrator<A, S>
where
    A: SourceAdapter,
    S: SnapshotStore,
{
    adapter: A,
    store: S,
    governor: RateGovernor,
    config: OrchestratorConfig,
    states: SharedStates,
}

impl<A, S> Orchestrator<A, S>
where
    A: SourceAdapter + 'static,
    S: SnapshotStore,
{
    pub fn new(adapter: A, store: S, config: OrchestratorConfig) -> Self {
        let governor = RateGovernor::new(config.sources.iter(), DEFAULT_MIN_INTERVAL);
        Self {
            adapter,
            store,
            governor,
            config,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot of the scheduling state for a source, if it has been
    /// referenced yet.
    pub fn source_state(&self, source_id: &str) -> Option<SourceState> {
        lock_states(&self.states).get(source_id).cloned()
    }

    /// Run one full scrape cycle across all enabled sources.
    ///
    /// Individual source failures are contained and reported; only a
    /// snapshot commit failure escalates as `Err`, in which case the
    /// previous snapshot remains authoritative and in-flight sources are
    /// cancelled.
    pub async fn run_cycle(&self) -> Result<CycleReport, AppError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.cycle_deadline;
        let cancel = CancellationToken::new();

        let enabled: Vec<SourceConfig> = self.config.enabled_sources().cloned().collect();
        tracing::info!(
            %run_id,
            sources = enabled.len(),
            max_concurrent = self.config.max_concurrent_scrapers,
            "Starting scrape cycle"
        );

        // Deadline watchdog: tells in-flight tasks to stop at their next
        // suspension point.
        let watchdog = {
            let cancel = cancel.clone();
            let budget = self.config.cycle_deadline;
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                cancel.cancel();
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_scrapers));
        let mut tasks = JoinSet::new();
        for source in enabled {
            tasks.spawn(run_source(
                self.adapter.clone(),
                source,
                self.governor.clone(),
                Arc::clone(&self.states),
                Arc::clone(&semaphore),
                self.config.request_timeout,
                deadline,
                cancel.clone(),
            ));
        }

        let mut reports = Vec::new();
        // Floor for batch stamping: scraped_at is monotonically
        // non-decreasing across the ingestion batches of this process.
        let mut last_stamp = DateTime::<Utc>::MIN_UTC;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Source task panicked or was aborted");
                    continue;
                }
            };

            match outcome.result {
                Ok(batch) => {
                    let stamp = std::cmp::max(Utc::now(), last_stamp);
                    last_stamp = stamp;
                    let count = batch.len();
                    if let Err(e) = self.fold_batch(batch, stamp) {
                        // A failed commit is never silently dropped: abort
                        // the cycle, the previous snapshot stays live.
                        tracing::error!(
                            %run_id,
                            source = %outcome.source_id,
                            error = %e,
                            "Snapshot commit failed, aborting cycle"
                        );
                        cancel.cancel();
                        watchdog.abort();
                        return Err(e);
                    }
                    tracing::info!(
                        source = %outcome.source_id,
                        records = count,
                        attempts = outcome.attempts,
                        "Source batch merged and committed"
                    );
                    reports.push(SourceReport {
                        source_id: outcome.source_id,
                        records: count,
                        attempts: outcome.attempts,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        source = %outcome.source_id,
                        attempts = outcome.attempts,
                        error = %e,
                        "Source failed for this cycle"
                    );
                    reports.push(SourceReport {
                        source_id: outcome.source_id,
                        records: 0,
                        attempts: outcome.attempts,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        watchdog.abort();

        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        let outcome = if succeeded == reports.len() {
            CycleOutcome::FullSuccess
        } else if succeeded > 0 {
            CycleOutcome::PartialSuccess
        } else {
            CycleOutcome::FullFailure
        };

        let report = CycleReport {
            run_id,
            outcome,
            started_at,
            finished_at: Utc::now(),
            total_records: self.store.read().len(),
            sources: reports,
        };
        tracing::info!(
            %run_id,
            outcome = ?report.outcome,
            succeeded,
            total_records = report.total_records,
            "Scrape cycle finished"
        );
        Ok(report)
    }

    /// Stamp, normalize and merge one batch against the latest snapshot,
    /// then commit.
    fn fold_batch(&self, mut batch: Vec<JobRecord>, stamp: DateTime<Utc>) -> Result<(), AppError> {
        for record in &mut batch {
            record.scraped_at = stamp;
            if record.id.is_empty() {
                record.id = record_id(&record.source, &record.url);
            }
        }

        let current = self.store.read();
        let mut next = merge(&current, &batch);
        if let Some(age) = self.config.retention_age
            && let Ok(delta) = chrono::TimeDelta::from_std(age)
        {
            next = evict_older_than(&next, stamp - delta);
        }
        self.store.replace(next)
    }
}

/// One source's work for the cycle: acquire a concurrency slot, pass rate
/// admission, fetch with a bounded timeout, retrying transient failures in
/// place. Attempts for the same source are strictly sequential.
#[allow(clippy::too_many_arguments)]
async fn run_source<A: SourceAdapter>(
    adapter: A,
    source: SourceConfig,
    governor: RateGovernor,
    states: SharedStates,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    deadline: Instant,
    cancel: CancellationToken,
) -> SourceOutcome {
    let fail = |attempts: u32, error: AppError| SourceOutcome {
        source_id: source.id.clone(),
        attempts,
        result: Err(error),
    };

    let _permit = tokio::select! {
        () = cancel.cancelled() => return fail(0, AppError::DeadlineExceeded),
        permit = Arc::clone(&semaphore).acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => return fail(0, AppError::DeadlineExceeded),
        },
    };

    // Honour a backoff window left over from a previous cycle.
    let backoff_until = lock_states(&states)
        .entry(source.id.clone())
        .or_default()
        .backoff_until;
    if let Some(until) = backoff_until
        && until > Instant::now()
    {
        if until > deadline {
            tracing::debug!(source = %source.id, "Backoff window outlasts cycle deadline, skipping");
            return fail(0, AppError::DeadlineExceeded);
        }
        tokio::select! {
            () = cancel.cancelled() => return fail(0, AppError::DeadlineExceeded),
            () = tokio::time::sleep(until.saturating_duration_since(Instant::now())) => {}
        }
    }

    let policy = RetryPolicy::new(source.max_attempts, source.base_delay, source.max_delay);
    let mut attempts = 0u32;

    loop {
        // Rate admission. Denied callers wait themselves; a wait that would
        // stall the slot past the request-timeout budget, or land past the
        // cycle deadline, abandons the source for this cycle instead.
        loop {
            match governor.try_acquire(&source.id) {
                Admission::Granted => break,
                Admission::Denied { next_available_at } => {
                    let wait = next_available_at.saturating_duration_since(Instant::now());
                    if next_available_at > deadline || wait > request_timeout {
                        tracing::debug!(
                            source = %source.id,
                            wait_ms = %wait.as_millis(),
                            "Rate admission wait exceeds budget, skipping source"
                        );
                        return fail(attempts, AppError::RateLimitExceeded);
                    }
                    tokio::select! {
                        () = cancel.cancelled() => return fail(attempts, AppError::DeadlineExceeded),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        attempts += 1;
        {
            let mut states = lock_states(&states);
            let state = states.entry(source.id.clone()).or_default();
            state.last_attempt = Some(Instant::now());
        }

        tracing::debug!(source = %source.id, attempt = attempts, "Fetching source");
        let result = tokio::select! {
            () = cancel.cancelled() => Err(AppError::DeadlineExceeded),
            fetched = tokio::time::timeout(request_timeout, adapter.fetch(&source)) => {
                match fetched {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout(request_timeout.as_secs())),
                }
            }
        };

        match result {
            Ok(batch) => {
                let mut states = lock_states(&states);
                let state = states.entry(source.id.clone()).or_default();
                state.consecutive_failures = 0;
                state.backoff_until = None;
                state.last_success = Some(Instant::now());
                return SourceOutcome {
                    source_id: source.id.clone(),
                    attempts,
                    result: Ok(batch),
                };
            }
            // The deadline is a cycle-level condition, not a source
            // failure: no retry, no failure-count bump.
            Err(AppError::DeadlineExceeded) => {
                return fail(attempts, AppError::DeadlineExceeded);
            }
            Err(error) => {
                let failures = {
                    let mut states = lock_states(&states);
                    let state = states.entry(source.id.clone()).or_default();
                    state.consecutive_failures += 1;
                    state.consecutive_failures
                };

                match policy.decide(failures, &error) {
                    RetryDecision::Retry { delay } => {
                        {
                            let mut states = lock_states(&states);
                            let state = states.entry(source.id.clone()).or_default();
                            state.backoff_until = Some(Instant::now() + delay);
                        }
                        if Instant::now() + delay > deadline {
                            tracing::debug!(
                                source = %source.id,
                                "Backoff would pass cycle deadline, giving up"
                            );
                            return fail(attempts, error);
                        }
                        tracing::debug!(
                            source = %source.id,
                            failures,
                            delay_ms = %delay.as_millis(),
                            "Retrying after backoff"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => return fail(attempts, AppError::DeadlineExceeded),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::GiveUp => {
                        return fail(attempts, error);
                    }
                }
            }
        }
    }
}
