//! Bounded worker pool for expanding one BFS level
//!
//! A semaphore holds `workers` permits. The dispatcher acquires a permit
//! *before* spawning each task, so at most `workers` expansions are in flight
//! and the rest of the frontier waits in the dispatcher. Completed tasks are
//! collected while the dispatcher waits for permits, so progress is reported
//! as the level runs rather than at the barrier.
//!
//! Once the quota is met (or shutdown is requested) the dispatcher stops
//! issuing new tasks and drains the ones already running.

use crate::crawler::record::PlayerRecord;
use crate::crawler::task::{expand, FetchStatus, TaskContext, TaskOutcome};
use crate::error::WorkerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error};

/// Counters accumulated over the whole run
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub tasks_processed: AtomicU64,
    pub failed_fetches: AtomicU64,
    pub skipped_tasks: AtomicU64,
    pub candidates_found: AtomicU64,
    pub candidates_sampled: AtomicU64,
    pub admitted: AtomicU64,
}

impl CrawlStats {
    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        match outcome.status {
            FetchStatus::Failed => {
                self.failed_fetches.fetch_add(1, Ordering::Relaxed);
            }
            FetchStatus::Skipped => {
                self.skipped_tasks.fetch_add(1, Ordering::Relaxed);
            }
            FetchStatus::Fetched => {}
        }
        self.candidates_found
            .fetch_add(outcome.found as u64, Ordering::Relaxed);
        self.candidates_sampled
            .fetch_add(outcome.sampled as u64, Ordering::Relaxed);
        self.admitted
            .fetch_add(outcome.admitted.len() as u64, Ordering::Relaxed);
    }

    /// A panicked task counts as processed with a failed fetch
    pub fn record_panic(&self) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        self.failed_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_fetches.load(Ordering::Relaxed)
    }
}

/// Events emitted while a level runs
#[derive(Debug)]
pub enum PoolEvent<'a> {
    /// A task finished (successfully or not)
    Completed(&'a TaskOutcome),

    /// A task panicked; already counted as a failed fetch
    Panicked(&'a WorkerError),

    /// Dispatch stopped early; in-flight tasks are being drained
    Draining { in_flight: usize, undispatched: usize },
}

/// What one level produced
#[derive(Debug, Default)]
pub struct LevelReport {
    /// Admitted children, in completion order
    pub admitted: Vec<PlayerRecord>,

    /// Current trophy counts reported for expanded players
    pub refreshes: Vec<(String, u32)>,

    pub dispatched: usize,

    /// Frontier records never handed to a task
    pub undispatched: usize,

    /// Dispatch was cut short by quota exhaustion or shutdown
    pub drained: bool,
}

/// Fixed-size pool of expansion tasks
pub struct WorkerPool {
    ctx: Arc<TaskContext>,
    stats: Arc<CrawlStats>,
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(ctx: Arc<TaskContext>, stats: Arc<CrawlStats>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            ctx,
            stats,
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Expand every record of `frontier` and wait for all tasks to finish
    pub async fn run_level<F>(
        &self,
        frontier: Vec<PlayerRecord>,
        mut on_event: F,
    ) -> Result<LevelReport, WorkerError>
    where
        F: FnMut(PoolEvent<'_>),
    {
        let total = frontier.len();
        let mut report = LevelReport::default();
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut in_flight: HashMap<Id, String> = HashMap::new();

        for record in frontier {
            if self.ctx.should_stop() {
                report.drained = true;
                report.undispatched = total - report.dispatched;
                debug!(
                    in_flight = tasks.len(),
                    undispatched = report.undispatched,
                    "Stopping dispatch, draining level"
                );
                on_event(PoolEvent::Draining {
                    in_flight: tasks.len(),
                    undispatched: report.undispatched,
                });
                break;
            }

            // Collect finished tasks while waiting for a free slot
            let permit = loop {
                tokio::select! {
                    permit = Arc::clone(&self.semaphore).acquire_owned() => {
                        break permit.map_err(|_| WorkerError::PoolClosed)?;
                    }
                    Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                        self.collect(joined, &mut in_flight, &mut report, &mut on_event);
                    }
                }
            };

            let ctx = Arc::clone(&self.ctx);
            let tag = record.tag.clone();
            let handle = tasks.spawn(async move {
                let outcome = expand(&ctx, &record).await;
                drop(permit);
                outcome
            });
            in_flight.insert(handle.id(), tag);
            report.dispatched += 1;
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            self.collect(joined, &mut in_flight, &mut report, &mut on_event);
        }

        Ok(report)
    }

    fn collect<F>(
        &self,
        joined: Result<(Id, TaskOutcome), JoinError>,
        in_flight: &mut HashMap<Id, String>,
        report: &mut LevelReport,
        on_event: &mut F,
    ) where
        F: FnMut(PoolEvent<'_>),
    {
        match joined {
            Ok((id, outcome)) => {
                in_flight.remove(&id);
                self.stats.record_outcome(&outcome);
                on_event(PoolEvent::Completed(&outcome));
                if let Some(trophies) = outcome.trophy_refresh {
                    report.refreshes.push((outcome.parent.clone(), trophies));
                }
                report.admitted.extend(outcome.admitted);
            }
            Err(e) => {
                let tag = in_flight.remove(&e.id()).unwrap_or_default();
                let err = WorkerError::Panicked {
                    tag,
                    message: panic_message(e),
                };
                error!(error = %err, "Expansion task failed");
                self.stats.record_panic();
                on_event(PoolEvent::Panicked(&err));
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(e) => e.to_string(),
    }
}
