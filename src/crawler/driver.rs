//! Level-synchronized BFS driver
//!
//! The driver owns the run: it admits the seeds, hands each BFS level to the
//! [`WorkerPool`], waits at the level barrier, and decides whether to expand
//! the next level. The decision itself is the pure function [`next_state`].
//!
//! ```text
//!   Idle ──► ExpandingLevel{0} ──► ExpandingLevel{1} ──► ... ──► Complete
//!                  │                      │
//!                  └──► Draining{d} ──────┴─────────────────────► Complete
//! ```
//!
//! `Draining` is entered when the quota is met (or shutdown is requested)
//! while a level is in flight: no new tasks start, running ones finish, and
//! their late candidates are turned away by the allocator.

use crate::crawler::pool::{CrawlStats, PoolEvent, WorkerPool};
use crate::crawler::record::PlayerRecord;
use crate::crawler::task::{Sampler, TaskContext};
use crate::crawler::visited::VisitedRegistry;
use crate::error::{Result, SeedError};
use crate::progress::{CrawlProgress, ReportCadence, DEFAULT_PROGRESS_INTERVAL};
use crate::quota::{QuotaAllocator, StratumProgress, Strategy};
use crate::seed::SeedSet;
use crate::source::PlayerSource;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tunables of a crawl
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    /// Opponents sampled per expanded player
    pub width: usize,

    /// Number of BFS levels to expand
    pub max_depth: u32,

    /// Sleep before each fetch
    pub delay: Duration,

    /// Concurrent expansion tasks
    pub workers: usize,

    /// Processed tasks between progress reports
    pub progress_interval: u64,

    /// Seed for the opponent sampler
    pub rng_seed: Option<u64>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            width: 3,
            max_depth: 10,
            delay: Duration::from_secs(1),
            workers: 5,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            rng_seed: None,
        }
    }
}

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Global quota met
    QuotaMet,

    /// `max_depth` levels expanded
    DepthLimit,

    /// A level produced no new records (or fan-out is disabled)
    FrontierExhausted,

    /// Shutdown requested
    Interrupted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::QuotaMet => "quota_met",
            TerminationReason::DepthLimit => "depth_limit",
            TerminationReason::FrontierExhausted => "frontier_exhausted",
            TerminationReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationReason::QuotaMet => "quota met",
            TerminationReason::DepthLimit => "depth limit reached",
            TerminationReason::FrontierExhausted => "frontier exhausted",
            TerminationReason::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    ExpandingLevel { depth: u32 },
    Draining { depth: u32 },
    Complete(TerminationReason),
}

impl CrawlState {
    pub fn is_complete(&self) -> bool {
        matches!(self, CrawlState::Complete(_))
    }
}

/// Inputs to the between-level decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub quota_met: bool,
    pub interrupted: bool,
    pub levels_expanded: u32,
    pub max_depth: u32,
    pub frontier: usize,
    pub width: usize,
}

/// Decide what follows the seed phase or a finished level
///
/// Checks run in priority order: quota, interrupt, depth, frontier.
pub fn next_state(c: &Checkpoint) -> CrawlState {
    if c.quota_met {
        CrawlState::Complete(TerminationReason::QuotaMet)
    } else if c.interrupted {
        CrawlState::Complete(TerminationReason::Interrupted)
    } else if c.levels_expanded >= c.max_depth {
        CrawlState::Complete(TerminationReason::DepthLimit)
    } else if c.frontier == 0 || c.width == 0 {
        CrawlState::Complete(TerminationReason::FrontierExhausted)
    } else {
        CrawlState::ExpandingLevel {
            depth: c.levels_expanded,
        }
    }
}

/// Notifications delivered while a crawl runs
#[derive(Debug)]
pub enum CrawlEvent<'a> {
    /// Driver changed state
    State(CrawlState),

    /// Seeds admitted at depth 0
    Seeded(&'a [PlayerRecord]),

    /// Periodic progress report
    Progress(&'a CrawlProgress),

    /// A level passed its barrier
    LevelComplete {
        depth: u32,
        admitted: &'a [PlayerRecord],
        refreshes: &'a [(String, u32)],
    },
}

/// Run summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub quota_target: u64,
    pub strategy: Strategy,
    pub achieved: u64,

    /// Deepest depth among accepted records
    pub max_depth_reached: u32,

    pub levels_expanded: u32,

    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,

    pub failed_fetches: u64,
    pub tasks_processed: u64,
    pub seeds_admitted: u64,
    pub termination: TerminationReason,

    /// Final per-stratum counts
    pub strata: Vec<StratumProgress>,
}

impl RunSummary {
    pub fn achieved_percent(&self) -> f64 {
        if self.quota_target == 0 {
            100.0
        } else {
            self.achieved as f64 / self.quota_target as f64 * 100.0
        }
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Everything a finished crawl produced
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Accepted records in admission order (seeds first, then level by level)
    pub records: Vec<PlayerRecord>,

    /// Latest trophy counts reported for expanded players
    pub latest_trophies: HashMap<String, u32>,

    pub summary: RunSummary,
}

/// BFS crawl driver
pub struct BfsDriver {
    settings: CrawlSettings,
    quota: Arc<QuotaAllocator>,
    source: Arc<dyn PlayerSource>,
    shutdown: Arc<AtomicBool>,
}

impl BfsDriver {
    pub fn new(
        settings: CrawlSettings,
        quota: Arc<QuotaAllocator>,
        source: Arc<dyn PlayerSource>,
    ) -> Self {
        Self {
            settings,
            quota,
            source,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown flag for signal handlers
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Run the crawl to completion
    pub async fn run(self, seeds: SeedSet) -> Result<CrawlResult> {
        self.run_with(seeds, |_| {}).await
    }

    /// Run the crawl, forwarding periodic progress to `on_progress`
    pub async fn run_with_progress<F>(self, seeds: SeedSet, mut on_progress: F) -> Result<CrawlResult>
    where
        F: FnMut(&CrawlProgress),
    {
        self.run_with(seeds, |event| {
            if let CrawlEvent::Progress(p) = event {
                on_progress(p);
            }
        })
        .await
    }

    /// Run the crawl, delivering every [`CrawlEvent`] to `observer`
    pub async fn run_with<F>(self, seeds: SeedSet, mut observer: F) -> Result<CrawlResult>
    where
        F: FnMut(CrawlEvent<'_>),
    {
        let start = Instant::now();
        let settings = self.settings;
        let quota = self.quota;
        let cadence = ReportCadence::new(settings.progress_interval);

        let ctx = Arc::new(TaskContext {
            source: self.source,
            visited: VisitedRegistry::with_capacity(seeds.entries.len() * 2),
            quota: Arc::clone(&quota),
            sampler: Sampler::new(settings.rng_seed),
            width: settings.width,
            delay: settings.delay,
            shutdown: Arc::clone(&self.shutdown),
        });
        let stats = Arc::new(CrawlStats::default());
        let pool = WorkerPool::new(Arc::clone(&ctx), Arc::clone(&stats), settings.workers);

        let mut state = CrawlState::Idle;
        observer(CrawlEvent::State(state));

        let mut records = admit_seeds(&ctx, &seeds)?;
        let seeded = records.len() as u64;
        observer(CrawlEvent::Seeded(&records));

        info!(
            seeds = seeded,
            quota = quota.total_quota(),
            strategy = %quota.strategy(),
            width = settings.width,
            max_depth = settings.max_depth,
            workers = pool.workers(),
            "Starting crawl"
        );

        let mut latest_trophies = HashMap::new();
        let mut frontier = records.clone();
        let mut levels_expanded = 0u32;
        let mut max_depth_reached = 0u32;

        loop {
            state = next_state(&Checkpoint {
                quota_met: quota.is_exhausted(),
                interrupted: self.shutdown.load(Ordering::Relaxed),
                levels_expanded,
                max_depth: settings.max_depth,
                frontier: frontier.len(),
                width: settings.width,
            });
            observer(CrawlEvent::State(state));

            let depth = match state {
                CrawlState::ExpandingLevel { depth } => depth,
                _ => break,
            };

            let level_start = Instant::now();
            info!(depth = depth, frontier = frontier.len(), "Expanding level");

            let report = pool
                .run_level(std::mem::take(&mut frontier), |event| match event {
                    PoolEvent::Completed(_) | PoolEvent::Panicked(_) => {
                        let processed = stats.processed();
                        if cadence.is_due(processed) {
                            let mut progress = CrawlProgress::capture(
                                quota.snapshot(),
                                processed,
                                stats.failed(),
                                seeded,
                                depth,
                                start.elapsed(),
                            );
                            progress.breakdown = cadence.is_breakdown_due(processed);
                            observer(CrawlEvent::Progress(&progress));
                        }
                    }
                    PoolEvent::Draining {
                        in_flight,
                        undispatched,
                    } => {
                        debug!(
                            in_flight = in_flight,
                            undispatched = undispatched,
                            "Level draining"
                        );
                        state = CrawlState::Draining { depth };
                        observer(CrawlEvent::State(state));
                    }
                })
                .await?;

            levels_expanded += 1;

            for (tag, trophies) in &report.refreshes {
                latest_trophies.insert(tag.clone(), *trophies);
            }
            if !report.admitted.is_empty() {
                max_depth_reached = max_depth_reached.max(depth + 1);
            }

            info!(
                depth = depth,
                dispatched = report.dispatched,
                admitted = report.admitted.len(),
                accepted = quota.accepted(),
                elapsed_secs = level_start.elapsed().as_secs_f64(),
                "Level complete"
            );

            observer(CrawlEvent::LevelComplete {
                depth,
                admitted: &report.admitted,
                refreshes: &report.refreshes,
            });

            records.extend(report.admitted.iter().cloned());
            frontier = report.admitted;
        }

        let termination = match state {
            CrawlState::Complete(reason) => reason,
            _ => TerminationReason::FrontierExhausted,
        };

        let snapshot = quota.snapshot();
        let summary = RunSummary {
            quota_target: snapshot.global_target,
            strategy: snapshot.strategy,
            achieved: snapshot.global_accepted,
            max_depth_reached,
            levels_expanded,
            elapsed: start.elapsed(),
            failed_fetches: stats.failed(),
            tasks_processed: stats.processed(),
            seeds_admitted: seeded,
            termination,
            strata: snapshot.strata,
        };

        info!(
            accepted = summary.achieved,
            quota = summary.quota_target,
            levels = summary.levels_expanded,
            failed = summary.failed_fetches,
            termination = termination.as_str(),
            duration_secs = summary.elapsed.as_secs(),
            "Crawl completed"
        );

        Ok(CrawlResult {
            records,
            latest_trophies,
            summary,
        })
    }
}

/// Push every seed through the same claim-then-admit path as discoveries
fn admit_seeds(ctx: &TaskContext, seeds: &SeedSet) -> Result<Vec<PlayerRecord>> {
    let mut admitted = Vec::with_capacity(seeds.entries.len());
    let mut over_quota = 0usize;

    for entry in &seeds.entries {
        if !ctx.visited.try_claim(&entry.tag) {
            warn!(tag = %entry.tag, "Skipping duplicate seed");
            continue;
        }
        if !ctx.quota.try_admit(entry.trophies) {
            debug!(tag = %entry.tag, trophies = entry.trophies, "Seed stratum already full");
            over_quota += 1;
            continue;
        }
        admitted.push(
            PlayerRecord::seed(entry.tag.clone(), entry.trophies, entry.name.clone())
                .with_arena_hint(entry.arena_hint),
        );
    }

    if over_quota > 0 {
        warn!(skipped = over_quota, "Seeds skipped because their quota was already met");
    }

    if admitted.is_empty() {
        return Err(SeedError::Empty {
            source_name: seeds.origin.clone(),
        }
        .into());
    }

    Ok(admitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            quota_met: false,
            interrupted: false,
            levels_expanded: 0,
            max_depth: 2,
            frontier: 3,
            width: 3,
        }
    }

    #[test]
    fn test_next_state_expands() {
        assert_eq!(
            next_state(&checkpoint()),
            CrawlState::ExpandingLevel { depth: 0 }
        );
        let c = Checkpoint {
            levels_expanded: 1,
            ..checkpoint()
        };
        assert_eq!(next_state(&c), CrawlState::ExpandingLevel { depth: 1 });
    }

    #[test]
    fn test_next_state_terminations() {
        let done = |c: Checkpoint| match next_state(&c) {
            CrawlState::Complete(reason) => Some(reason),
            _ => None,
        };

        assert_eq!(
            done(Checkpoint {
                quota_met: true,
                interrupted: true,
                ..checkpoint()
            }),
            Some(TerminationReason::QuotaMet)
        );
        assert_eq!(
            done(Checkpoint {
                interrupted: true,
                ..checkpoint()
            }),
            Some(TerminationReason::Interrupted)
        );
        assert_eq!(
            done(Checkpoint {
                levels_expanded: 2,
                ..checkpoint()
            }),
            Some(TerminationReason::DepthLimit)
        );
        assert_eq!(
            done(Checkpoint {
                frontier: 0,
                ..checkpoint()
            }),
            Some(TerminationReason::FrontierExhausted)
        );
        assert_eq!(
            done(Checkpoint {
                width: 0,
                ..checkpoint()
            }),
            Some(TerminationReason::FrontierExhausted)
        );
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(TerminationReason::QuotaMet.to_string(), "quota met");
        assert_eq!(TerminationReason::DepthLimit.as_str(), "depth_limit");
    }
}
