//! Per-player expansion
//!
//! One task expands one frontier record:
//! 1. Wait the per-task delay (cooperative rate limiting)
//! 2. Bail out with an empty outcome if the quota is met or shutdown was requested
//! 3. Fetch the player's profile; failures end the task with no discoveries
//! 4. Collect ladder opponents the allocator still needs
//! 5. Sample up to `width` of them uniformly without replacement
//! 6. Claim and admit each sampled opponent
//!
//! Fetch errors never leave this module; they are logged and reported
//! through [`TaskOutcome::status`].

use crate::crawler::record::PlayerRecord;
use crate::crawler::visited::VisitedRegistry;
use crate::quota::QuotaAllocator;
use crate::source::{ladder_candidates, Candidate, PlayerSource};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Shared random source for opponent sampling
///
/// Seeded runs are reproducible only up to task interleaving: the sequence
/// of draws is fixed, the order in which tasks consume it is not.
#[derive(Debug)]
pub struct Sampler {
    rng: Mutex<StdRng>,
}

impl Sampler {
    /// Create a sampler, seeded for reproducibility when `seed` is set
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Pick up to `k` items uniformly without replacement
    pub fn sample<T>(&self, items: Vec<T>, k: usize) -> Vec<T> {
        let k = k.min(items.len());
        if k == 0 {
            return Vec::new();
        }

        let indices = {
            let mut rng = self.rng.lock();
            rand::seq::index::sample(&mut *rng, items.len(), k)
        };

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        indices
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Everything a task needs, shared by all tasks of a run
pub struct TaskContext {
    pub source: Arc<dyn PlayerSource>,
    pub visited: VisitedRegistry,
    pub quota: Arc<QuotaAllocator>,
    pub sampler: Sampler,
    pub width: usize,
    pub delay: Duration,
    pub shutdown: Arc<AtomicBool>,
}

impl TaskContext {
    /// Check whether no further work should start
    pub fn should_stop(&self) -> bool {
        self.quota.is_exhausted() || self.shutdown.load(Ordering::Relaxed)
    }
}

/// How the fetch step of a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Profile fetched and processed
    Fetched,

    /// Source reported an error
    Failed,

    /// Not attempted (quota met or shutdown)
    Skipped,
}

/// Result of expanding one record
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Tag of the expanded record
    pub parent: String,

    /// Newly admitted children, in admission order
    pub admitted: Vec<PlayerRecord>,

    /// Eligible candidates before sampling
    pub found: usize,

    /// Candidates drawn by the sampler
    pub sampled: usize,

    pub status: FetchStatus,

    /// Current trophy count reported for the parent, when it differs
    pub trophy_refresh: Option<u32>,
}

impl TaskOutcome {
    fn empty(parent: String, status: FetchStatus) -> Self {
        Self {
            parent,
            admitted: Vec::new(),
            found: 0,
            sampled: 0,
            status,
            trophy_refresh: None,
        }
    }

    /// False only when the source returned an error
    pub fn fetch_ok(&self) -> bool {
        self.status != FetchStatus::Failed
    }
}

/// Expand a single frontier record
pub async fn expand(ctx: &TaskContext, parent: &PlayerRecord) -> TaskOutcome {
    if !ctx.delay.is_zero() {
        tokio::time::sleep(ctx.delay).await;
    }

    if ctx.should_stop() {
        trace!(tag = %parent.tag, "Skipping expansion, crawl is stopping");
        return TaskOutcome::empty(parent.tag.clone(), FetchStatus::Skipped);
    }

    let profile = match ctx.source.fetch(&parent.tag).await {
        Ok(profile) => profile,
        Err(e) => {
            if e.is_quiet() {
                debug!(tag = %parent.tag, error = %e, "Fetch failed");
            } else {
                warn!(tag = %parent.tag, error = %e, "Fetch failed");
            }
            return TaskOutcome::empty(parent.tag.clone(), FetchStatus::Failed);
        }
    };

    let trophy_refresh = profile
        .trophies
        .filter(|&t| t > 0 && t != parent.trophies);

    let eligible: Vec<Candidate> = ladder_candidates(&profile, &parent.tag)
        .into_iter()
        .filter(|c| ctx.quota.is_needed(c.trophies))
        .collect();
    let found = eligible.len();

    let picked = ctx.sampler.sample(eligible, ctx.width);
    let sampled = picked.len();

    let mut admitted = Vec::new();
    for candidate in picked {
        if !ctx.visited.try_claim(&candidate.tag) {
            continue;
        }
        if ctx.quota.try_admit(candidate.trophies) {
            admitted.push(parent.child(candidate));
        }
    }

    trace!(
        tag = %parent.tag,
        found = found,
        sampled = sampled,
        admitted = admitted.len(),
        "Expanded player"
    );

    TaskOutcome {
        parent: parent.tag.clone(),
        admitted,
        found,
        sampled,
        status: FetchStatus::Fetched,
        trophy_refresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::Strategy;
    use crate::source::{Participant, StaticSource};

    fn context(source: StaticSource, quota: u64, width: usize) -> TaskContext {
        TaskContext {
            source: Arc::new(source),
            visited: VisitedRegistry::new(),
            quota: Arc::new(QuotaAllocator::configure(quota, Strategy::BucketBased, None).unwrap()),
            sampler: Sampler::new(Some(7)),
            width,
            delay: Duration::ZERO,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_sampler_bounds() {
        let sampler = Sampler::new(Some(1));
        let picked = sampler.sample((0..10).collect(), 3);
        assert_eq!(picked.len(), 3);
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        assert_eq!(sampler.sample(vec![1, 2], 5).len(), 2);
        assert!(sampler.sample(vec![1, 2], 0).is_empty());
    }

    #[test]
    fn test_seeded_samplers_agree() {
        let a = Sampler::new(Some(42)).sample((0..100).collect::<Vec<u32>>(), 5);
        let b = Sampler::new(Some(42)).sample((0..100).collect::<Vec<u32>>(), 5);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_expand_admits_children() {
        let source = StaticSource::new().with_ladder(
            "#P",
            5000,
            (0..5).map(|i| Participant::new(format!("#O{}", i), 100 * i, "o")),
        );
        let ctx = context(source, 10_000, 3);
        let parent = PlayerRecord::seed("#P", 4900, "p");

        let outcome = expand(&ctx, &parent).await;
        assert!(outcome.fetch_ok());
        assert_eq!(outcome.found, 5);
        assert_eq!(outcome.sampled, 3);
        assert_eq!(outcome.admitted.len(), 3);
        assert_eq!(outcome.trophy_refresh, Some(5000));
        for child in &outcome.admitted {
            assert_eq!(child.depth, 1);
            assert_eq!(child.source, "#P");
        }
    }

    #[tokio::test]
    async fn test_expand_fetch_failure_is_empty() {
        let ctx = context(StaticSource::new().with_failure("#P"), 100, 3);
        let outcome = expand(&ctx, &PlayerRecord::seed("#P", 100, "p")).await;
        assert_eq!(outcome.status, FetchStatus::Failed);
        assert!(outcome.admitted.is_empty());
    }

    #[tokio::test]
    async fn test_expand_skips_when_quota_met() {
        let source = StaticSource::new().with_ladder("#P", 100, [Participant::new("#O", 150, "o")]);
        let ctx = context(source, 100, 3);
        for i in 0..100 {
            assert!(ctx.quota.try_admit(i * 100));
        }

        let outcome = expand(&ctx, &PlayerRecord::seed("#P", 100, "p")).await;
        assert_eq!(outcome.status, FetchStatus::Skipped);
        assert!(outcome.fetch_ok());
    }

    #[tokio::test]
    async fn test_claimed_tags_are_not_readmitted() {
        let source = StaticSource::new().with_ladder("#P", 100, [Participant::new("#O", 150, "o")]);
        let ctx = context(source, 1000, 3);
        assert!(ctx.visited.try_claim("#O"));

        let outcome = expand(&ctx, &PlayerRecord::seed("#P", 100, "p")).await;
        assert_eq!(outcome.sampled, 1);
        assert!(outcome.admitted.is_empty());
        assert_eq!(ctx.quota.accepted(), 0);
    }
}
