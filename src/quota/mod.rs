//! Quota allocation across trophy strata
//!
//! The [`QuotaAllocator`] owns every admission counter of a run. It answers
//! "is another player with this trophy count still wanted?" and records
//! accepted players, keeping two bounds at all times:
//!
//! - per stratum: `accepted(s) <= capacity(s)`
//! - globally: `sum(accepted) <= total_quota`
//!
//! Counters are atomics so that progress snapshots never contend with the
//! admission path. Check-then-register sequences go through a single
//! admission lock, either via [`QuotaAllocator::try_admit`] or by holding a
//! [`QuotaGuard`] from [`QuotaAllocator::lock`].

pub mod strata;

pub use strata::{Partition, PartitionFn, Stratum, TrophyBand, ARENA_TABLE};

use crate::error::ConfigError;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stratification strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One stratum per arena tier
    #[value(name = "arena_based")]
    ArenaBased,

    /// One stratum per 100-trophy bucket
    #[value(name = "bucket_based")]
    BucketBased,

    /// Caller-supplied partition, bounded by the global quota only
    #[value(name = "hybrid")]
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ArenaBased => "arena_based",
            Strategy::BucketBased => "bucket_based",
            Strategy::Hybrid => "hybrid",
        }
    }

    /// Capacity policy used when the caller does not pick one
    pub fn default_policy(&self) -> CapacityPolicy {
        match self {
            Strategy::ArenaBased | Strategy::BucketBased => CapacityPolicy::EvenSplit,
            Strategy::Hybrid => CapacityPolicy::GlobalOnly,
        }
    }

    fn default_partition(&self) -> Option<Partition> {
        match self {
            Strategy::ArenaBased => Some(Partition::arenas()),
            Strategy::BucketBased => Some(Partition::buckets()),
            Strategy::Hybrid => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the global quota is divided among strata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// `total / n` each, remainder one apiece to the lowest strata
    EvenSplit,

    /// Caller-provided capacities; unlisted strata get 0
    Explicit(HashMap<Stratum, u64>),

    /// Strata are bounded by the global quota alone
    GlobalOnly,
}

/// Fixed capacity plus live counter for one stratum
#[derive(Debug)]
struct StratumSlot {
    capacity: u64,
    accepted: AtomicU64,
}

/// Progress of a single stratum at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StratumProgress {
    #[serde(serialize_with = "serialize_display")]
    pub stratum: Stratum,
    pub accepted: u64,
    pub capacity: u64,
}

impl StratumProgress {
    /// Completion in percent (100 when capacity is 0)
    pub fn percent(&self) -> f64 {
        if self.capacity == 0 {
            100.0
        } else {
            self.accepted as f64 / self.capacity as f64 * 100.0
        }
    }

    pub fn is_full(&self) -> bool {
        self.accepted >= self.capacity
    }
}

fn serialize_display<S: serde::Serializer>(
    stratum: &Stratum,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(stratum)
}

/// Point-in-time view of all counters
///
/// Read without the admission lock, so individual counters may be a few
/// admissions apart from each other.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub strategy: Strategy,
    pub global_accepted: u64,
    pub global_target: u64,
    pub strata: Vec<StratumProgress>,
}

impl QuotaSnapshot {
    pub fn remaining(&self) -> u64 {
        self.global_target.saturating_sub(self.global_accepted)
    }

    pub fn is_met(&self) -> bool {
        self.global_accepted >= self.global_target
    }

    pub fn percent(&self) -> f64 {
        if self.global_target == 0 {
            100.0
        } else {
            self.global_accepted as f64 / self.global_target as f64 * 100.0
        }
    }
}

/// Shared admission control for one crawl
pub struct QuotaAllocator {
    strategy: Strategy,
    partition: Partition,
    policy: CapacityPolicy,
    total_quota: u64,
    global_accepted: AtomicU64,
    strata: BTreeMap<Stratum, StratumSlot>,
    admission: Mutex<()>,
}

impl fmt::Debug for QuotaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaAllocator")
            .field("strategy", &self.strategy)
            .field("total_quota", &self.total_quota)
            .field("accepted", &self.accepted())
            .field("strata", &self.strata.len())
            .finish()
    }
}

impl QuotaAllocator {
    /// Configure an allocator with the strategy's default capacity policy
    ///
    /// `partition` overrides the strategy's built-in table and is required
    /// for [`Strategy::Hybrid`].
    pub fn configure(
        total_quota: u64,
        strategy: Strategy,
        partition: Option<Partition>,
    ) -> Result<Self, ConfigError> {
        Self::with_policy(total_quota, strategy, partition, strategy.default_policy())
    }

    /// Configure an allocator with an explicit capacity policy
    pub fn with_policy(
        total_quota: u64,
        strategy: Strategy,
        partition: Option<Partition>,
        policy: CapacityPolicy,
    ) -> Result<Self, ConfigError> {
        if total_quota == 0 {
            return Err(ConfigError::InvalidQuota { quota: total_quota });
        }

        let partition = partition
            .or_else(|| strategy.default_partition())
            .ok_or_else(|| ConfigError::InvalidStrata {
                reason: format!("strategy '{}' requires a partition function", strategy),
            })?;

        if partition.is_empty() {
            return Err(ConfigError::InvalidStrata {
                reason: "partition declares no strata".into(),
            });
        }

        let keys = partition.strata();
        let capacities = allocate_capacities(total_quota, &keys, &policy);
        let strata = keys
            .into_iter()
            .zip(capacities)
            .map(|(stratum, capacity)| {
                (
                    stratum,
                    StratumSlot {
                        capacity,
                        accepted: AtomicU64::new(0),
                    },
                )
            })
            .collect();

        Ok(Self {
            strategy,
            partition,
            policy,
            total_quota,
            global_accepted: AtomicU64::new(0),
            strata,
            admission: Mutex::new(()),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    pub fn total_quota(&self) -> u64 {
        self.total_quota
    }

    /// Total players accepted so far
    pub fn accepted(&self) -> u64 {
        self.global_accepted.load(Ordering::Relaxed)
    }

    /// Stratum a trophy count falls into
    pub fn stratum_for(&self, trophies: u32) -> Stratum {
        self.partition.stratum_for(trophies)
    }

    /// Capacity configured for a stratum (0 for unknown strata)
    pub fn capacity_of(&self, stratum: Stratum) -> u64 {
        self.strata.get(&stratum).map(|s| s.capacity).unwrap_or(0)
    }

    /// Check whether the global quota has been met
    ///
    /// Relaxed read, intended for early-stop checks outside the lock.
    pub fn is_exhausted(&self) -> bool {
        self.global_accepted.load(Ordering::Relaxed) >= self.total_quota
    }

    /// Whether a player with `trophies` would currently be accepted
    ///
    /// Reads only. The answer can be stale by the time it is acted on; use
    /// [`try_admit`](Self::try_admit) or [`lock`](Self::lock) to decide and
    /// record in one step.
    pub fn is_needed(&self, trophies: u32) -> bool {
        self.check(trophies)
    }

    /// Record one accepted player without checking capacity
    ///
    /// Callers outside a [`QuotaGuard`] are responsible for having checked
    /// [`is_needed`](Self::is_needed) under the same lock.
    pub fn register(&self, trophies: u32) {
        let _guard = self.admission.lock();
        self.record(trophies);
    }

    /// Atomically check capacity and register on success
    pub fn try_admit(&self, trophies: u32) -> bool {
        let _guard = self.admission.lock();
        if self.check(trophies) {
            self.record(trophies);
            true
        } else {
            false
        }
    }

    /// Take the admission lock for a check-then-register sequence
    pub fn lock(&self) -> QuotaGuard<'_> {
        QuotaGuard {
            allocator: self,
            _guard: self.admission.lock(),
        }
    }

    /// Read all counters without taking the admission lock
    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            strategy: self.strategy,
            global_accepted: self.global_accepted.load(Ordering::Relaxed),
            global_target: self.total_quota,
            strata: self
                .strata
                .iter()
                .map(|(stratum, slot)| StratumProgress {
                    stratum: *stratum,
                    accepted: slot.accepted.load(Ordering::Relaxed),
                    capacity: slot.capacity,
                })
                .collect(),
        }
    }

    fn check(&self, trophies: u32) -> bool {
        if self.global_accepted.load(Ordering::Acquire) >= self.total_quota {
            return false;
        }
        let stratum = self.stratum_for(trophies);
        match self.strata.get(&stratum) {
            Some(slot) => slot.accepted.load(Ordering::Acquire) < slot.capacity,
            None => false,
        }
    }

    fn record(&self, trophies: u32) {
        let stratum = self.stratum_for(trophies);
        if let Some(slot) = self.strata.get(&stratum) {
            slot.accepted.fetch_add(1, Ordering::Release);
        }
        self.global_accepted.fetch_add(1, Ordering::Release);
    }
}

/// Admission lock held across an `is_needed` / `register` pair
pub struct QuotaGuard<'a> {
    allocator: &'a QuotaAllocator,
    _guard: MutexGuard<'a, ()>,
}

impl QuotaGuard<'_> {
    pub fn is_needed(&self, trophies: u32) -> bool {
        self.allocator.check(trophies)
    }

    pub fn register(&mut self, trophies: u32) {
        self.allocator.record(trophies);
    }

    /// Check and register in one call
    pub fn admit(&mut self, trophies: u32) -> bool {
        if self.is_needed(trophies) {
            self.register(trophies);
            true
        } else {
            false
        }
    }
}

fn allocate_capacities(total: u64, strata: &[Stratum], policy: &CapacityPolicy) -> Vec<u64> {
    match policy {
        CapacityPolicy::EvenSplit => {
            let n = strata.len() as u64;
            let base = total / n;
            let remainder = total % n;
            (0..n).map(|i| base + u64::from(i < remainder)).collect()
        }
        CapacityPolicy::Explicit(map) => strata
            .iter()
            .map(|s| map.get(s).copied().unwrap_or(0))
            .collect(),
        CapacityPolicy::GlobalOnly => vec![total; strata.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_even_split_sums_to_total() {
        let q = QuotaAllocator::configure(50_000, Strategy::ArenaBased, None).unwrap();
        let snap = q.snapshot();
        assert_eq!(snap.strata.len(), 24);
        let total: u64 = snap.strata.iter().map(|s| s.capacity).sum();
        assert_eq!(total, 50_000);
        // 50000 = 24 * 2083 + 8
        assert_eq!(q.capacity_of(Stratum::Arena(2)), 2084);
        assert_eq!(q.capacity_of(Stratum::Arena(25)), 2083);
    }

    #[test]
    fn test_bucket_capacities() {
        let q = QuotaAllocator::configure(1000, Strategy::BucketBased, None).unwrap();
        assert_eq!(q.snapshot().strata.len(), 100);
        assert_eq!(q.capacity_of(Stratum::Bucket { floor: 4200, width: 100 }), 10);
    }

    #[test]
    fn test_is_needed_is_pure() {
        let q = QuotaAllocator::configure(24, Strategy::ArenaBased, None).unwrap();
        assert!(q.is_needed(100));
        assert!(q.is_needed(100));
        assert_eq!(q.accepted(), 0);
    }

    #[test]
    fn test_try_admit_respects_stratum_capacity() {
        let q = QuotaAllocator::configure(48, Strategy::ArenaBased, None).unwrap();
        assert!(q.try_admit(100));
        assert!(q.try_admit(150));
        assert!(!q.try_admit(200));
        assert!(!q.is_needed(299));
        assert!(q.is_needed(300));
        assert_eq!(q.accepted(), 2);
    }

    #[test]
    fn test_global_only_policy() {
        let q = QuotaAllocator::configure(3, Strategy::Hybrid, Some(Partition::arenas())).unwrap();
        assert!(q.try_admit(10));
        assert!(q.try_admit(20));
        assert!(q.try_admit(30));
        assert!(!q.try_admit(9000));
        assert!(q.is_exhausted());
    }

    #[test]
    fn test_explicit_policy_missing_stratum_is_closed() {
        let mut caps = HashMap::new();
        caps.insert(Stratum::Arena(3), 5);
        let q = QuotaAllocator::with_policy(
            100,
            Strategy::ArenaBased,
            None,
            CapacityPolicy::Explicit(caps),
        )
        .unwrap();
        assert!(!q.is_needed(100));
        assert!(q.is_needed(400));
    }

    #[test]
    fn test_hybrid_requires_partition() {
        let err = QuotaAllocator::configure(10, Strategy::Hybrid, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStrata { .. }));
    }

    #[test]
    fn test_zero_quota_rejected() {
        let err = QuotaAllocator::configure(0, Strategy::ArenaBased, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuota { .. }));
    }

    #[test]
    fn test_guard_check_then_register() {
        let q = QuotaAllocator::configure(24, Strategy::ArenaBased, None).unwrap();
        {
            let mut guard = q.lock();
            assert!(guard.is_needed(50));
            guard.register(50);
            assert!(!guard.is_needed(50));
            assert!(!guard.admit(60));
        }
        assert_eq!(q.accepted(), 1);
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let q = Arc::new(QuotaAllocator::configure(240, Strategy::ArenaBased, None).unwrap());
        let admitted: u64 = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let q = Arc::clone(&q);
                    scope.spawn(move || {
                        let mut n = 0u64;
                        for i in 0..2000u32 {
                            if q.try_admit((i * 37 + t * 101) % 10_000) {
                                n += 1;
                            }
                        }
                        n
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        let snap = q.snapshot();
        assert_eq!(admitted, snap.global_accepted);
        assert!(snap.global_accepted <= 240);
        for s in &snap.strata {
            assert!(s.accepted <= s.capacity, "{} overshot", s.stratum);
        }
    }
}
