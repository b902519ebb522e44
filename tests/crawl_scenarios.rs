//! End-to-end crawl tests
//!
//! All tests run against an in-memory `StaticSource` with no fetch delay.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use trophy_crawler::crawler::{
    BfsDriver, CrawlEvent, CrawlResult, CrawlSettings, CrawlState, TerminationReason,
};
use trophy_crawler::error::{CrawlerError, SeedError};
use trophy_crawler::quota::{
    CapacityPolicy, Partition, QuotaAllocator, Strategy, Stratum, TrophyBand,
};
use trophy_crawler::seed::{SeedEntry, SeedSet};
use trophy_crawler::source::{Participant, StaticSource};

fn settings(width: usize, max_depth: u32, workers: usize) -> CrawlSettings {
    CrawlSettings {
        width,
        max_depth,
        delay: Duration::ZERO,
        workers,
        progress_interval: 1,
        rng_seed: Some(7),
    }
}

fn seeds(entries: &[(&str, u32)]) -> SeedSet {
    SeedSet::from_entries(
        "test",
        entries
            .iter()
            .map(|(tag, trophies)| SeedEntry::new(*tag, *trophies))
            .collect(),
    )
}

fn opponents(prefix: &str, count: usize, trophies: u32) -> Vec<Participant> {
    (0..count)
        .map(|i| {
            Participant::new(
                format!("#{}{}", prefix, i),
                trophies,
                format!("{}{}", prefix, i),
            )
        })
        .collect()
}

fn band_allocator(total: u64, low: u32, high: u32) -> Arc<QuotaAllocator> {
    let partition = Partition::bands(vec![TrophyBand::new(Stratum::Band(0), low, high)]);
    Arc::new(
        QuotaAllocator::with_policy(
            total,
            Strategy::Hybrid,
            Some(partition),
            CapacityPolicy::EvenSplit,
        )
        .unwrap(),
    )
}

/// Every non-seed record points at a record one level shallower
fn assert_linkage(result: &CrawlResult) {
    let depths: HashMap<&str, u32> = result
        .records
        .iter()
        .map(|r| (r.tag.as_str(), r.depth))
        .collect();
    assert_eq!(depths.len(), result.records.len(), "duplicate tags in result");

    for record in &result.records {
        if record.is_seed() {
            assert_eq!(record.depth, 0);
            continue;
        }
        let parent_depth = depths
            .get(record.source.as_str())
            .unwrap_or_else(|| panic!("parent {} of {} not in result", record.source, record.tag));
        assert_eq!(record.depth, parent_depth + 1);
    }
}

#[tokio::test]
async fn test_single_band_quota_two() {
    let source = StaticSource::new().with_ladder(
        "#P1",
        150,
        [
            Participant::new("#Q1", 160, "Q1"),
            Participant::new("#Q2", 170, "Q2"),
        ],
    );
    let quota = band_allocator(2, 100, 199);
    assert_eq!(quota.capacity_of(Stratum::Band(0)), 2);

    let driver = BfsDriver::new(settings(3, 10, 2), quota, Arc::new(source));
    let result = driver.run(seeds(&[("#P1", 150)])).await.unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].tag, "#P1");
    assert_eq!(result.records[1].depth, 1);
    assert_eq!(result.records[1].source, "#P1");
    assert_eq!(result.summary.termination, TerminationReason::QuotaMet);
    assert_eq!(result.summary.levels_expanded, 1);
    assert_eq!(result.summary.achieved, 2);
    assert_eq!(result.summary.max_depth_reached, 1);
}

#[tokio::test]
async fn test_bucket_capacity_stops_at_fifth_acceptance() {
    // Seed A meets 5 opponents; each of those meets 5 more
    let mut source = StaticSource::new().with_ladder("#A", 150, opponents("B", 5, 150));
    for i in 0..5 {
        source = source.with_ladder(
            &format!("#B{}", i),
            150,
            opponents(&format!("C{}X", i), 5, 120),
        );
    }
    let source = Arc::new(source);

    let mut caps = HashMap::new();
    caps.insert(
        Stratum::Bucket {
            floor: 100,
            width: 100,
        },
        5,
    );
    let quota = Arc::new(
        QuotaAllocator::with_policy(
            5,
            Strategy::BucketBased,
            None,
            CapacityPolicy::Explicit(caps),
        )
        .unwrap(),
    );

    let driver = BfsDriver::new(settings(3, 2, 4), Arc::clone(&quota), source);
    let result = driver.run(seeds(&[("#A", 150)])).await.unwrap();

    assert_eq!(result.records.len(), 5);
    assert_eq!(quota.accepted(), 5);
    assert_eq!(result.summary.termination, TerminationReason::QuotaMet);
    assert_eq!(
        result.records.iter().filter(|r| r.depth == 1).count(),
        3,
        "width caps the first level"
    );
    assert_linkage(&result);

    let bucket = result
        .summary
        .strata
        .iter()
        .find(|s| s.stratum == Stratum::Bucket { floor: 100, width: 100 })
        .unwrap();
    assert_eq!(bucket.accepted, 5);
    assert!(bucket.is_full());
}

#[tokio::test]
async fn test_all_fetches_fail() {
    let source = Arc::new(StaticSource::new().with_failure("#S1"));
    let quota = band_allocator(100, 0, 10_000);

    let driver = BfsDriver::new(settings(3, 5, 2), quota, Arc::clone(&source) as _);
    let result = driver
        .run(seeds(&[("#S1", 500), ("#S2", 600)]))
        .await
        .unwrap();

    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| r.is_seed()));
    assert_eq!(result.summary.termination, TerminationReason::FrontierExhausted);
    assert_eq!(result.summary.levels_expanded, 1);
    assert_eq!(result.summary.failed_fetches, 2);
    assert_eq!(result.summary.tasks_processed, 2);
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_zero_width_admits_only_seeds() {
    let source = Arc::new(StaticSource::new().with_ladder("#S", 500, opponents("O", 3, 500)));
    let quota = band_allocator(100, 0, 10_000);

    let driver = BfsDriver::new(settings(0, 5, 2), quota, Arc::clone(&source) as _);
    let result = driver.run(seeds(&[("#S", 500)])).await.unwrap();

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.summary.levels_expanded, 0);
    assert_eq!(result.summary.termination, TerminationReason::FrontierExhausted);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_depth_limit() {
    // Chain: A -> B -> C -> D
    let source = Arc::new(
        StaticSource::new()
            .with_ladder("#A", 500, [Participant::new("#B", 500, "B")])
            .with_ladder("#B", 500, [Participant::new("#C", 500, "C")])
            .with_ladder("#C", 500, [Participant::new("#D", 500, "D")]),
    );
    let quota = band_allocator(100, 0, 10_000);

    let driver = BfsDriver::new(settings(1, 2, 2), quota, Arc::clone(&source) as _);
    let result = driver.run(seeds(&[("#A", 500)])).await.unwrap();

    let tags: Vec<&str> = result.records.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, vec!["#A", "#B", "#C"]);
    assert_eq!(result.summary.termination, TerminationReason::DepthLimit);
    assert_eq!(result.summary.levels_expanded, 2);
    assert_eq!(result.summary.max_depth_reached, 2);
    assert!(!source.fetched_tags().contains(&"#C".to_string()));
    assert_linkage(&result);
}

#[tokio::test]
async fn test_shared_opponents_claimed_once() {
    // Every seed played the same five opponents
    let shared = opponents("X", 5, 800);
    let mut source = StaticSource::new();
    for i in 0..6 {
        source = source.with_ladder(&format!("#S{}", i), 800, shared.clone());
    }
    let quota = band_allocator(1_000, 0, 10_000);

    let entries: Vec<(String, u32)> = (0..6).map(|i| (format!("#S{}", i), 800)).collect();
    let seed_refs: Vec<(&str, u32)> = entries.iter().map(|(t, n)| (t.as_str(), *n)).collect();

    let driver = BfsDriver::new(settings(5, 3, 6), quota, Arc::new(source));
    let result = driver.run(seeds(&seed_refs)).await.unwrap();

    assert_eq!(result.records.len(), 11);
    let unique: HashSet<&str> = result.records.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(unique.len(), 11);
    assert_linkage(&result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_workers_never_overshoot() {
    let mut source = StaticSource::new();
    let mut entries = Vec::new();
    for i in 0..10 {
        let tag = format!("#S{}", i);
        source = source.with_ladder(&tag, 3000, opponents(&format!("S{}N", i), 20, 3000));
        entries.push(tag);
    }
    let seed_refs: Vec<(&str, u32)> = entries.iter().map(|t| (t.as_str(), 3000)).collect();
    let quota = band_allocator(57, 0, 10_000);

    let driver = BfsDriver::new(settings(20, 5, 32), Arc::clone(&quota), Arc::new(source));
    let result = driver.run(seeds(&seed_refs)).await.unwrap();

    assert_eq!(result.records.len(), 57);
    assert_eq!(quota.accepted(), 57);
    assert_eq!(result.summary.termination, TerminationReason::QuotaMet);
    assert_linkage(&result);
}

#[tokio::test]
async fn test_empty_seeds_rejected() {
    let quota = band_allocator(10, 0, 10_000);
    let driver = BfsDriver::new(settings(3, 2, 2), quota, Arc::new(StaticSource::new()));

    let err = driver.run(seeds(&[])).await.unwrap_err();
    assert!(matches!(
        err,
        CrawlerError::Seed(SeedError::Empty { .. })
    ));
}

#[tokio::test]
async fn test_seeds_outside_quota_rejected() {
    let mut caps = HashMap::new();
    caps.insert(Stratum::Arena(10), 5);
    let quota = Arc::new(
        QuotaAllocator::with_policy(5, Strategy::ArenaBased, None, CapacityPolicy::Explicit(caps))
            .unwrap(),
    );
    let driver = BfsDriver::new(settings(3, 2, 2), quota, Arc::new(StaticSource::new()));

    // 150 trophies is far below arena 10
    let err = driver.run(seeds(&[("#LOW", 150)])).await.unwrap_err();
    assert!(matches!(
        err,
        CrawlerError::Seed(SeedError::Empty { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_seeds_admitted_once() {
    let quota = band_allocator(10, 0, 10_000);
    let driver = BfsDriver::new(settings(0, 2, 2), quota, Arc::new(StaticSource::new()));

    let result = driver
        .run(seeds(&[("#S", 500), ("#S", 500), ("#T", 400)]))
        .await
        .unwrap();
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.summary.seeds_admitted, 2);
}

#[tokio::test]
async fn test_interrupt_before_first_level() {
    let source = Arc::new(StaticSource::new().with_ladder("#S", 500, opponents("O", 3, 500)));
    let quota = band_allocator(100, 0, 10_000);

    let driver = BfsDriver::new(settings(3, 5, 2), quota, Arc::clone(&source) as _);
    driver.shutdown_flag().store(true, Ordering::SeqCst);
    let result = driver.run(seeds(&[("#S", 500)])).await.unwrap();

    assert_eq!(result.summary.termination, TerminationReason::Interrupted);
    assert_eq!(result.records.len(), 1);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_trophy_refresh_recorded() {
    // Seed file says 500, the profile now says 530
    let source = StaticSource::new().with_ladder("#S", 530, opponents("O", 1, 500));
    let quota = band_allocator(100, 0, 10_000);

    let driver = BfsDriver::new(settings(1, 1, 1), quota, Arc::new(source));
    let result = driver.run(seeds(&[("#S", 500)])).await.unwrap();

    assert_eq!(result.records[0].trophies, 500);
    assert_eq!(result.latest_trophies.get("#S"), Some(&530));
    assert!(!result.latest_trophies.contains_key("#O0"));
}

#[tokio::test]
async fn test_observer_sees_states_and_levels() {
    let source = Arc::new(
        StaticSource::new()
            .with_ladder("#A", 500, [Participant::new("#B", 500, "B")])
            .with_ladder("#B", 500, Vec::new()),
    );
    let quota = band_allocator(100, 0, 10_000);
    let driver = BfsDriver::new(settings(1, 5, 1), quota, source);

    let mut states = Vec::new();
    let mut seeded = 0;
    let mut level_admitted = Vec::new();
    let mut progress_reports = 0;

    let result = driver
        .run_with(seeds(&[("#A", 500)]), |event| match event {
            CrawlEvent::State(s) => states.push(s),
            CrawlEvent::Seeded(records) => seeded = records.len(),
            CrawlEvent::LevelComplete { depth, admitted, .. } => {
                level_admitted.push((depth, admitted.len()))
            }
            CrawlEvent::Progress(_) => progress_reports += 1,
        })
        .await
        .unwrap();

    assert_eq!(seeded, 1);
    assert_eq!(level_admitted, vec![(0, 1), (1, 0)]);
    assert_eq!(progress_reports, 2);
    assert_eq!(states.first(), Some(&CrawlState::Idle));
    assert!(states.contains(&CrawlState::ExpandingLevel { depth: 1 }));
    assert_eq!(
        states.last(),
        Some(&CrawlState::Complete(TerminationReason::FrontierExhausted))
    );
    assert_eq!(result.records.len(), 2);
}
