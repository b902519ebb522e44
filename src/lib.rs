//! trophy-crawler - Quota-Constrained Parallel BFS Player Crawler
//!
//! Builds a uniformly distributed sample of game players by walking the
//! "played a ladder match against" graph breadth-first, starting from a seed
//! list, while a quota allocator keeps every trophy stratum (arena or
//! 100-trophy bucket) from taking more than its share.
//!
//! # Features
//!
//! - **Level-Synchronized BFS**: Each depth is expanded in parallel and fully
//!   drained before the next one starts, so records at depth `d` are always
//!   expanded before any record at depth `d + 1`.
//!
//! - **Exact Quotas**: Admission is an atomic check-and-increment; concurrent
//!   workers can never push a stratum or the global total past its capacity.
//!
//! - **Bounded Parallelism**: A fixed number of expansion tasks run at once,
//!   each rate-limited by a fixed delay before its profile fetch.
//!
//! - **SQLite or JSON Output**: Records are streamed to SQLite as each level
//!   completes, or written as a single JSON document at the end.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Profile API                               │
//! │              (profile + recent match history)                    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ PlayerSource::fetch
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Pool (tokio)                         │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │ Task 1  │  │ Task 2  │  │ Task 3  │  ...    │ Task N  │     │
//! │  │ expand  │  │ expand  │  │ expand  │         │ expand  │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┼────────────┼────────────────────┘          │
//! │                    ▼            ▼                               │
//! │     ┌──────────────────┐  ┌──────────────────┐                  │
//! │     │ Visited Registry │  │ Quota Allocator  │                  │
//! │     │ (claim once)     │  │ (atomic admit)   │                  │
//! │     └──────────────────┘  └──────────────────┘                  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ level barrier
//!                               ▼
//!                    ┌──────────────────┐
//!                    │    BfsDriver     │──► crawl.db / crawl.json
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Arena-balanced sample of 50,000 players
//! trophy-crawler -i seeds.json -o crawl.db
//!
//! # 100-trophy buckets, faster and wider
//! trophy-crawler --strategy bucket_based --width 5 -w 10 --delay 0.5
//!
//! # Query results
//! sqlite3 crawl.db "SELECT depth, COUNT(*) FROM players GROUP BY depth"
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod output;
pub mod progress;
pub mod quota;
pub mod seed;
pub mod source;

pub use config::{CliArgs, CrawlConfig, OutputFormat};
pub use crawler::{BfsDriver, CrawlResult, CrawlSettings, PlayerRecord, RunSummary, TerminationReason};
pub use error::{CrawlerError, Result};
pub use quota::{CapacityPolicy, Partition, QuotaAllocator, Stratum, Strategy};
pub use seed::{load_seeds, SeedSet};
pub use source::{PlayerSource, PlayerProfile};
