//! Quota-constrained parallel BFS crawler
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │          BfsDriver           │
//!                  │  seeds, level barrier, stop  │
//!                  └──────────────┬───────────────┘
//!                                 │ frontier (one level)
//!                  ┌──────────────▼───────────────┐
//!                  │   WorkerPool (N permits)     │
//!                  └──────────────┬───────────────┘
//!       ┌─────────────────────────┼─────────────────────────┐
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  expand   │             │  expand   │             │  expand   │
//! │ fetch     │             │ fetch     │             │ fetch     │
//! │ sample    │             │ sample    │             │ sample    │
//! │ claim+adm │             │ claim+adm │             │ claim+adm │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       └────────────┬────────────┴────────────┬────────────┘
//!           ┌────────▼────────┐       ┌────────▼────────┐
//!           │ VisitedRegistry │       │ QuotaAllocator  │
//!           └─────────────────┘       └─────────────────┘
//! ```

pub mod driver;
pub mod pool;
pub mod record;
pub mod task;
pub mod visited;

pub use driver::{
    next_state, BfsDriver, Checkpoint, CrawlEvent, CrawlResult, CrawlSettings, CrawlState,
    RunSummary, TerminationReason,
};
pub use pool::{CrawlStats, LevelReport, PoolEvent, WorkerPool};
pub use record::{PlayerRecord, LADDER_MODE, SEED_SOURCE};
pub use task::{expand, FetchStatus, Sampler, TaskContext, TaskOutcome};
pub use visited::VisitedRegistry;
