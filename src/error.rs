//! Error types for trophy-crawler
//!
//! This module defines the error hierarchy for the crawler:
//! - Startup errors (unreadable or empty seed source) that abort the run
//! - Per-entry seed validation errors that are logged and skipped
//! - Per-task fetch errors that are counted and converted to empty outcomes
//! - Configuration, output and worker errors
//!
//! Only startup, configuration and output failures propagate out of
//! [`crate::crawler::BfsDriver::run`]. Fetch failures never leave the task
//! that produced them.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fatal seed loading errors
    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    /// Result writer errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Worker pool errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors raised while loading the seed list
///
/// Any of these aborts the run before the first level is expanded.
#[derive(Error, Debug)]
pub enum SeedError {
    /// Seed file could not be read
    #[error("Cannot read seed file '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Seed file is not a JSON array of objects
    #[error("Seed file '{path}' is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// No usable seed survived validation (or admission)
    #[error("No valid seed players in '{source_name}'")]
    Empty { source_name: String },
}

/// A single seed entry that failed validation
///
/// Non-fatal: the entry is skipped with a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedRecordError {
    /// Entry has no player tag
    #[error("Seed entry #{index} has no tag")]
    MissingTag { index: usize },

    /// Entry has no (or a non-numeric) trophy count
    #[error("Seed entry #{index} ('{tag}') has no valid trophy count")]
    MissingTrophies { index: usize, tag: String },

    /// Entry is not a JSON object
    #[error("Seed entry #{index} is not an object")]
    NotAnObject { index: usize },
}

/// Per-task player fetch errors
///
/// Every variant is treated as transient: the task yields zero discoveries
/// and the run continues. Tasks are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, reset)
    #[error("Network error fetching '{tag}': {reason}")]
    Network { tag: String, reason: String },

    /// Non-success HTTP status
    #[error("Unexpected status {status} fetching '{tag}'")]
    Status { tag: String, status: u16 },

    /// Payload could not be decoded into the expected shape
    #[error("Malformed payload for '{tag}': {reason}")]
    Malformed { tag: String, reason: String },

    /// Source explicitly reported failure for this player
    #[error("Source reported failure for '{tag}'")]
    Rejected { tag: String },
}

impl FetchError {
    /// Tag of the player whose fetch failed
    pub fn tag(&self) -> &str {
        match self {
            FetchError::Network { tag, .. }
            | FetchError::Status { tag, .. }
            | FetchError::Malformed { tag, .. }
            | FetchError::Rejected { tag } => tag,
        }
    }

    /// Check if this error is routine enough to log at debug level
    ///
    /// Unknown players are common when following stale match logs.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            FetchError::Status { status: 404, .. } | FetchError::Rejected { .. }
        )
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Quota must be positive
    #[error("Invalid quota {quota}: must be greater than 0")]
    InvalidQuota { quota: u64 },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid BFS depth
    #[error("Invalid max depth {depth}: must be at least 1")]
    InvalidMaxDepth { depth: u32 },

    /// Invalid per-task delay
    #[error("Invalid delay {delay}: must be a finite number of seconds >= 0")]
    InvalidDelay { delay: f64 },

    /// Invalid progress interval
    #[error("Invalid progress interval {interval}: must be at least 1")]
    InvalidProgressInterval { interval: u64 },

    /// Strata definition does not fit the requested strategy
    #[error("Invalid strata definition: {reason}")]
    InvalidStrata { reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Seed input path error
    #[error("Invalid input path '{path}': {reason}")]
    InvalidInputPath { path: PathBuf, reason: String },

    /// API base URL is not http(s)
    #[error("Invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// HTTP timeout must be positive
    #[error("Invalid timeout {secs}s: must be greater than 0")]
    InvalidTimeout { secs: u64 },
}

/// Result writer errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create the output file
    #[error("Failed to create output at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Writer channel closed unexpectedly
    #[error("Record writer channel closed unexpectedly")]
    ChannelClosed,

    /// Writer thread panicked
    #[error("Record writer thread panicked")]
    WriterPanicked,
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Expansion task panicked
    #[error("Expansion task for '{tag}' panicked: {message}")]
    Panicked { tag: String, message: String },

    /// Pool semaphore closed while dispatching
    #[error("Worker pool closed while dispatching")]
    PoolClosed,

    /// Failed to build the async runtime
    #[error("Failed to initialize worker runtime: {reason}")]
    InitFailed { reason: String },
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for FetchError
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for OutputError
pub type OutputResult<T> = std::result::Result<T, OutputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_tag() {
        let err = FetchError::Status {
            tag: "P1".into(),
            status: 503,
        };
        assert_eq!(err.tag(), "P1");
        assert!(!err.is_quiet());

        let not_found = FetchError::Status {
            tag: "P2".into(),
            status: 404,
        };
        assert!(not_found.is_quiet());
    }

    #[test]
    fn test_error_conversion() {
        let seed_err = SeedError::Empty {
            source_name: "seeds.json".into(),
        };
        let err: CrawlerError = seed_err.into();
        assert!(matches!(err, CrawlerError::Seed(_)));

        let cfg_err = ConfigError::InvalidQuota { quota: 0 };
        let err: CrawlerError = cfg_err.into();
        assert!(err.to_string().contains("must be greater than 0"));
    }
}
