//! Configuration types for trophy-crawler
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Output format selection from the output path

use crate::crawler::CrawlSettings;
use crate::error::ConfigError;
use crate::quota::{Partition, QuotaAllocator, Strategy};
use crate::source::http::{HttpSourceConfig, DEFAULT_BASE_URL};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Quota-constrained BFS crawler for sampling players across trophy ranges
#[derive(Parser, Debug, Clone)]
#[command(
    name = "trophy-crawler",
    version,
    about = "Quota-constrained parallel BFS crawler for game players",
    long_about = "Discovers players by breadth-first traversal of their ladder match history,\n\
                  starting from a seed list, while keeping the collected sample uniform\n\
                  across trophy strata (arenas or 100-trophy buckets).\n\n\
                  Every level of the BFS is expanded in parallel; the crawl stops when the\n\
                  global quota is met, the depth limit is reached or no new players turn up.",
    after_help = "EXAMPLES:\n    \
        trophy-crawler -i seeds.json -o crawl.db\n    \
        trophy-crawler --quota 10000 --strategy bucket_based -w 10 --delay 0.5\n    \
        trophy-crawler --strategy hybrid --width 5 --max-depth 4 -o sample.json\n    \
        trophy-crawler --rng-seed 42 --quota 500 -q"
)]
pub struct CliArgs {
    /// Seed players (JSON array of {tag, trophies, name})
    #[arg(
        short = 'i',
        long,
        default_value = "clash_royale_arenas_complete.json",
        value_name = "FILE"
    )]
    pub input: PathBuf,

    /// Output file (.db for SQLite, .json for a single JSON document)
    #[arg(short, long, default_value = "crawl.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Total number of players to collect
    #[arg(long, default_value = "50000", value_name = "NUM")]
    pub quota: u64,

    /// How the quota is split across trophy ranges
    #[arg(long, value_enum, default_value = "arena_based")]
    pub strategy: Strategy,

    /// Opponents sampled per expanded player
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub width: usize,

    /// Number of BFS levels to expand
    #[arg(short = 'd', long, default_value = "10", value_name = "NUM")]
    pub max_depth: u32,

    /// Seconds to wait before each profile fetch
    #[arg(long, default_value = "1.0", value_name = "SECS")]
    pub delay: f64,

    /// Number of concurrent expansion tasks
    #[arg(short = 'w', long, default_value = "5", value_name = "NUM")]
    pub workers: usize,

    /// Processed players between progress reports
    #[arg(long, default_value = "20", value_name = "NUM")]
    pub progress_interval: u64,

    /// Profile API base URL
    #[arg(
        long,
        env = "TROPHY_CRAWLER_BASE_URL",
        default_value = DEFAULT_BASE_URL,
        value_name = "URL"
    )]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub timeout: u64,

    /// Seed for opponent sampling (random if not set)
    #[arg(long, value_name = "NUM")]
    pub rng_seed: Option<u64>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Output format for crawl results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// SQLite database (.db)
    Sqlite,
    /// Single JSON document (.json)
    Json,
}

impl OutputFormat {
    /// Determine output format from the file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("db") | Some("sqlite") | Some("sqlite3") => Ok(OutputFormat::Sqlite),
            Some("json") => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: "extension must be .db or .json".to_string(),
            }),
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed file
    pub input_path: PathBuf,

    /// Output path
    pub output_path: PathBuf,

    /// Output format (SQLite or JSON)
    pub output_format: OutputFormat,

    /// Global quota
    pub total_quota: u64,

    /// Stratification strategy
    pub strategy: Strategy,

    /// BFS tunables
    pub settings: CrawlSettings,

    /// Profile API connection settings
    pub http: HttpSourceConfig,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.quota == 0 {
            return Err(ConfigError::InvalidQuota { quota: args.quota });
        }

        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth {
                depth: args.max_depth,
            });
        }

        if !args.delay.is_finite() || args.delay < 0.0 {
            return Err(ConfigError::InvalidDelay { delay: args.delay });
        }

        if args.progress_interval == 0 {
            return Err(ConfigError::InvalidProgressInterval {
                interval: args.progress_interval,
            });
        }

        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { secs: args.timeout });
        }

        if !(args.base_url.starts_with("http://") || args.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl {
                url: args.base_url.clone(),
                reason: "must start with http:// or https://".to_string(),
            });
        }

        if args.input.is_dir() {
            return Err(ConfigError::InvalidInputPath {
                path: args.input.clone(),
                reason: "is a directory".to_string(),
            });
        }

        let output_format = OutputFormat::from_path(&args.output)?;

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let settings = CrawlSettings {
            width: args.width,
            max_depth: args.max_depth,
            delay: Duration::from_secs_f64(args.delay),
            workers: args.workers,
            progress_interval: args.progress_interval,
            rng_seed: args.rng_seed,
        };

        let http = HttpSourceConfig {
            base_url: args.base_url,
            timeout: Duration::from_secs(args.timeout),
            ..Default::default()
        };

        Ok(Self {
            input_path: args.input,
            output_path: args.output,
            output_format,
            total_quota: args.quota,
            strategy: args.strategy,
            settings,
            http,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Partition handed to the allocator
    ///
    /// Hybrid runs from the command line stratify by arena and are bounded
    /// by the global quota only.
    pub fn partition(&self) -> Option<Partition> {
        match self.strategy {
            Strategy::Hybrid => Some(Partition::arenas()),
            Strategy::ArenaBased | Strategy::BucketBased => None,
        }
    }

    /// Build the quota allocator for this run
    pub fn allocator(&self) -> Result<QuotaAllocator, ConfigError> {
        QuotaAllocator::configure(self.total_quota, self.strategy, self.partition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::CapacityPolicy;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["trophy-crawler"];
        argv.extend_from_slice(args);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::from_args(parse(&[])).unwrap();
        assert_eq!(config.total_quota, 50_000);
        assert_eq!(config.strategy, Strategy::ArenaBased);
        assert_eq!(config.settings.width, 3);
        assert_eq!(config.settings.max_depth, 10);
        assert_eq!(config.settings.delay, Duration::from_secs(1));
        assert_eq!(config.settings.workers, 5);
        assert_eq!(config.settings.progress_interval, 20);
        assert_eq!(config.output_format, OutputFormat::Sqlite);
        assert_eq!(
            config.input_path,
            PathBuf::from("clash_royale_arenas_complete.json")
        );
        assert!(config.show_progress);
    }

    #[test]
    fn test_strategy_values() {
        let config = CrawlConfig::from_args(parse(&["--strategy", "bucket_based"])).unwrap();
        assert_eq!(config.strategy, Strategy::BucketBased);

        let config = CrawlConfig::from_args(parse(&["--strategy", "hybrid"])).unwrap();
        let allocator = config.allocator().unwrap();
        assert_eq!(allocator.policy(), &CapacityPolicy::GlobalOnly);
        assert_eq!(allocator.snapshot().strata.len(), 24);
    }

    #[test]
    fn test_invalid_values() {
        let err = CrawlConfig::from_args(parse(&["--quota", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuota { .. }));

        let err = CrawlConfig::from_args(parse(&["-w", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { .. }));

        let err = CrawlConfig::from_args(parse(&["-w", "1000"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { .. }));

        let err = CrawlConfig::from_args(parse(&["--max-depth", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxDepth { .. }));

        let err = CrawlConfig::from_args(parse(&["--delay=-1"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDelay { .. }));

        let err = CrawlConfig::from_args(parse(&["--progress-interval", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProgressInterval { .. }));

        let err = CrawlConfig::from_args(parse(&["--base-url", "ftp://x"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_width_zero_allowed() {
        let config = CrawlConfig::from_args(parse(&["--width", "0"])).unwrap();
        assert_eq!(config.settings.width, 0);
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out.DB")).unwrap(),
            OutputFormat::Sqlite
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("out.json")).unwrap(),
            OutputFormat::Json
        );
        assert!(OutputFormat::from_path(Path::new("out.csv")).is_err());
        assert!(OutputFormat::from_path(Path::new("out")).is_err());
    }

    #[test]
    fn test_missing_output_parent() {
        let err =
            CrawlConfig::from_args(parse(&["-o", "/nonexistent/dir/crawl.db"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOutputPath { .. }));
    }
}
