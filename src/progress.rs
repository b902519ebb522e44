//! Progress reporting for the crawler
//!
//! [`CrawlProgress`] is a plain value computed from the allocator snapshot
//! and the run counters; it never touches shared state itself. The
//! [`ProgressReporter`] renders it with an indicatif spinner.

use crate::crawler::RunSummary;
use crate::quota::{QuotaSnapshot, StratumProgress, Strategy};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Default number of processed tasks between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 20;

/// Stratum breakdowns are printed every this many reports
const BREAKDOWN_EVERY: u64 = 5;

/// When progress reports are due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCadence {
    interval: u64,
}

impl ReportCadence {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Report after the first task and then every `interval` tasks
    pub fn is_due(&self, processed: u64) -> bool {
        processed == 1 || (processed > 0 && processed % self.interval == 0)
    }

    /// Per-stratum breakdown every `5 * interval` tasks
    pub fn is_breakdown_due(&self, processed: u64) -> bool {
        processed > 0 && processed % (self.interval * BREAKDOWN_EVERY) == 0
    }
}

impl Default for ReportCadence {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

/// Point-in-time crawl progress
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    /// Tasks finished so far
    pub processed: u64,

    /// Tasks whose fetch failed
    pub failed: u64,

    /// Players accepted, seeds included
    pub accepted: u64,

    /// Players accepted while seeding
    pub seeded: u64,

    /// Global quota
    pub quota: u64,

    pub strategy: Strategy,

    pub strata: Vec<StratumProgress>,

    /// BFS depth being expanded
    pub depth: u32,

    /// Time since the crawl started
    pub elapsed: Duration,

    /// Whether a stratum breakdown should accompany this report
    pub breakdown: bool,
}

impl CrawlProgress {
    /// Build a progress value from an allocator snapshot and run counters
    pub fn capture(
        snapshot: QuotaSnapshot,
        processed: u64,
        failed: u64,
        seeded: u64,
        depth: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            processed,
            failed,
            accepted: snapshot.global_accepted,
            seeded,
            quota: snapshot.global_target,
            strategy: snapshot.strategy,
            strata: snapshot.strata,
            depth,
            elapsed,
            breakdown: false,
        }
    }

    /// Tasks per second over the whole run
    pub fn tasks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Global completion in percent
    pub fn percent(&self) -> f64 {
        if self.quota == 0 {
            100.0
        } else {
            self.accepted as f64 / self.quota as f64 * 100.0
        }
    }

    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.accepted)
    }

    /// Linear time-to-quota from the admission rate since the crawl started
    ///
    /// `None` until at least one player has been discovered.
    pub fn eta(&self) -> Option<Duration> {
        let discovered = self.accepted.saturating_sub(self.seeded);
        let secs = self.elapsed.as_secs_f64();
        if discovered == 0 || secs <= 0.0 {
            return None;
        }
        let rate = discovered as f64 / secs;
        Some(Duration::from_secs_f64(self.remaining() as f64 / rate))
    }

    /// One-line status message
    pub fn status_line(&self) -> String {
        let eta = self
            .eta()
            .map(format_duration)
            .unwrap_or_else(|| "--".to_string());
        format!(
            "Depth: {} | Processed: {} | Failed: {} | Accepted: {}/{} ({:.1}%) | Rate: {:.1}/s | ETA: {}",
            self.depth,
            format_number(self.processed),
            format_number(self.failed),
            format_number(self.accepted),
            format_number(self.quota),
            self.percent(),
            self.tasks_per_second(),
            eta,
        )
    }
}

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Reporter that draws nothing (quiet mode)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CrawlProgress) {
        self.bar.set_message(progress.status_line());
        if progress.breakdown {
            self.print_breakdown(&progress.strata);
        }
    }

    /// Print per-stratum completion above the spinner
    pub fn print_breakdown(&self, strata: &[StratumProgress]) {
        self.bar.println(format!("{}", style("Quota progress").bold()));
        for line in breakdown_lines(strata) {
            self.bar.println(line);
        }
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn breakdown_lines(strata: &[StratumProgress]) -> Vec<String> {
    strata
        .iter()
        .filter(|s| s.capacity > 0)
        .map(|s| {
            let mark = if s.is_full() { "✓" } else { " " };
            format!(
                "  {} {:>12}: {:>7}/{:<7} ({:5.1}%)",
                mark,
                s.stratum.to_string(),
                format_number(s.accepted),
                format_number(s.capacity),
                s.percent()
            )
        })
        .collect()
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Format a duration as `1h 02m 03s` / `2m 03s` / `3s`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Print a summary of the crawl results
pub fn print_summary(summary: &RunSummary, output: &str) {
    let duration_secs = summary.elapsed.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.tasks_processed as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Crawl Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Strategy:").bold(), summary.strategy);
    println!(
        "  {} {}/{} ({:.1}%)",
        style("Accepted:").bold(),
        format_number(summary.achieved),
        format_number(summary.quota_target),
        summary.achieved_percent()
    );
    println!(
        "  {} {} ({} levels expanded)",
        style("Max depth:").bold(),
        summary.max_depth_reached,
        summary.levels_expanded
    );
    println!(
        "  {} {} ({:.1} tasks/sec)",
        style("Tasks:").bold(),
        format_number(summary.tasks_processed),
        rate
    );
    println!(
        "  {} {}",
        style("Duration:").bold(),
        format_duration(summary.elapsed)
    );
    if summary.failed_fetches > 0 {
        println!(
            "  {} {}",
            style("Failed fetches:").yellow().bold(),
            format_number(summary.failed_fetches)
        );
    }
    println!("  {} {}", style("Stopped:").bold(), summary.termination);
    println!("  {} {}", style("Output:").bold(), output);
    println!();

    if !summary.strata.is_empty() {
        println!("{}", style("Final quota distribution").bold());
        for line in breakdown_lines(&summary.strata) {
            println!("{}", line);
        }
        println!();
    }
}

/// Print a header at the start of the crawl
pub fn print_header(input: &str, strategy: Strategy, quota: u64, workers: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("trophy-crawler").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Seeds:").bold(), input);
    println!("  {} {}", style("Strategy:").bold(), strategy);
    println!("  {} {}", style("Quota:").bold(), format_number(quota));
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
