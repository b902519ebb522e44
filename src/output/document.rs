//! Single-document JSON output
//!
//! ```text
//! { "metadata": { total_players, scraping_timestamp, description,
//!                 scraping_method, total_quota, quota_strategy, quota_achieved },
//!   "summary":  { ... },
//!   "players":  [ { tag, trophies, name, depth, source, ... }, ... ] }
//! ```
//!
//! Written to a temporary sibling first and renamed into place.

use crate::crawler::{CrawlResult, PlayerRecord, RunSummary};
use crate::error::OutputResult;
use crate::quota::Strategy;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Collection method recorded in the metadata block
pub const SCRAPING_METHOD: &str = "uniform_parallel_bfs";

#[derive(Debug, Serialize)]
struct Metadata {
    total_players: usize,
    /// Unix time in seconds
    scraping_timestamp: f64,
    description: String,
    scraping_method: &'static str,
    total_quota: u64,
    quota_strategy: Strategy,
    quota_achieved: u64,
}

#[derive(Debug, Serialize)]
struct DocumentPlayer<'a> {
    #[serde(flatten)]
    record: &'a PlayerRecord,

    #[serde(skip_serializing_if = "Option::is_none")]
    latest_trophies: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    metadata: Metadata,
    summary: &'a RunSummary,
    players: Vec<DocumentPlayer<'a>>,
}

/// Write the whole crawl result as one JSON document
pub fn write_document(path: &Path, result: &CrawlResult) -> OutputResult<()> {
    let summary = &result.summary;
    let document = Document {
        metadata: Metadata {
            total_players: result.records.len(),
            scraping_timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            description: format!("Uniform player network - {} distribution", summary.strategy),
            scraping_method: SCRAPING_METHOD,
            total_quota: summary.quota_target,
            quota_strategy: summary.strategy,
            quota_achieved: summary.achieved,
        },
        summary,
        players: result
            .records
            .iter()
            .map(|record| DocumentPlayer {
                record,
                latest_trophies: result.latest_trophies.get(&record.tag).copied(),
            })
            .collect(),
    };

    let tmp_path = temp_path(path);
    {
        let file = File::create(&tmp_path)?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &document)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), players = result.records.len(), "Wrote JSON document");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
