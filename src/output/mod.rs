//! Result writers
//!
//! The crawl result can be persisted as:
//! - SQLite (`.db`): streamed level by level through a dedicated writer
//!   thread, finalized with the run summary
//! - JSON (`.json`): one document written after the crawl
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │            BfsDriver             │
//! │  CrawlEvent::Seeded / Level...   │
//! └────────────────┬─────────────────┘
//!                  │ WriterMessage (bounded channel)
//!                  ▼
//! ┌──────────────────────────────────┐
//! │       BatchedWriter thread       │
//! │  buffers, flushes per batch/idle │
//! └────────────────┬─────────────────┘
//!                  ▼
//!             crawl.db
//! ```

pub mod document;
pub mod schema;
pub mod writer;

pub use document::write_document;
pub use schema::keys;
pub use writer::{BatchedWriter, WriterHandle, WriterMessage, WriterStats};

use crate::config::OutputFormat;
use crate::crawler::{CrawlResult, PlayerRecord};
use crate::error::OutputResult;
use std::path::{Path, PathBuf};
use tracing::error;

/// Records per SQLite transaction
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Output that abstracts over the supported formats
pub enum ResultWriter {
    Sqlite(BatchedWriter),
    Json(PathBuf),
}

impl ResultWriter {
    /// Open the output for `format`
    ///
    /// SQLite output is created immediately so a bad path fails before the
    /// crawl starts.
    pub fn create(path: &Path, format: OutputFormat) -> OutputResult<Self> {
        match format {
            OutputFormat::Sqlite => {
                let writer =
                    BatchedWriter::new(path, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_SIZE * 4)?;
                Ok(ResultWriter::Sqlite(writer))
            }
            OutputFormat::Json => Ok(ResultWriter::Json(path.to_path_buf())),
        }
    }

    /// Handle for streaming records, when the format supports it
    pub fn handle(&self) -> Option<WriterHandle> {
        match self {
            ResultWriter::Sqlite(w) => Some(w.handle()),
            ResultWriter::Json(_) => None,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ResultWriter::Sqlite(w) => w.db_path(),
            ResultWriter::Json(path) => path,
        }
    }

    /// Finalize the output with the finished crawl
    pub fn finish(self, seed_source: &str, result: &CrawlResult) -> OutputResult<()> {
        match self {
            ResultWriter::Sqlite(w) => w.finish(seed_source, &result.summary),
            ResultWriter::Json(path) => write_document(&path, result),
        }
    }

    /// Close the output after a failed crawl
    pub fn abandon(self) -> OutputResult<()> {
        match self {
            ResultWriter::Sqlite(w) => w.abandon(),
            ResultWriter::Json(_) => Ok(()),
        }
    }
}

/// Send records to the writer, logging (not propagating) channel failures
///
/// A closed channel means the writer thread already stopped with an error,
/// which [`ResultWriter::finish`] reports.
pub fn stream_records(handle: &WriterHandle, records: &[PlayerRecord]) {
    for record in records {
        if let Err(e) = handle.send_record(record.clone()) {
            error!(error = %e, "Failed to send record to writer");
            return;
        }
    }
}

/// Send trophy refreshes to the writer, logging channel failures
pub fn stream_refreshes(handle: &WriterHandle, refreshes: &[(String, u32)]) {
    for (tag, trophies) in refreshes {
        if let Err(e) = handle.send_refresh(tag.clone(), *trophies) {
            error!(error = %e, "Failed to send trophy refresh to writer");
            return;
        }
    }
}
