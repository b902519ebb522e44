//! Batched SQLite writer for the crawl record log
//!
//! Runs in a dedicated thread and receives records via a bounded channel.
//! The driver sends each level's admissions as soon as the level passes its
//! barrier, so an interrupted crawl still leaves every admitted record on
//! disk with `crawl_info.status` left at `running` or set to `interrupted`.
//!
//! - Batched inserts inside one transaction per flush
//! - Prepared statements via `prepare_cached`
//! - Single writer thread avoids SQLite contention

use crate::crawler::{PlayerRecord, RunSummary, TerminationReason};
use crate::error::{OutputError, OutputResult};
use crate::output::schema::{self, keys};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Message types sent to the writer thread
#[derive(Debug)]
pub enum WriterMessage {
    /// Insert an admitted player
    Record(PlayerRecord),

    /// Store the latest trophy count seen for an admitted player
    Refresh { tag: String, trophies: u32 },

    /// Flush pending writes
    Flush,

    /// Shutdown the writer
    Shutdown,
}

/// Statistics about write operations
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Total records written
    pub records_written: AtomicU64,

    /// Total trophy refreshes applied
    pub refreshes_written: AtomicU64,

    /// Total batches committed
    pub batches_committed: AtomicU64,
}

impl WriterStats {
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn refreshes_written(&self) -> u64 {
        self.refreshes_written.load(Ordering::Relaxed)
    }
}

/// Handle for sending messages to the writer
#[derive(Clone)]
pub struct WriterHandle {
    sender: Sender<WriterMessage>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// Send a record to be written
    pub fn send_record(&self, record: PlayerRecord) -> OutputResult<()> {
        self.sender
            .send(WriterMessage::Record(record))
            .map_err(|_| OutputError::ChannelClosed)
    }

    /// Send a trophy refresh for an already written record
    pub fn send_refresh(&self, tag: String, trophies: u32) -> OutputResult<()> {
        self.sender
            .send(WriterMessage::Refresh { tag, trophies })
            .map_err(|_| OutputError::ChannelClosed)
    }

    /// Request a flush of pending writes
    pub fn flush(&self) -> OutputResult<()> {
        self.sender
            .send(WriterMessage::Flush)
            .map_err(|_| OutputError::ChannelClosed)
    }

    fn shutdown(&self) -> OutputResult<()> {
        self.sender
            .send(WriterMessage::Shutdown)
            .map_err(|_| OutputError::ChannelClosed)
    }

    /// Get writer statistics
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

/// Batched database writer that runs in its own thread
pub struct BatchedWriter {
    handle: Option<JoinHandle<OutputResult<()>>>,
    writer_handle: WriterHandle,
    db_path: PathBuf,
}

impl BatchedWriter {
    /// Create the database and spawn the writer thread
    pub fn new(db_path: &Path, batch_size: usize, channel_size: usize) -> OutputResult<Self> {
        let batch_size = batch_size.max(1);
        let (sender, receiver) = bounded(channel_size.max(1));
        let stats = Arc::new(WriterStats::default());

        let writer_handle = WriterHandle {
            sender,
            stats: Arc::clone(&stats),
        };

        remove_existing(db_path)?;

        let conn = Connection::open(db_path).map_err(|e| OutputError::CreateFailed {
            path: db_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::create_database(&conn)?;

        schema::set_crawl_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
        schema::set_crawl_info(&conn, keys::CRAWLER_VERSION, env!("CARGO_PKG_VERSION"))?;
        schema::set_crawl_info(&conn, keys::START_TIME, &Utc::now().to_rfc3339())?;
        schema::set_crawl_info(&conn, keys::STATUS, "running")?;

        let stats_clone = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("db-writer".into())
            .spawn(move || writer_thread(conn, receiver, stats_clone, batch_size))
            .map_err(|e| OutputError::CreateFailed {
                path: db_path.to_path_buf(),
                reason: format!("Failed to spawn writer thread: {}", e),
            })?;

        Ok(Self {
            handle: Some(handle),
            writer_handle,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Get a handle for sending messages to the writer
    pub fn handle(&self) -> WriterHandle {
        self.writer_handle.clone()
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Stop the writer thread and finalize the database with the run summary
    pub fn finish(mut self, seed_source: &str, summary: &RunSummary) -> OutputResult<()> {
        self.join()?;

        let conn = Connection::open(&self.db_path)?;

        let end_time: DateTime<Utc> = Utc::now();
        let info = [
            (keys::SEED_SOURCE, seed_source.to_string()),
            (keys::END_TIME, end_time.to_rfc3339()),
            (keys::DURATION_SECS, format!("{:.3}", summary.elapsed.as_secs_f64())),
            (keys::STRATEGY, summary.strategy.to_string()),
            (keys::TOTAL_QUOTA, summary.quota_target.to_string()),
            (keys::QUOTA_ACHIEVED, summary.achieved.to_string()),
            (keys::LEVELS_EXPANDED, summary.levels_expanded.to_string()),
            (keys::MAX_DEPTH_REACHED, summary.max_depth_reached.to_string()),
            (keys::TASKS_PROCESSED, summary.tasks_processed.to_string()),
            (keys::FAILED_FETCHES, summary.failed_fetches.to_string()),
            (keys::TERMINATION, summary.termination.as_str().to_string()),
        ];
        for (key, value) in &info {
            schema::set_crawl_info(&conn, key, value)?;
        }

        let strata: Vec<(String, u64, u64)> = summary
            .strata
            .iter()
            .map(|s| (s.stratum.to_string(), s.accepted, s.capacity))
            .collect();
        schema::set_stratum_progress(&conn, &strata)?;

        schema::create_indexes(&conn)?;

        let status = match summary.termination {
            TerminationReason::Interrupted => "interrupted",
            _ => "completed",
        };
        schema::set_crawl_info(&conn, keys::STATUS, status)?;

        schema::optimize_for_reads(&conn)?;

        debug!(
            records = self.writer_handle.stats().records_written(),
            status = status,
            "Record log finalized"
        );
        Ok(())
    }

    /// Stop the writer thread without finalizing (status stays `running`)
    pub fn abandon(mut self) -> OutputResult<()> {
        self.join()
    }

    fn join(&mut self) -> OutputResult<()> {
        let _ = self.writer_handle.shutdown();

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(OutputError::WriterPanicked),
            }
        }
        Ok(())
    }
}

/// Start every run from an empty database, including stale WAL files
fn remove_existing(db_path: &Path) -> OutputResult<()> {
    if db_path.exists() {
        fs::remove_file(db_path)?;
    }
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        let sidecar = PathBuf::from(name);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
    }
    Ok(())
}

/// Internal writer thread function
fn writer_thread(
    conn: Connection,
    receiver: Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
    batch_size: usize,
) -> OutputResult<()> {
    let mut records: Vec<PlayerRecord> = Vec::with_capacity(batch_size);
    let mut refreshes: Vec<(String, u32)> = Vec::new();

    loop {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(WriterMessage::Record(record)) => {
                records.push(record);
                if records.len() >= batch_size {
                    flush_records(&conn, &mut records, &stats)?;
                }
            }
            Ok(WriterMessage::Refresh { tag, trophies }) => {
                refreshes.push((tag, trophies));
            }
            Ok(WriterMessage::Flush) => {
                flush_all(&conn, &mut records, &mut refreshes, &stats)?;
            }
            Ok(WriterMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                flush_all(&conn, &mut records, &mut refreshes, &stats)?;
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                // Idle: persist whatever is buffered
                flush_all(&conn, &mut records, &mut refreshes, &stats)?;
            }
        }
    }

    Ok(())
}

fn flush_all(
    conn: &Connection,
    records: &mut Vec<PlayerRecord>,
    refreshes: &mut Vec<(String, u32)>,
    stats: &WriterStats,
) -> OutputResult<()> {
    flush_records(conn, records, stats)?;
    // Refreshes always target rows inserted earlier, so they go second
    flush_refreshes(conn, refreshes, stats)
}

/// Flush record buffer to database
fn flush_records(
    conn: &Connection,
    buffer: &mut Vec<PlayerRecord>,
    stats: &WriterStats,
) -> OutputResult<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO players (tag, trophies, name, depth, source, discovered_at, game_mode, match_timestamp, arena_hint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for record in buffer.drain(..) {
            stmt.execute(params![
                record.tag,
                record.trophies as i64,
                record.name,
                record.depth as i64,
                record.source,
                record.discovered_at.to_rfc3339(),
                record.game_mode,
                record.match_timestamp,
                record.arena_hint.map(|a| a as i64),
            ])?;
            stats.records_written.fetch_add(1, Ordering::Relaxed);
        }
    }
    tx.commit()?;
    stats.batches_committed.fetch_add(1, Ordering::Relaxed);

    Ok(())
}

/// Flush trophy refreshes to database
fn flush_refreshes(
    conn: &Connection,
    buffer: &mut Vec<(String, u32)>,
    stats: &WriterStats,
) -> OutputResult<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt =
            tx.prepare_cached("UPDATE players SET latest_trophies = ?1 WHERE tag = ?2")?;
        for (tag, trophies) in buffer.drain(..) {
            let updated = stmt.execute(params![trophies as i64, tag])?;
            stats
                .refreshes_written
                .fetch_add(updated as u64, Ordering::Relaxed);
        }
    }
    tx.commit()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{Stratum, StratumProgress, Strategy};
    use tempfile::tempdir;

    fn summary(termination: TerminationReason) -> RunSummary {
        RunSummary {
            quota_target: 10,
            strategy: Strategy::ArenaBased,
            achieved: 3,
            max_depth_reached: 1,
            levels_expanded: 1,
            elapsed: Duration::from_millis(1500),
            failed_fetches: 0,
            tasks_processed: 1,
            seeds_admitted: 1,
            termination,
            strata: vec![StratumProgress {
                stratum: Stratum::Arena(2),
                accepted: 3,
                capacity: 10,
            }],
        }
    }

    fn records() -> Vec<PlayerRecord> {
        let seed = PlayerRecord::seed("#S", 100, "seed").with_arena_hint(Some(2));
        let mut out = vec![seed.clone()];
        for i in 0..2 {
            let mut child = seed.clone();
            child.arena_hint = None;
            child.tag = format!("#C{}", i);
            child.depth = 1;
            child.source = "#S".into();
            out.push(child);
        }
        out
    }

    #[test]
    fn test_writer_basic() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("crawl.db");

        let writer = BatchedWriter::new(&db_path, 2, 16).unwrap();
        let handle = writer.handle();
        for record in records() {
            handle.send_record(record).unwrap();
        }
        handle.send_refresh("#S".into(), 180).unwrap();
        drop(handle);

        writer
            .finish("seeds.json", &summary(TerminationReason::QuotaMet))
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);

        let latest: Option<i64> = conn
            .query_row(
                "SELECT latest_trophies FROM players WHERE tag = '#S'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(latest, Some(180));

        let hints: Vec<Option<i64>> = conn
            .prepare("SELECT arena_hint FROM players ORDER BY tag")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(hints, vec![None, None, Some(2)]);

        let status = schema::get_crawl_info(&conn, keys::STATUS).unwrap();
        assert_eq!(status.as_deref(), Some("completed"));
        let termination = schema::get_crawl_info(&conn, keys::TERMINATION).unwrap();
        assert_eq!(termination.as_deref(), Some("quota_met"));
    }

    #[test]
    fn test_interrupted_status() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("crawl.db");

        let writer = BatchedWriter::new(&db_path, 100, 16).unwrap();
        writer
            .finish("seeds.json", &summary(TerminationReason::Interrupted))
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let status = schema::get_crawl_info(&conn, keys::STATUS).unwrap();
        assert_eq!(status.as_deref(), Some("interrupted"));
    }

    #[test]
    fn test_writer_stats_after_flush() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("crawl.db");

        let writer = BatchedWriter::new(&db_path, 100, 16).unwrap();
        let handle = writer.handle();
        for record in records() {
            handle.send_record(record).unwrap();
        }
        handle.flush().unwrap();

        writer.abandon().unwrap();
        assert_eq!(handle.stats().records_written(), 3);

        let conn = Connection::open(&db_path).unwrap();
        let status = schema::get_crawl_info(&conn, keys::STATUS).unwrap();
        assert_eq!(status.as_deref(), Some("running"));
    }

    #[test]
    fn test_existing_database_replaced() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("crawl.db");
        let wal_path = dir.path().join("crawl.db-wal");

        let writer = BatchedWriter::new(&db_path, 100, 16).unwrap();
        let handle = writer.handle();
        for record in records() {
            handle.send_record(record).unwrap();
        }
        drop(handle);
        writer
            .finish("seeds.json", &summary(TerminationReason::QuotaMet))
            .unwrap();
        fs::write(&wal_path, b"stale").unwrap();

        let writer = BatchedWriter::new(&db_path, 100, 16).unwrap();
        let handle = writer.handle();
        handle
            .send_record(PlayerRecord::seed("#NEW", 100, "new"))
            .unwrap();
        drop(handle);
        writer
            .finish("seeds.json", &summary(TerminationReason::QuotaMet))
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let tags: Vec<String> = conn
            .prepare("SELECT tag FROM players")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tags, vec!["#NEW".to_string()]);
    }
}
