//! SQLite schema for the crawl record log
//!
//! Three tables:
//! - `players`: one row per admitted player, inserted once
//! - `crawl_info`: key/value run metadata; `status` is the completion marker
//! - `stratum_progress`: final accepted/capacity per stratum

use crate::error::OutputResult;
use rusqlite::{params, Connection};

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// Admitted players. `latest_trophies` is the only column written after insert.
const CREATE_PLAYERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY,
    tag TEXT NOT NULL UNIQUE,
    trophies INTEGER NOT NULL,    -- At admission; drives quota accounting
    name TEXT NOT NULL,
    depth INTEGER NOT NULL,
    source TEXT NOT NULL,         -- Parent tag or 'initial_dataset'
    discovered_at TEXT NOT NULL,  -- RFC 3339, UTC
    game_mode TEXT,
    match_timestamp TEXT,
    arena_hint INTEGER,           -- Seeds only, from the seed file
    latest_trophies INTEGER       -- Most recent count seen while expanding
)
"#;

/// SQL to create crawl metadata table
const CREATE_CRAWL_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS crawl_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// SQL to create per-stratum quota table
const CREATE_STRATUM_PROGRESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stratum_progress (
    stratum TEXT PRIMARY KEY,
    ordinal INTEGER NOT NULL,
    accepted INTEGER NOT NULL,
    capacity INTEGER NOT NULL
)
"#;

/// SQL to create indexes for common queries
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_players_depth ON players(depth)",
    "CREATE INDEX IF NOT EXISTS idx_players_source ON players(source)",
    "CREATE INDEX IF NOT EXISTS idx_players_trophies ON players(trophies)",
];

/// Crawls are network-bound, so durability wins over raw insert speed
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -16000;      -- 16MB cache
PRAGMA temp_store = MEMORY;
"#;

/// Applied after the crawl completes
const READ_PRAGMAS: &str = r#"
PRAGMA synchronous = FULL;
"#;

/// Create and configure a new database for writing
pub fn create_database(conn: &Connection) -> OutputResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_PLAYERS_TABLE, [])?;
    conn.execute(CREATE_CRAWL_INFO_TABLE, [])?;
    conn.execute(CREATE_STRATUM_PROGRESS_TABLE, [])?;

    Ok(())
}

/// Create indexes (called after the crawl for better insert performance)
pub fn create_indexes(conn: &Connection) -> OutputResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Apply read-optimized settings
pub fn optimize_for_reads(conn: &Connection) -> OutputResult<()> {
    conn.execute_batch(READ_PRAGMAS)?;
    conn.execute("ANALYZE", [])?;
    Ok(())
}

/// Store crawl metadata
pub fn set_crawl_info(conn: &Connection, key: &str, value: &str) -> OutputResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO crawl_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get crawl metadata
pub fn get_crawl_info(conn: &Connection, key: &str) -> OutputResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM crawl_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace the stratum progress table contents
pub fn set_stratum_progress(
    conn: &Connection,
    rows: &[(String, u64, u64)],
) -> OutputResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM stratum_progress", [])?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO stratum_progress (stratum, ordinal, accepted, capacity) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (ordinal, (stratum, accepted, capacity)) in rows.iter().enumerate() {
            stmt.execute(params![
                stratum,
                ordinal as i64,
                *accepted as i64,
                *capacity as i64
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Metadata keys used by the crawler
pub mod keys {
    /// Seed file the crawl started from
    pub const SEED_SOURCE: &str = "seed_source";

    /// Timestamp when the crawl started (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the crawl completed (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Total duration in seconds
    pub const DURATION_SECS: &str = "duration_secs";

    /// Stratification strategy
    pub const STRATEGY: &str = "strategy";

    /// Global quota
    pub const TOTAL_QUOTA: &str = "total_quota";

    /// Players accepted
    pub const QUOTA_ACHIEVED: &str = "quota_achieved";

    /// Levels expanded
    pub const LEVELS_EXPANDED: &str = "levels_expanded";

    /// Deepest record depth
    pub const MAX_DEPTH_REACHED: &str = "max_depth_reached";

    /// Tasks finished
    pub const TASKS_PROCESSED: &str = "tasks_processed";

    /// Tasks whose fetch failed
    pub const FAILED_FETCHES: &str = "failed_fetches";

    /// Why the crawl stopped
    pub const TERMINATION: &str = "termination";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Crawler version
    pub const CRAWLER_VERSION: &str = "crawler_version";

    /// Crawl status: "running", "completed", "interrupted"
    pub const STATUS: &str = "status";
}
