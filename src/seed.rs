//! Seed list loading
//!
//! Seeds come from a JSON array of player objects:
//!
//! ```json
//! [ { "tag": "#2PP", "trophies": 1450, "name": "Someone", "arena": 6 }, ... ]
//! ```
//!
//! `tag` and `trophies` are required; entries missing either are skipped
//! with a warning. An unreadable file, a document that is not an array, or a
//! list with no valid entry is fatal.

use crate::error::{SeedError, SeedRecordError};
use crate::source::normalize_tag;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Name used when a seed has none
pub const UNKNOWN_NAME: &str = "Unknown";

/// One validated seed player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub tag: String,
    pub trophies: u32,
    pub name: String,

    /// Stratum hint carried by the seed file (`arena` or `target_arena`)
    pub arena_hint: Option<u32>,
}

impl SeedEntry {
    pub fn new(tag: impl Into<String>, trophies: u32) -> Self {
        Self {
            tag: tag.into(),
            trophies,
            name: UNKNOWN_NAME.to_string(),
            arena_hint: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Validated seeds plus what was rejected
#[derive(Debug, Clone, Default)]
pub struct SeedSet {
    /// Where the seeds came from (file path or label)
    pub origin: String,

    pub entries: Vec<SeedEntry>,

    pub rejected: Vec<SeedRecordError>,
}

impl SeedSet {
    /// Seed set built in code
    pub fn from_entries(origin: impl Into<String>, entries: Vec<SeedEntry>) -> Self {
        Self {
            origin: origin.into(),
            entries,
            rejected: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load and validate seeds from a JSON file
pub fn load_seeds(path: &Path) -> Result<SeedSet, SeedError> {
    let text = fs::read_to_string(path).map_err(|e| SeedError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let document: Value = serde_json::from_str(&text).map_err(|e| SeedError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let items = match document {
        Value::Array(items) => items,
        other => {
            return Err(SeedError::Malformed {
                path: path.to_path_buf(),
                reason: format!("expected a JSON array, found {}", json_kind(&other)),
            })
        }
    };

    let set = parse_seeds(path.display().to_string(), &items);
    info!(
        path = %path.display(),
        loaded = set.entries.len(),
        rejected = set.rejected.len(),
        "Loaded seed players"
    );

    if set.is_empty() {
        return Err(SeedError::Empty {
            source_name: set.origin,
        });
    }
    Ok(set)
}

/// Validate seed objects, keeping the good ones in order
pub fn parse_seeds(origin: impl Into<String>, items: &[Value]) -> SeedSet {
    let mut set = SeedSet {
        origin: origin.into(),
        ..Default::default()
    };

    for (index, item) in items.iter().enumerate() {
        match parse_entry(index, item) {
            Ok(entry) => set.entries.push(entry),
            Err(e) => {
                warn!(error = %e, "Skipping invalid seed entry");
                set.rejected.push(e);
            }
        }
    }

    set
}

fn parse_entry(index: usize, item: &Value) -> Result<SeedEntry, SeedRecordError> {
    let obj = item
        .as_object()
        .ok_or(SeedRecordError::NotAnObject { index })?;

    let tag = obj
        .get("tag")
        .and_then(Value::as_str)
        .map(normalize_tag)
        .filter(|t| !t.is_empty())
        .ok_or(SeedRecordError::MissingTag { index })?;

    let trophies = obj
        .get("trophies")
        .and_then(as_count)
        .ok_or_else(|| SeedRecordError::MissingTrophies {
            index,
            tag: tag.clone(),
        })?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_NAME)
        .to_string();

    Ok(SeedEntry {
        tag,
        trophies,
        name,
        arena_hint: arena_hint(obj),
    })
}

fn arena_hint(obj: &Map<String, Value>) -> Option<u32> {
    obj.get("arena")
        .and_then(as_count)
        .or_else(|| obj.get("target_arena").and_then(as_count))
}

/// Non-negative integer from a JSON number or numeric string
fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
