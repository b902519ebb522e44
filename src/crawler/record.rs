//! Player records produced by the crawl
//!
//! A [`PlayerRecord`] is created exactly once, at admission, and never
//! modified afterwards. Seeds and discoveries share the type; seeds carry
//! [`SEED_SOURCE`] as their source.

use crate::source::Candidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source marker for records that came from the seed list
pub const SEED_SOURCE: &str = "initial_dataset";

/// Game mode whose matches are followed during expansion
pub const LADDER_MODE: &str = "Ladder";

/// An admitted player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Unique player identifier
    pub tag: String,

    /// Trophy count at admission time (drives quota accounting)
    pub trophies: u32,

    /// Display name
    pub name: String,

    /// BFS depth (0 for seeds)
    pub depth: u32,

    /// Tag of the expanding parent, or [`SEED_SOURCE`]
    pub source: String,

    /// When the record was admitted
    pub discovered_at: DateTime<Utc>,

    /// Mode of the match the player was discovered through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_mode: Option<String>,

    /// Timestamp of that match, as reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_timestamp: Option<String>,

    /// Arena the seed file listed the player under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arena_hint: Option<u32>,
}

impl PlayerRecord {
    /// Depth-0 record for a seed player
    pub fn seed(tag: impl Into<String>, trophies: u32, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            trophies,
            name: name.into(),
            depth: 0,
            source: SEED_SOURCE.to_string(),
            discovered_at: Utc::now(),
            game_mode: None,
            match_timestamp: None,
            arena_hint: None,
        }
    }

    /// Attach the arena hint carried by a seed entry
    pub fn with_arena_hint(mut self, arena_hint: Option<u32>) -> Self {
        self.arena_hint = arena_hint;
        self
    }

    /// Child record for a candidate discovered while expanding `self`
    pub fn child(&self, candidate: Candidate) -> Self {
        Self {
            tag: candidate.tag,
            trophies: candidate.trophies,
            name: candidate.name,
            depth: self.depth + 1,
            source: self.tag.clone(),
            discovered_at: Utc::now(),
            game_mode: Some(candidate.mode),
            match_timestamp: candidate.match_timestamp,
            arena_hint: None,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.source == SEED_SOURCE
    }
}
