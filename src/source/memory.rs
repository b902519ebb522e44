//! In-memory player source
//!
//! Serves profiles from a fixed map. Used for offline replays, tests and
//! benchmarks. Unknown tags fail the same way an HTTP 404 would.

use super::{MatchRecord, Participant, PlayerProfile, PlayerSource};
use crate::error::{FetchError, FetchResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source backed by a tag -> profile map
#[derive(Debug, Default)]
pub struct StaticSource {
    profiles: HashMap<String, PlayerProfile>,
    failing: HashSet<String>,
    fetches: AtomicU64,
    fetched: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile for `tag`
    pub fn with_profile(mut self, tag: impl Into<String>, profile: PlayerProfile) -> Self {
        self.profiles.insert(tag.into(), profile);
        self
    }

    /// Register ladder matches between `tag` and each opponent
    pub fn with_ladder(
        mut self,
        tag: &str,
        trophies: u32,
        opponents: impl IntoIterator<Item = Participant>,
    ) -> Self {
        let me = Participant::new(tag, trophies, tag.trim_start_matches('#'));
        let matches = opponents
            .into_iter()
            .map(|op| MatchRecord::ladder(me.clone(), op))
            .collect();
        self.profiles.insert(
            tag.to_string(),
            PlayerProfile {
                trophies: Some(trophies),
                matches,
            },
        );
        self
    }

    /// Make fetches of `tag` fail with a network error
    pub fn with_failure(mut self, tag: impl Into<String>) -> Self {
        self.failing.insert(tag.into());
        self
    }

    /// Number of fetch calls served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Tags fetched so far, in call order
    pub fn fetched_tags(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait::async_trait]
impl PlayerSource for StaticSource {
    async fn fetch(&self, tag: &str) -> FetchResult<PlayerProfile> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.fetched.lock().push(tag.to_string());

        if self.failing.contains(tag) {
            return Err(FetchError::Network {
                tag: tag.to_string(),
                reason: "connection reset".into(),
            });
        }

        self.profiles
            .get(tag)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                tag: tag.to_string(),
                status: 404,
            })
    }
}
