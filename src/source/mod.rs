//! Player data sources
//!
//! The crawler only depends on the extracted shape of a player's data: an
//! optional current trophy count and a list of two-participant matches.
//! Anything that can produce a [`PlayerProfile`] for a tag implements
//! [`PlayerSource`].

pub mod http;
mod memory;

pub use http::{HttpSource, HttpSourceConfig};
pub use memory::StaticSource;

use crate::crawler::record::LADDER_MODE;
use crate::error::FetchResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Trait for player data sources
#[async_trait::async_trait]
pub trait PlayerSource: Send + Sync {
    /// Fetch the current profile and recent matches of a player
    async fn fetch(&self, tag: &str) -> FetchResult<PlayerProfile>;
}

/// One side of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub tag: String,
    pub trophies: u32,
    pub name: String,
}

impl Participant {
    pub fn new(tag: impl Into<String>, trophies: u32, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            trophies,
            name: name.into(),
        }
    }
}

/// A recorded two-player match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Game mode name ("Ladder", ...)
    pub mode: String,

    /// Opaque match timestamp
    pub timestamp: Option<String>,

    pub participants: [Participant; 2],
}

impl MatchRecord {
    pub fn ladder(a: Participant, b: Participant) -> Self {
        Self {
            mode: LADDER_MODE.to_string(),
            timestamp: None,
            participants: [a, b],
        }
    }

    /// The participant that is not `tag`, if `tag` played in this match
    pub fn opponent_of(&self, tag: &str) -> Option<&Participant> {
        let [a, b] = &self.participants;
        if same_tag(&a.tag, tag) {
            Some(b)
        } else if same_tag(&b.tag, tag) {
            Some(a)
        } else {
            None
        }
    }
}

/// Compare player tags ignoring a leading `#` and ASCII case
pub fn same_tag(a: &str, b: &str) -> bool {
    a.trim_start_matches('#')
        .eq_ignore_ascii_case(b.trim_start_matches('#'))
}

/// Canonical `#UPPERCASE` form of a player tag
pub fn normalize_tag(tag: &str) -> String {
    let bare = tag.trim().trim_start_matches('#');
    if bare.is_empty() {
        String::new()
    } else {
        format!("#{}", bare.to_ascii_uppercase())
    }
}

/// Data returned by a source for one player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Current trophy count, when the source reports one
    pub trophies: Option<u32>,

    pub matches: Vec<MatchRecord>,
}

/// A player eligible for sampling, extracted from a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub tag: String,
    pub trophies: u32,
    pub name: String,
    pub mode: String,
    pub match_timestamp: Option<String>,
}

/// Opponents of `self_tag` across all ladder matches
///
/// Matches in other modes are ignored, as are matches `self_tag` did not
/// take part in and opponents with an empty tag. An opponent met several
/// times is returned once, from the first match listed.
pub fn ladder_candidates(profile: &PlayerProfile, self_tag: &str) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    profile
        .matches
        .iter()
        .filter(|m| m.mode == LADDER_MODE)
        .filter_map(|m| m.opponent_of(self_tag).map(|p| (m, p)))
        .filter(|(_, p)| !p.tag.is_empty() && !same_tag(&p.tag, self_tag))
        .filter(|(_, p)| seen.insert(p.tag.clone()))
        .map(|(m, p)| Candidate {
            tag: p.tag.clone(),
            trophies: p.trophies,
            name: p.name.clone(),
            mode: m.mode.clone(),
            match_timestamp: m.timestamp.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(tag: &str, trophies: u32) -> Participant {
        Participant::new(tag, trophies, tag.trim_start_matches('#'))
    }

    #[test]
    fn test_ladder_candidates_filters_and_dedupes() {
        let mut friendly = MatchRecord::ladder(p("#ME", 1000), p("#F", 1100));
        friendly.mode = "Friendly".into();

        let profile = PlayerProfile {
            trophies: Some(1000),
            matches: vec![
                MatchRecord::ladder(p("#ME", 1000), p("#A", 1010)),
                MatchRecord::ladder(p("#B", 990), p("#ME", 1000)),
                friendly,
                MatchRecord::ladder(p("#ME", 1000), p("#A", 1020)),
                MatchRecord::ladder(p("#ME", 1000), p("", 0)),
                MatchRecord::ladder(p("#X", 5), p("#Y", 6)),
            ],
        };

        let tags: Vec<_> = ladder_candidates(&profile, "#ME")
            .into_iter()
            .map(|c| (c.tag, c.trophies))
            .collect();
        assert_eq!(tags, vec![("#A".to_string(), 1010), ("#B".to_string(), 990)]);
    }

    #[test]
    fn test_tag_matching_ignores_hash_prefix() {
        assert!(same_tag("#abc123", "ABC123"));
        assert!(!same_tag("#ABC", "#ABD"));
        assert_eq!(normalize_tag(" abc12 "), "#ABC12");
        assert_eq!(normalize_tag("#"), "");

        let m = MatchRecord::ladder(p("ME", 1000), p("#OP", 900));
        assert_eq!(m.opponent_of("#ME").map(|o| o.tag.as_str()), Some("#OP"));
    }

    #[test]
    fn test_no_matches_no_candidates() {
        assert!(ladder_candidates(&PlayerProfile::default(), "#ME").is_empty());
    }
}
