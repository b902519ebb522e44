//! HTTP player source
//!
//! One `GET {base_url}/profile/{tag}` per player, with the `#` stripped from
//! the tag. The response is decoded into a private wire shape and reduced to
//! a [`PlayerProfile`]:
//!
//! ```text
//! { "success": true,
//!   "profile": { "maxscore": 5210 },
//!   "matches": [ { "game_config": { "name": "Ladder" },
//!                  "timestamp": "...",
//!                  "players": [ { "hashtag": "...", "score": 5210, "name": "..." },
//!                               { "hashtag": "...", "score": 5188, "name": "..." } ] } ] }
//! ```

use super::{normalize_tag, MatchRecord, Participant, PlayerProfile, PlayerSource};
use crate::error::{FetchError, FetchResult, WorkerError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://stats-royale-api-js-beta-z2msk5bu3q-uk.a.run.app";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpSource`]
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("trophy-crawler/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Player source backed by the profile API
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    /// Build the HTTP client
    pub fn new(config: &HttpSourceConfig) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| WorkerError::InitFailed {
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn profile_url(&self, tag: &str) -> String {
        format!("{}/profile/{}", self.base_url, tag.trim_start_matches('#'))
    }
}

#[async_trait::async_trait]
impl PlayerSource for HttpSource {
    async fn fetch(&self, tag: &str) -> FetchResult<PlayerProfile> {
        let url = self.profile_url(tag);
        trace!(url = %url, "Fetching profile");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                tag: tag.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                tag: tag.to_string(),
                status: status.as_u16(),
            });
        }

        let body: ProfileResponse = response.json().await.map_err(|e| FetchError::Malformed {
            tag: tag.to_string(),
            reason: e.to_string(),
        })?;

        body.into_profile(tag)
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    profile: Option<ProfileBody>,
    #[serde(default)]
    matches: Vec<MatchBody>,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    #[serde(default)]
    maxscore: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct GameConfig {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchBody {
    #[serde(default)]
    game_config: GameConfig,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    players: Vec<PlayerBody>,
}

#[derive(Debug, Deserialize)]
struct PlayerBody {
    #[serde(default)]
    hashtag: String,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

impl PlayerBody {
    fn into_participant(self) -> Participant {
        Participant {
            tag: normalize_tag(&self.hashtag),
            trophies: clamp_trophies(self.score.unwrap_or(0)),
            name: self.name.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

impl ProfileResponse {
    fn into_profile(self, tag: &str) -> FetchResult<PlayerProfile> {
        if self.success != Some(true) {
            return Err(FetchError::Rejected {
                tag: tag.to_string(),
            });
        }

        // A zero max score means the profile did not report one
        let trophies = self
            .profile
            .and_then(|p| p.maxscore)
            .filter(|&t| t > 0)
            .map(clamp_trophies);

        let matches = self
            .matches
            .into_iter()
            .filter_map(|m| {
                let mode = m.game_config.name.unwrap_or_default();
                let timestamp = m.timestamp.and_then(timestamp_string);
                let mut players = m.players.into_iter();
                let a = players.next()?.into_participant();
                let b = players.next()?.into_participant();
                Some(MatchRecord {
                    mode,
                    timestamp,
                    participants: [a, b],
                })
            })
            .collect();

        Ok(PlayerProfile { trophies, matches })
    }
}

/// Negative scores count as zero
fn clamp_trophies(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn timestamp_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> ProfileResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decode_profile() {
        let body = decode(
            r##"{
                "success": true,
                "profile": { "maxscore": 5210 },
                "matches": [
                    { "game_config": { "name": "Ladder" },
                      "timestamp": "20240101T120000.000Z",
                      "players": [
                          { "hashtag": "ME", "score": 5210, "name": "me" },
                          { "hashtag": "#op1", "score": 5188, "name": "op" }
                      ] },
                    { "game_config": { "name": "Ladder" },
                      "players": [ { "hashtag": "ME", "score": 5210 } ] },
                    { "game_config": { "name": "2v2" }, "timestamp": 1700000000,
                      "players": [ { "hashtag": "ME" }, { "hashtag": "X" } ] }
                ]
            }"##,
        );

        let profile = body.into_profile("#ME").unwrap();
        assert_eq!(profile.trophies, Some(5210));
        assert_eq!(profile.matches.len(), 2);

        let first = &profile.matches[0];
        assert_eq!(first.mode, "Ladder");
        assert_eq!(first.participants[1].tag, "#OP1");
        assert_eq!(first.participants[1].trophies, 5188);
        assert_eq!(profile.matches[1].timestamp.as_deref(), Some("1700000000"));
        assert_eq!(profile.matches[1].participants[1].name, "Unknown");
    }

    #[test]
    fn test_unsuccessful_body_is_rejected() {
        let err = decode(r#"{ "success": false }"#).into_profile("#A").unwrap_err();
        assert_eq!(err, FetchError::Rejected { tag: "#A".into() });

        let err = decode(r#"{ "matches": [] }"#).into_profile("#A").unwrap_err();
        assert!(matches!(err, FetchError::Rejected { .. }));
    }

    #[test]
    fn test_zero_maxscore_is_unknown() {
        let profile = decode(r#"{ "success": true, "profile": { "maxscore": 0 } }"#)
            .into_profile("#A")
            .unwrap();
        assert_eq!(profile.trophies, None);
        assert!(profile.matches.is_empty());
    }

    #[test]
    fn test_negative_scores_clamp_to_zero() {
        let profile = decode(
            r##"{ "success": true,
                 "profile": { "maxscore": -5 },
                 "matches": [
                   { "game_config": { "name": "Ladder" },
                     "players": [ { "hashtag": "ME", "score": -12 },
                                  { "hashtag": "#op1", "score": 4100 } ] } ] }"##,
        )
        .into_profile("#ME")
        .unwrap();

        assert_eq!(profile.trophies, None);
        assert_eq!(profile.matches.len(), 1);
        assert_eq!(profile.matches[0].participants[0].trophies, 0);
        assert_eq!(profile.matches[0].participants[1].trophies, 4100);
    }

    #[test]
    fn test_profile_url_strips_hash() {
        let source = HttpSource::new(&HttpSourceConfig {
            base_url: "http://localhost:9000/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(source.profile_url("#ABC"), "http://localhost:9000/profile/ABC");
    }
}
