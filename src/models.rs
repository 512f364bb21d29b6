//! Value types shared by every recommender.
//!
//! Tracks and interactions are what the storage layer hands us; requests,
//! items and responses are what the engine hands back. None of these carry
//! cached model state: they are rebuilt from storage on every request.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub type TrackId = i64;
pub type UserId = i64;
pub type ArtistId = i64;
pub type GenreId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

/// A catalog track together with its resolved genre and artist associations.
///
/// `artists` is ordered; the first entry is the primary artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artists: Vec<Artist>,
    pub genres: Vec<Genre>,
    /// Length in seconds, if known.
    pub duration_secs: Option<u32>,
    /// All-time play count across every listener.
    pub play_count: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Track {
    #[must_use]
    pub fn primary_artist(&self) -> Option<&Artist> {
        self.artists.first()
    }

    pub fn genre_names(&self) -> impl Iterator<Item = &str> {
        self.genres.iter().map(|genre| genre.name.as_str())
    }

    /// Length bucket, or `None` when the duration is unknown or zero.
    #[must_use]
    pub fn duration_bucket(&self) -> Option<DurationBucket> {
        self.duration_secs
            .filter(|&secs| secs > 0)
            .map(DurationBucket::from_secs)
    }

    /// Genre names followed by the primary artist name.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.genre_names()
            .map(str::to_string)
            .chain(self.primary_artist().map(|artist| artist.name.clone()))
            .collect()
    }
}

/// Coarse track length used as a content feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationBucket {
    Short,
    Medium,
    Long,
}

impl DurationBucket {
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        match secs {
            s if s < 120 => Self::Short,
            s if s < 300 => Self::Medium,
            _ => Self::Long,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// Behavioral counters for one (user, track) pair.
///
/// The affinity score is derived state: it is only ever written by
/// [`crate::scoring::rescore`], never by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub track_id: TrackId,
    pub play_count: u32,
    /// Cumulative listening time in seconds.
    pub total_listen_time: f64,
    pub skip_count: u32,
    pub is_liked: bool,
    pub is_shared: bool,
    pub(crate) interaction_score: f64,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl Interaction {
    /// A zeroed record for a pair that has no history yet.
    #[must_use]
    pub fn new(user_id: UserId, track_id: TrackId) -> Self {
        Self {
            user_id,
            track_id,
            play_count: 0,
            total_listen_time: 0.0,
            skip_count: 0,
            is_liked: false,
            is_shared: false,
            interaction_score: 0.0,
            last_interaction_at: None,
        }
    }

    #[must_use]
    pub fn interaction_score(&self) -> f64 {
        self.interaction_score
    }
}

/// A single behavioral event reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Play,
    Skip,
    Like,
    Unlike,
    Share,
}

impl FromStr for InteractionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "skip" => Ok(Self::Skip),
            "like" => Ok(Self::Like),
            "unlike" => Ok(Self::Unlike),
            "share" => Ok(Self::Share),
            _ => Err(ValidationError::UnknownInteractionType(s.to_string())),
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Play => "play",
            Self::Skip => "skip",
            Self::Like => "like",
            Self::Unlike => "unlike",
            Self::Share => "share",
        };
        f.write_str(name)
    }
}

/// Recommendation strategy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    ContentBased,
    Collaborative,
    Hybrid,
    SimilarTracks,
    GenreBased,
    ArtistBased,
    Trending,
    NewReleases,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Self::ContentBased,
        Self::Collaborative,
        Self::Hybrid,
        Self::SimilarTracks,
        Self::GenreBased,
        Self::ArtistBased,
        Self::Trending,
        Self::NewReleases,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentBased => "CONTENT_BASED",
            Self::Collaborative => "COLLABORATIVE",
            Self::Hybrid => "HYBRID",
            Self::SimilarTracks => "SIMILAR_TRACKS",
            Self::GenreBased => "GENRE_BASED",
            Self::ArtistBased => "ARTIST_BASED",
            Self::Trending => "TRENDING",
            Self::NewReleases => "NEW_RELEASES",
        }
    }

    /// Strategies that build a taste profile from the requesting user.
    #[must_use]
    pub const fn is_personalized(self) -> bool {
        matches!(self, Self::ContentBased | Self::Collaborative | Self::Hybrid)
    }
}

impl FromStr for Strategy {
    type Err = ValidationError;

    /// Accepts `HYBRID`, `hybrid`, `content-based` and `content_based` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`crate::engine::RecommendationEngine::get_recommendations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub user_id: Option<UserId>,
    pub strategy: Strategy,
    pub limit: usize,
    pub min_interaction_score: f64,
    pub include_known_tracks: bool,
    pub diversity_factor: f64,
    pub seed_track_id: Option<TrackId>,
    pub seed_artist_ids: Vec<ArtistId>,
    pub seed_genre_ids: Vec<GenreId>,
}

impl Default for RecommendationRequest {
    fn default() -> Self {
        Self {
            user_id: None,
            strategy: Strategy::Hybrid,
            limit: 10,
            min_interaction_score: 2.0,
            include_known_tracks: false,
            diversity_factor: 0.3,
            seed_track_id: None,
            seed_artist_ids: Vec::new(),
            seed_genre_ids: Vec::new(),
        }
    }
}

impl RecommendationRequest {
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_user(user_id: UserId, strategy: Strategy) -> Self {
        Self {
            user_id: Some(user_id),
            strategy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// The slice of a track that is returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: TrackId,
    pub title: String,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub duration_secs: Option<u32>,
    pub play_count: u64,
}

impl TrackSummary {
    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            title: track.title.clone(),
            artists: track.artists.iter().map(|a| a.name.clone()).collect(),
            genres: track.genre_names().map(str::to_string).collect(),
            duration_secs: track.duration_secs,
            play_count: track.play_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub track: TrackSummary,
    pub score: f64,
    pub confidence: f64,
    pub reason: String,
    pub tags: Vec<String>,
}

impl RecommendationItem {
    /// Builds an item whose confidence is `score * confidence_factor`,
    /// clamped into [0, 1].
    #[must_use]
    pub fn scored(
        track: &Track,
        score: f64,
        confidence_factor: f64,
        reason: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            track: TrackSummary::from(track),
            score,
            confidence: (score * confidence_factor).clamp(0.0, 1.0),
            reason: reason.into(),
            tags,
        }
    }
}

/// Stable sort by descending score; equal scores keep their input order.
pub(crate) fn sort_by_score_desc(items: &mut [RecommendationItem]) {
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// What a single strategy produced, before the response envelope is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendations {
    pub items: Vec<RecommendationItem>,
    pub algorithm: String,
    /// Set when the items came from the trending/popular provider rather
    /// than from the requested strategy.
    pub fallback: bool,
}

impl Recommendations {
    #[must_use]
    pub fn new(items: Vec<RecommendationItem>, algorithm: impl Into<String>) -> Self {
        Self {
            items,
            algorithm: algorithm.into(),
            fallback: false,
        }
    }

    #[must_use]
    pub fn fallback(items: Vec<RecommendationItem>, algorithm: impl Into<String>) -> Self {
        Self {
            items,
            algorithm: algorithm.into(),
            fallback: true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationItem>,
    pub strategy: Strategy,
    pub total_count: usize,
    pub average_confidence: f64,
    pub algorithm: String,
    pub fallback_used: bool,
}

impl RecommendationResponse {
    #[must_use]
    pub fn assemble(strategy: Strategy, recommendations: Recommendations) -> Self {
        let Recommendations {
            items,
            algorithm,
            fallback,
        } = recommendations;

        #[allow(clippy::cast_precision_loss)]
        let average_confidence = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|item| item.confidence).sum::<f64>() / items.len() as f64
        };

        Self {
            total_count: items.len(),
            recommendations: items,
            strategy,
            average_confidence,
            algorithm,
            fallback_used: fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration_secs: Option<u32>) -> Track {
        Track {
            id: 1,
            title: "Song".to_string(),
            artists: vec![
                Artist {
                    id: 1,
                    name: "First".to_string(),
                },
                Artist {
                    id: 2,
                    name: "Second".to_string(),
                },
            ],
            genres: vec![Genre {
                id: 1,
                name: "Rock".to_string(),
            }],
            duration_secs,
            play_count: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_duration_bucket_boundaries() {
        assert_eq!(DurationBucket::from_secs(0), DurationBucket::Short);
        assert_eq!(DurationBucket::from_secs(119), DurationBucket::Short);
        assert_eq!(DurationBucket::from_secs(120), DurationBucket::Medium);
        assert_eq!(DurationBucket::from_secs(299), DurationBucket::Medium);
        assert_eq!(DurationBucket::from_secs(300), DurationBucket::Long);
    }

    #[test]
    fn test_unknown_duration_has_no_bucket() {
        assert_eq!(track(None).duration_bucket(), None);
        assert_eq!(track(Some(0)).duration_bucket(), None);
        assert_eq!(track(Some(200)).duration_bucket(), Some(DurationBucket::Medium));
    }

    #[test]
    fn test_tags_use_genres_and_primary_artist_only() {
        assert_eq!(track(None).tags(), vec!["Rock".to_string(), "First".to_string()]);
    }

    #[test]
    fn test_strategy_parsing_is_lenient() {
        assert_eq!("hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert_eq!("content-based".parse::<Strategy>().unwrap(), Strategy::ContentBased);
        assert_eq!("NEW_RELEASES".parse::<Strategy>().unwrap(), Strategy::NewReleases);
        assert!(matches!(
            "mood".parse::<Strategy>(),
            Err(ValidationError::UnknownStrategy(name)) if name == "mood"
        ));
    }

    #[test]
    fn test_interaction_type_parsing() {
        assert_eq!("Play".parse::<InteractionType>().unwrap(), InteractionType::Play);
        assert!("rewind".parse::<InteractionType>().is_err());
    }

    #[test]
    fn test_response_average_confidence() {
        let t = track(Some(200));
        let items = vec![
            RecommendationItem::scored(&t, 1.0, 0.8, "a", vec![]),
            RecommendationItem::scored(&t, 0.5, 0.8, "b", vec![]),
        ];
        let response =
            RecommendationResponse::assemble(Strategy::ContentBased, Recommendations::new(items, "x"));
        assert_eq!(response.total_count, 2);
        assert!((response.average_confidence - 0.6).abs() < 1e-12);

        let empty = RecommendationResponse::assemble(
            Strategy::Trending,
            Recommendations::fallback(Vec::new(), "FALLBACK"),
        );
        assert_eq!(empty.average_confidence, 0.0);
        assert!(empty.fallback_used);
    }
}
