//! Error taxonomy for the recommendation engine.
//!
//! Only [`ValidationError`]s are meant to reach callers of
//! `get_recommendations`; storage failures are recovered inside the engine.
//! `record_interaction` is a write path and surfaces both kinds.

use crate::models::{Strategy, TrackId, UserId};
use thiserror::Error;

/// Malformed input, rejected before any computation happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("strategy {0} requires a seed_track_id")]
    MissingSeedTrack(Strategy),

    #[error("strategy GENRE_BASED requires at least one seed genre id")]
    MissingSeedGenres,

    #[error("strategy ARTIST_BASED requires at least one seed artist id")]
    MissingSeedArtists,

    #[error("strategy {0} requires a user_id")]
    MissingUser(Strategy),

    #[error("limit must be between 1 and 100, got {0}")]
    LimitOutOfRange(usize),

    #[error("diversity_factor must be within [0, 1], got {0}")]
    DiversityOutOfRange(f64),

    #[error("min_interaction_score must be a non-negative number, got {0}")]
    InvalidMinScore(f64),

    #[error("listen_time must be a non-negative number, got {0}")]
    InvalidListenTime(f64),

    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),

    #[error("unknown interaction type `{0}`")]
    UnknownInteractionType(String),

    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("track {0} does not exist")]
    UnknownTrack(TrackId),
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl RecommendError {
    /// Whether the caller sent something malformed (a client error).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
