//! Non-personalized lists: popularity, trending and new releases.
//!
//! This is the terminal fallback of every personalized strategy. It only
//! comes back empty when the catalog has no active tracks.

use crate::models::{RecommendationItem, Recommendations, Track, TrackId};
use crate::store::{InteractionStore, TrackCatalog};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub const POPULARITY_ALGORITHM: &str = "Popularity-based";
pub const TRENDING_ALGORITHM: &str = "Trending (Recent Play Volume)";
pub const NEW_RELEASES_ALGORITHM: &str = "Recency-based";
/// Tag used when even the fallback could not be computed.
pub const FALLBACK_ALGORITHM: &str = "FALLBACK";

const TRENDING_CONFIDENCE: f64 = 0.6;
const NEW_RELEASE_CONFIDENCE: f64 = 0.5;

/// Fixed score, confidence and reason stamped on every fallback item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placeholder {
    pub score: f64,
    pub confidence: f64,
    pub reason: &'static str,
}

impl Placeholder {
    /// Used when a content-based request has no usable profile.
    pub const CONTENT: Self = Self {
        score: 0.5,
        confidence: 0.3,
        reason: "popular track",
    };

    /// Used when a collaborative request finds no similar listeners.
    pub const COLLABORATIVE: Self = Self {
        score: 0.4,
        confidence: 0.2,
        reason: "trending track",
    };

    fn item(self, track: &Track) -> RecommendationItem {
        RecommendationItem::scored(
            track,
            self.score,
            self.confidence / self.score,
            self.reason,
            track.tags(),
        )
    }
}

#[derive(Clone)]
pub struct FallbackProvider {
    catalog: Arc<dyn TrackCatalog>,
    interactions: Arc<dyn InteractionStore>,
}

impl FallbackProvider {
    #[must_use]
    pub fn new(catalog: Arc<dyn TrackCatalog>, interactions: Arc<dyn InteractionStore>) -> Self {
        Self {
            catalog,
            interactions,
        }
    }

    /// Top `limit` active tracks by all-time play count, each carrying the
    /// caller's placeholder score.
    pub fn popular(&self, limit: usize, placeholder: Placeholder) -> Result<Recommendations> {
        let tracks = self.catalog.top_tracks_by_play_count(limit)?;
        debug!("Popularity fallback produced {} tracks", tracks.len());

        let items = tracks.iter().map(|track| placeholder.item(track)).collect();
        Ok(Recommendations::fallback(items, POPULARITY_ALGORITHM))
    }

    /// Active tracks ranked by plays inside the trailing window. Tracks not
    /// played in the window follow, ordered by all-time play count.
    pub fn trending(&self, limit: usize, window_days: u32, now: DateTime<Utc>) -> Result<Recommendations> {
        let since = now - Duration::days(i64::from(window_days));
        let recent = self.interactions.recent_play_counts(since)?;
        let tracks = self.catalog.active_tracks()?;

        let ranked = rank_by_recent_plays(tracks, &recent);
        let peak = ranked
            .first()
            .and_then(|track| recent.get(&track.id))
            .copied()
            .unwrap_or(0);

        #[allow(clippy::cast_precision_loss)]
        let items = ranked
            .iter()
            .take(limit)
            .map(|track| {
                let plays = recent.get(&track.id).copied().unwrap_or(0);
                let score = if peak == 0 { 0.0 } else { plays as f64 / peak as f64 };
                RecommendationItem::scored(
                    track,
                    score,
                    TRENDING_CONFIDENCE,
                    "trending this week",
                    track.tags(),
                )
            })
            .collect::<Vec<_>>();

        debug!(
            "Trending over {window_days} days: {} tracks with recent plays, returning {}",
            recent.len(),
            items.len()
        );
        Ok(Recommendations::new(items, TRENDING_ALGORITHM))
    }

    /// Active tracks created inside the window, newest first. Score decays
    /// linearly from 1 (created now) to 0 (created at the window edge).
    pub fn new_releases(
        &self,
        limit: usize,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Recommendations> {
        let window = Duration::days(i64::from(window_days));
        let tracks = self.catalog.tracks_created_since(now - window, limit)?;

        #[allow(clippy::cast_precision_loss)]
        let window_secs = window.num_seconds().max(1) as f64;

        #[allow(clippy::cast_precision_loss)]
        let items = tracks
            .iter()
            .map(|track| {
                let age = (now - track.created_at).num_seconds().max(0) as f64;
                let score = (1.0 - age / window_secs).clamp(0.0, 1.0);
                RecommendationItem::scored(track, score, NEW_RELEASE_CONFIDENCE, "new release", track.tags())
            })
            .collect();

        Ok(Recommendations::new(items, NEW_RELEASES_ALGORITHM))
    }
}

fn rank_by_recent_plays(mut tracks: Vec<Track>, recent: &HashMap<TrackId, u64>) -> Vec<Track> {
    tracks.sort_by(|a, b| {
        let plays_a = recent.get(&a.id).copied().unwrap_or(0);
        let plays_b = recent.get(&b.id).copied().unwrap_or(0);
        plays_b
            .cmp(&plays_a)
            .then_with(|| b.play_count.cmp(&a.play_count))
            .then_with(|| a.id.cmp(&b.id))
    });
    tracks
}
