//! Content-based recommendations.
//!
//! Three modes share one ranking pass:
//! - taste mode ranks the catalog against the listener's aggregated profile,
//! - seed-track mode ranks it against a single track,
//! - seed-list mode ranks it against a synthetic genre or artist profile.

use crate::fallback::{FallbackProvider, Placeholder};
use crate::models::{RecommendationItem, Recommendations, Track, TrackId, UserId};
use crate::profile::{cosine_similarity, seed_profile, track_profile, user_profile, FeatureVector};
use crate::store::{InteractionStore, Stores, TrackCatalog};
use anyhow::Result;
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

pub const CONTENT_ALGORITHM: &str = "TF-IDF + Cosine Similarity";
pub const SIMILAR_TRACKS_ALGORITHM: &str = "Content Similarity";
pub const GENRE_ALGORITHM: &str = "Genre Similarity";
pub const ARTIST_ALGORITHM: &str = "Artist Similarity";

const CONTENT_CONFIDENCE: f64 = 0.8;
const SIMILAR_CONFIDENCE: f64 = 0.9;
const SEEDED_CONFIDENCE: f64 = 0.75;

/// Which id list a synthetic seed profile is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    Genres,
    Artists,
}

impl SeedKind {
    const fn algorithm(self) -> &'static str {
        match self {
            Self::Genres => GENRE_ALGORITHM,
            Self::Artists => ARTIST_ALGORITHM,
        }
    }

    const fn reason(self) -> &'static str {
        match self {
            Self::Genres => "matches your selected genres",
            Self::Artists => "from artists you selected",
        }
    }
}

#[derive(Clone)]
pub struct ContentRecommender {
    catalog: Arc<dyn TrackCatalog>,
    interactions: Arc<dyn InteractionStore>,
    fallback: FallbackProvider,
}

impl ContentRecommender {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            interactions: stores.interactions.clone(),
            fallback: FallbackProvider::new(stores.catalog.clone(), stores.interactions.clone()),
        }
    }

    /// Ranks active tracks by similarity to the listener's taste profile,
    /// built from interactions scoring at least `min_score`.
    ///
    /// Falls back to the popular list when the listener has no qualifying
    /// interactions or when nothing is left to rank.
    pub fn recommend_for_user(
        &self,
        user_id: UserId,
        min_score: f64,
        limit: usize,
        include_known: bool,
    ) -> Result<Recommendations> {
        let qualifying = self.interactions.qualifying_interactions(user_id, min_score)?;
        if qualifying.is_empty() {
            debug!("User {user_id} has no interactions scoring >= {min_score}, using popular tracks");
            return self.fallback.popular(limit, Placeholder::CONTENT);
        }

        let liked_ids: Vec<TrackId> = qualifying.iter().map(|i| i.track_id).collect();
        let liked = self.catalog.tracks(&liked_ids)?;
        let profile = user_profile(&liked);
        if profile.is_empty() {
            debug!("Taste profile of user {user_id} carries no features, using popular tracks");
            return self.fallback.popular(limit, Placeholder::CONTENT);
        }

        let known = if include_known {
            HashSet::new()
        } else {
            self.interactions.known_track_ids(user_id)?
        };
        let candidates: Vec<Track> = self
            .catalog
            .active_tracks()?
            .into_iter()
            .filter(|track| !known.contains(&track.id))
            .collect();

        let ranked = rank_by_similarity(&profile, candidates);
        if ranked.is_empty() {
            debug!("No candidate tracks left for user {user_id}, using popular tracks");
            return self.fallback.popular(limit, Placeholder::CONTENT);
        }

        debug!(
            "Content pass for user {user_id}: {} liked tracks, {} profile features, {} candidates",
            liked.len(),
            profile.len(),
            ranked.len()
        );

        let items = ranked
            .into_iter()
            .take(limit)
            .map(|(similarity, track)| {
                RecommendationItem::scored(
                    &track,
                    similarity,
                    CONTENT_CONFIDENCE,
                    "based on your music preferences",
                    track.tags(),
                )
            })
            .collect();
        Ok(Recommendations::new(items, CONTENT_ALGORITHM))
    }

    /// Ranks every other active track by similarity to one seed track.
    /// An unknown seed is a data gap and yields the popular list.
    pub fn similar_to(&self, seed_track_id: TrackId, limit: usize) -> Result<Recommendations> {
        let Some(seed) = self.catalog.track(seed_track_id)? else {
            warn!("Seed track {seed_track_id} not found, using popular tracks");
            return self.fallback.popular(limit, Placeholder::CONTENT);
        };

        let profile = track_profile(&seed);
        let candidates: Vec<Track> = self
            .catalog
            .active_tracks()?
            .into_iter()
            .filter(|track| track.id != seed.id)
            .collect();

        let ranked = rank_by_similarity(&profile, candidates);
        if ranked.is_empty() {
            return self.fallback.popular(limit, Placeholder::CONTENT);
        }

        let reason = format!("similar to {}", seed.title);
        let items = ranked
            .into_iter()
            .take(limit)
            .map(|(similarity, track)| {
                let mut tags = track.tags();
                if let Some(bucket) = track.duration_bucket() {
                    tags.push(bucket.label().to_string());
                }
                RecommendationItem::scored(&track, similarity, SIMILAR_CONFIDENCE, reason.as_str(), tags)
            })
            .collect();
        Ok(Recommendations::new(items, SIMILAR_TRACKS_ALGORITHM))
    }

    /// Ranks active tracks against a profile made only of the given genre or
    /// artist ids. Tracks sharing nothing with the seeds are dropped.
    ///
    /// Returns `None` when none of the ids resolve or when no eligible track
    /// shares a feature with them, leaving the choice of fallback to the
    /// caller.
    pub fn recommend_from_seeds(
        &self,
        kind: SeedKind,
        seed_ids: &[i64],
        exclude_known_for: Option<UserId>,
        limit: usize,
    ) -> Result<Option<Recommendations>> {
        let names = match kind {
            SeedKind::Genres => self.catalog.genre_names(seed_ids)?,
            SeedKind::Artists => self.catalog.artist_names(seed_ids)?,
        };
        if names.is_empty() {
            warn!("None of the {kind:?} seed ids {seed_ids:?} exist");
            return Ok(None);
        }

        let profile = match kind {
            SeedKind::Genres => seed_profile(&names, &[]),
            SeedKind::Artists => seed_profile(&[], &names),
        };
        let known = match exclude_known_for {
            Some(user_id) => self.interactions.known_track_ids(user_id)?,
            None => HashSet::new(),
        };
        let candidates: Vec<Track> = self
            .catalog
            .active_tracks()?
            .into_iter()
            .filter(|track| !known.contains(&track.id))
            .collect();

        let items = rank_by_similarity(&profile, candidates)
            .into_iter()
            .take_while(|(similarity, _)| *similarity > 0.0)
            .take(limit)
            .map(|(similarity, track)| {
                RecommendationItem::scored(&track, similarity, SEEDED_CONFIDENCE, kind.reason(), track.tags())
            })
            .collect::<Vec<_>>();

        if items.is_empty() {
            debug!("{kind:?} seeds {names:?} matched no eligible tracks");
            return Ok(None);
        }

        debug!("{kind:?} seeds {names:?} matched {} tracks", items.len());
        Ok(Some(Recommendations::new(items, kind.algorithm())))
    }
}

/// Scores every candidate against `profile` in parallel, then orders by
/// descending similarity. Candidates with equal similarity keep their
/// incoming order.
fn rank_by_similarity(profile: &FeatureVector, candidates: Vec<Track>) -> Vec<(f64, Track)> {
    let mut ranked: Vec<(f64, Track)> = candidates
        .into_par_iter()
        .map(|track| {
            let similarity = cosine_similarity(profile, &track_profile(&track));
            trace!("Track {} similarity {similarity:.4}", track.id);
            (similarity, track)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    ranked
}
