//! User-based collaborative filtering.
//!
//! Listeners are compared on the tracks they both rated. Cosine similarity
//! over that intersection is damped by `sqrt(jaccard)` of the two track
//! sets, so a pair agreeing on one shared track out of hundreds does not
//! outrank a pair with broad overlap.

use crate::config::EngineConfig;
use crate::fallback::{FallbackProvider, Placeholder};
use crate::models::{Interaction, RecommendationItem, Recommendations, Track, TrackId, UserId};
use crate::store::{InteractionStore, Stores, TrackCatalog};
use anyhow::Result;
use log::{debug, trace};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub const COLLABORATIVE_ALGORITHM: &str = "User-Based Collaborative Filtering";

const COLLABORATIVE_CONFIDENCE: f64 = 0.7;

/// A listener's ratings: track id to interaction score.
pub type RatingVector = HashMap<TrackId, f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarUser {
    pub user_id: UserId,
    pub similarity: f64,
}

/// Builds a rating vector, keeping the highest score on duplicate tracks.
#[must_use]
pub fn rating_vector(interactions: &[Interaction]) -> RatingVector {
    let mut ratings = RatingVector::with_capacity(interactions.len());
    for interaction in interactions {
        let score = interaction.interaction_score();
        ratings
            .entry(interaction.track_id)
            .and_modify(|current| *current = current.max(score))
            .or_insert(score);
    }
    ratings
}

/// Similarity of two listeners in `[0, 1]`.
///
/// Cosine over the shared tracks only, times `sqrt(|shared| / |union|)`.
/// Zero when nothing is shared or either side has zero norm there.
#[must_use]
pub fn user_similarity(a: &RatingVector, b: &RatingVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let mut shared = 0usize;
    let mut dot = 0.0;
    let mut norm_small = 0.0;
    let mut norm_large = 0.0;
    for (track_id, &x) in small {
        if let Some(&y) = large.get(track_id) {
            shared += 1;
            dot += x * y;
            norm_small += x * x;
            norm_large += y * y;
        }
    }

    if shared == 0 || norm_small == 0.0 || norm_large == 0.0 {
        return 0.0;
    }

    let cosine = dot / (norm_small.sqrt() * norm_large.sqrt());
    let union = a.len() + b.len() - shared;
    #[allow(clippy::cast_precision_loss)]
    let jaccard = shared as f64 / union as f64;

    (cosine * jaccard.sqrt()).clamp(0.0, 1.0)
}

/// Scores every candidate against the target in parallel and keeps those
/// strictly above `threshold`, most similar first, at most `max_users`.
#[must_use]
pub fn find_similar_users(
    target: &RatingVector,
    candidates: &HashMap<UserId, Vec<Interaction>>,
    threshold: f64,
    max_users: usize,
) -> Vec<SimilarUser> {
    let mut similar: Vec<SimilarUser> = candidates
        .par_iter()
        .map(|(&user_id, interactions)| SimilarUser {
            user_id,
            similarity: user_similarity(target, &rating_vector(interactions)),
        })
        .filter(|candidate| {
            trace!("Candidate user {} similarity {:.4}", candidate.user_id, candidate.similarity);
            candidate.similarity > threshold
        })
        .collect();

    similar.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    similar.truncate(max_users);
    similar
}

#[derive(Clone)]
pub struct CollaborativeRecommender {
    catalog: Arc<dyn TrackCatalog>,
    interactions: Arc<dyn InteractionStore>,
    fallback: FallbackProvider,
    similar_user_threshold: f64,
    max_similar_users: usize,
}

impl CollaborativeRecommender {
    #[must_use]
    pub fn new(stores: &Stores, config: &EngineConfig) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            interactions: stores.interactions.clone(),
            fallback: FallbackProvider::new(stores.catalog.clone(), stores.interactions.clone()),
            similar_user_threshold: config.similar_user_threshold,
            max_similar_users: config.max_similar_users,
        }
    }

    /// Tracks liked by listeners with similar taste, weighted by how similar
    /// each listener is. Tracks the user already knows are never returned.
    ///
    /// Falls back to the popular list whenever there is no signal: no
    /// qualifying interactions, no similar listener, or nothing new to offer.
    pub fn recommend(&self, user_id: UserId, min_score: f64, limit: usize) -> Result<Recommendations> {
        let qualifying = self.interactions.qualifying_interactions(user_id, min_score)?;
        if qualifying.is_empty() {
            debug!("User {user_id} has no interactions scoring >= {min_score}, using trending tracks");
            return self.fallback.popular(limit, Placeholder::COLLABORATIVE);
        }

        let target = rating_vector(&qualifying);
        let track_ids: Vec<TrackId> = target.keys().copied().collect();
        let candidate_ids = self
            .interactions
            .users_sharing_tracks(&track_ids, min_score, user_id)?;
        if candidate_ids.is_empty() {
            debug!("No other listener shares a track with user {user_id}, using trending tracks");
            return self.fallback.popular(limit, Placeholder::COLLABORATIVE);
        }

        let candidates = self
            .interactions
            .qualifying_interactions_for_users(&candidate_ids, min_score)?;
        let similar = find_similar_users(
            &target,
            &candidates,
            self.similar_user_threshold,
            self.max_similar_users,
        );
        debug!(
            "User {user_id}: {} candidate listeners, {} above similarity {}",
            candidate_ids.len(),
            similar.len(),
            self.similar_user_threshold
        );
        if similar.is_empty() {
            return self.fallback.popular(limit, Placeholder::COLLABORATIVE);
        }

        let known = self.interactions.known_track_ids(user_id)?;
        let mut accumulated: HashMap<TrackId, f64> = HashMap::new();
        for neighbour in &similar {
            let Some(interactions) = candidates.get(&neighbour.user_id) else {
                continue;
            };
            for interaction in interactions {
                if known.contains(&interaction.track_id) {
                    continue;
                }
                *accumulated.entry(interaction.track_id).or_insert(0.0) +=
                    interaction.interaction_score() * neighbour.similarity;
            }
        }

        let candidate_tracks: Vec<TrackId> = accumulated.keys().copied().collect();
        let mut ranked: Vec<(f64, Track)> = self
            .catalog
            .tracks(&candidate_tracks)?
            .into_iter()
            .filter(|track| track.is_active)
            .map(|track| (accumulated.get(&track.id).copied().unwrap_or(0.0), track))
            .collect();
        if ranked.is_empty() {
            debug!("Similar listeners of user {user_id} offer nothing new, using trending tracks");
            return self.fallback.popular(limit, Placeholder::COLLABORATIVE);
        }
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let items = ranked
            .into_iter()
            .take(limit)
            .map(|(score, track)| {
                RecommendationItem::scored(
                    &track,
                    score,
                    COLLABORATIVE_CONFIDENCE,
                    "users with similar taste also liked this",
                    track.tags(),
                )
            })
            .collect();
        Ok(Recommendations::new(items, COLLABORATIVE_ALGORITHM))
    }
}
