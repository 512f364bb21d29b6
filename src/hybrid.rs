//! Hybrid strategy: weighted union of collaborative and content rankings.
//!
//! ```text
//! combined = collaborative_weight * collab_score + content_weight * content_score
//! ```
//!
//! A track found by only one side keeps just that side's weighted score;
//! there is no renormalization for single-source tracks.

use crate::collaborative::CollaborativeRecommender;
use crate::config::EngineConfig;
use crate::content::ContentRecommender;
use crate::fallback::{FallbackProvider, Placeholder};
use crate::models::{sort_by_score_desc, RecommendationItem, Recommendations, TrackId, UserId};
use crate::store::Stores;
use anyhow::Result;
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const HYBRID_ALGORITHM: &str = "Hybrid (Collaborative + Content-Based)";

const HYBRID_CONFIDENCE: f64 = 0.75;
const BOTH_SOURCES_REASON: &str = "recommended by taste match and similar listeners";

/// Merges two ranked lists into one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridCombiner {
    pub collaborative_weight: f64,
    pub content_weight: f64,
    pub near_tie_epsilon: f64,
}

impl Default for HybridCombiner {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

struct Blend {
    item: RecommendationItem,
    collaborative: Option<f64>,
    content: Option<f64>,
}

impl HybridCombiner {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            collaborative_weight: config.collaborative_weight,
            content_weight: config.content_weight,
            near_tie_epsilon: config.near_tie_epsilon,
        }
    }

    /// Unions both lists by track id, scores each track with the weighted
    /// formula, orders by combined score, applies the diversity pass and
    /// truncates to `limit`.
    ///
    /// The returned order is authoritative. After a demotion the list is
    /// no longer sorted by `score`, and re-sorting by score undoes the
    /// diversity pass.
    #[must_use]
    pub fn combine(
        &self,
        collaborative: &[RecommendationItem],
        content: &[RecommendationItem],
        diversity_factor: f64,
        limit: usize,
    ) -> Vec<RecommendationItem> {
        let mut blends: Vec<Blend> = Vec::with_capacity(collaborative.len() + content.len());
        let mut index: HashMap<TrackId, usize> = HashMap::new();

        for item in collaborative {
            let slot = *index.entry(item.track.id).or_insert_with(|| {
                blends.push(Blend {
                    item: item.clone(),
                    collaborative: None,
                    content: None,
                });
                blends.len() - 1
            });
            blends[slot].collaborative = Some(item.score);
        }
        for item in content {
            match index.get(&item.track.id) {
                Some(&slot) => {
                    let blend = &mut blends[slot];
                    blend.content = Some(item.score);
                    blend.item.reason = BOTH_SOURCES_REASON.to_string();
                    for tag in &item.tags {
                        if !blend.item.tags.contains(tag) {
                            blend.item.tags.push(tag.clone());
                        }
                    }
                }
                None => {
                    index.insert(item.track.id, blends.len());
                    blends.push(Blend {
                        item: item.clone(),
                        collaborative: None,
                        content: Some(item.score),
                    });
                }
            }
        }

        let mut items: Vec<RecommendationItem> = blends
            .into_iter()
            .map(|blend| {
                let combined = self.collaborative_weight * blend.collaborative.unwrap_or(0.0)
                    + self.content_weight * blend.content.unwrap_or(0.0);
                trace!(
                    "Track {}: collab={:?} content={:?} => {combined:.4}",
                    blend.item.track.id,
                    blend.collaborative,
                    blend.content
                );
                let mut item = blend.item;
                item.score = combined;
                item.confidence = (combined * HYBRID_CONFIDENCE).clamp(0.0, 1.0);
                item
            })
            .collect();

        sort_by_score_desc(&mut items);
        let mut items = self.diversify(items, diversity_factor);
        items.truncate(limit);
        items
    }

    /// Demotes a track that repeats the primary artist of the track ranked
    /// just before it when the two scores are within `near_tie_epsilon`.
    ///
    /// Only the ordering changes: the demoted item keeps its combined score.
    /// Items that are not demoted keep their relative order.
    fn diversify(&self, items: Vec<RecommendationItem>, diversity_factor: f64) -> Vec<RecommendationItem> {
        if diversity_factor <= 0.0 || items.len() < 2 {
            return items;
        }

        let mut keyed: Vec<(f64, RecommendationItem)> = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let mut key = item.score;
            if let Some(previous) = position.checked_sub(1).map(|p| &items[p]) {
                let same_artist = matches!(
                    (previous.track.primary_artist(), item.track.primary_artist()),
                    (Some(a), Some(b)) if a == b
                );
                if same_artist && (previous.score - item.score).abs() <= self.near_tie_epsilon {
                    key *= 1.0 - diversity_factor;
                    debug!(
                        "Diversity: demoting track {} behind track {} (same artist)",
                        item.track.id, previous.track.id
                    );
                }
            }
            keyed.push((key, item.clone()));
        }

        keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        keyed.into_iter().map(|(_, item)| item).collect()
    }
}

#[derive(Clone)]
pub struct HybridRecommender {
    content: ContentRecommender,
    collaborative: CollaborativeRecommender,
    fallback: FallbackProvider,
    combiner: HybridCombiner,
    candidate_multiplier: usize,
}

impl HybridRecommender {
    #[must_use]
    pub fn new(stores: &Stores, config: &EngineConfig) -> Self {
        Self {
            content: ContentRecommender::new(stores),
            collaborative: CollaborativeRecommender::new(stores, config),
            fallback: FallbackProvider::new(stores.catalog.clone(), stores.interactions.clone()),
            combiner: HybridCombiner::new(config),
            candidate_multiplier: config.hybrid_candidate_multiplier.max(1),
        }
    }

    pub fn recommend(
        &self,
        user_id: UserId,
        min_score: f64,
        limit: usize,
        include_known: bool,
        diversity_factor: f64,
    ) -> Result<Recommendations> {
        let pool = limit.saturating_mul(self.candidate_multiplier);
        let collaborative = self.collaborative.recommend(user_id, min_score, pool)?;
        let content = self
            .content
            .recommend_for_user(user_id, min_score, pool, include_known)?;

        // Fallback sub-results are placeholders, not signal.
        let collaborative_items: &[RecommendationItem] =
            if collaborative.fallback { &[] } else { &collaborative.items };
        let content_items: &[RecommendationItem] = if content.fallback { &[] } else { &content.items };

        debug!(
            "Hybrid for user {user_id}: {} collaborative and {} content candidates",
            collaborative_items.len(),
            content_items.len()
        );

        let combined = self
            .combiner
            .combine(collaborative_items, content_items, diversity_factor, limit);
        if !combined.is_empty() {
            return Ok(Recommendations::new(combined, HYBRID_ALGORITHM));
        }

        for mut sub_result in [content, collaborative] {
            if !sub_result.is_empty() {
                sub_result.items.truncate(limit);
                return Ok(sub_result);
            }
        }
        self.fallback.popular(limit, Placeholder::CONTENT)
    }
}
