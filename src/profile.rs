//! Content profiles: sparse feature vectors for tracks and listeners.
//!
//! A profile maps feature keys to weights:
//!
//! | key               | weight              |
//! |-------------------|---------------------|
//! | `genre_<name>`    | 1.0 per genre (name lower-cased) |
//! | `artist_<name>`   | 1.0 per artist      |
//! | `duration_<bucket>` | 1.0               |
//! | `popularity`      | `ln(1 + play_count)` |
//!
//! Profiles are plain values rebuilt per request; nothing here is cached.

use crate::models::Track;
use std::collections::BTreeMap;

pub const POPULARITY_KEY: &str = "popularity";

#[must_use]
pub fn genre_key(name: &str) -> String {
    format!("genre_{}", name.trim().to_lowercase())
}

#[must_use]
pub fn artist_key(name: &str) -> String {
    format!("artist_{}", name.trim())
}

/// Sparse weighted feature map. Keys are kept ordered so that similarity
/// sums are evaluated in the same order regardless of argument order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    weights: BTreeMap<String, f64>,
}

impl FeatureVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `weight` to `key`, creating the entry if needed.
    pub fn add(&mut self, key: impl Into<String>, weight: f64) {
        *self.weights.entry(key.into()).or_insert(0.0) += weight;
    }

    #[must_use]
    pub fn get(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(key, &weight)| (key.as_str(), weight))
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    #[must_use]
    pub fn norm(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }

    fn merge(&mut self, other: &FeatureVector) {
        for (key, weight) in other.iter() {
            self.add(key, weight);
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut vector = Self::new();
        for (key, weight) in iter {
            vector.add(key, weight);
        }
        vector
    }
}

/// Feature vector of a single track.
#[must_use]
pub fn track_profile(track: &Track) -> FeatureVector {
    let mut profile = FeatureVector::new();

    for genre in track.genre_names() {
        profile.add(genre_key(genre), 1.0);
    }
    for artist in &track.artists {
        profile.add(artist_key(&artist.name), 1.0);
    }
    if let Some(bucket) = track.duration_bucket() {
        profile.add(format!("duration_{}", bucket.label()), 1.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let popularity = (track.play_count as f64).ln_1p();
    if popularity > 0.0 {
        profile.add(POPULARITY_KEY, popularity);
    }

    profile
}

/// Aggregated taste of a listener: the L1-normalized sum of the profiles of
/// the given tracks. Returns an empty profile when there is no signal.
#[must_use]
pub fn user_profile<'a>(liked_tracks: impl IntoIterator<Item = &'a Track>) -> FeatureVector {
    let mut profile = FeatureVector::new();
    for track in liked_tracks {
        profile.merge(&track_profile(track));
    }
    normalize_l1(profile)
}

/// Synthetic profile made only of the given genre and artist names, used
/// for genre- and artist-seeded recommendations.
#[must_use]
pub fn seed_profile(genres: &[String], artists: &[String]) -> FeatureVector {
    genres
        .iter()
        .map(|name| (genre_key(name), 1.0))
        .chain(artists.iter().map(|name| (artist_key(name), 1.0)))
        .collect()
}

fn normalize_l1(profile: FeatureVector) -> FeatureVector {
    let total = profile.total_weight();
    if total <= 0.0 {
        return FeatureVector::new();
    }
    profile
        .iter()
        .map(|(key, weight)| (key.to_string(), weight / total))
        .collect()
}

/// Cosine similarity over the union of keys, missing weights read as zero.
/// Returns 0.0 when either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // Only shared keys contribute; iterate the smaller map.
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small.iter().map(|(key, weight)| weight * large.get(key)).sum();

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
