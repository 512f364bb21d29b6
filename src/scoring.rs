//! Interaction scoring: turns raw listening behavior into a bounded affinity.
//!
//! ```text
//! score = clamp(play_term + listen_term + like_term + share_term - skip_penalty, 0, 5)
//! ```
//!
//! Every term is capped, so no single behavior can dominate the result.

use crate::models::Interaction;
use chrono::{DateTime, Utc};

/// Immutable scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Assumed length when a track has no (or a zero) duration.
    pub default_track_duration: f64,
    pub play_weight: f64,
    pub play_cap: f64,
    pub listen_weight: f64,
    pub listen_cap: f64,
    pub like_bonus: f64,
    pub share_bonus: f64,
    pub skip_weight: f64,
    pub skip_cap: f64,
    pub max_score: f64,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            default_track_duration: 180.0,
            play_weight: 1.0,
            play_cap: 3.0,
            listen_weight: 2.0,
            listen_cap: 2.0,
            like_bonus: 1.5,
            share_bonus: 1.0,
            skip_weight: 0.5,
            skip_cap: 2.0,
            max_score: 5.0,
        }
    }
}

impl ScoringContext {
    #[must_use]
    pub fn with_default_duration(mut self, secs: f64) -> Self {
        self.default_track_duration = secs;
        self
    }
}

/// Affinity of one listener toward one track, in `[0, 5]`.
///
/// # Examples
///
/// ```
/// use resonance::scoring::score;
///
/// assert_eq!(score(0, 0.0, 0, false, false, None), 0.0);
/// // Three full listens of a liked track.
/// assert_eq!(score(3, 540.0, 0, true, false, Some(180)), 5.0);
/// ```
#[must_use]
pub fn score(
    play_count: u32,
    total_listen_time: f64,
    skip_count: u32,
    is_liked: bool,
    is_shared: bool,
    track_duration: Option<u32>,
) -> f64 {
    let mut interaction = Interaction::new(0, 0);
    interaction.play_count = play_count;
    interaction.total_listen_time = total_listen_time;
    interaction.skip_count = skip_count;
    interaction.is_liked = is_liked;
    interaction.is_shared = is_shared;
    calculate_score_functional(&interaction, track_duration, &ScoringContext::default())
}

/// Scores an interaction's counters under the given context.
#[must_use]
pub fn calculate_score_functional(
    interaction: &Interaction,
    track_duration: Option<u32>,
    context: &ScoringContext,
) -> f64 {
    let duration = track_duration
        .filter(|&secs| secs > 0)
        .map_or(context.default_track_duration, f64::from);

    let play_term = (f64::from(interaction.play_count) * context.play_weight).min(context.play_cap);
    let listen_term = listen_term(interaction, duration, context);
    let like_term = if interaction.is_liked { context.like_bonus } else { 0.0 };
    let share_term = if interaction.is_shared { context.share_bonus } else { 0.0 };
    let skip_penalty = (f64::from(interaction.skip_count) * context.skip_weight).min(context.skip_cap);

    let score = (play_term + listen_term + like_term + share_term - skip_penalty)
        .clamp(0.0, context.max_score);

    log::trace!(
        "Scored user {} / track {}: plays={:.2} listen={:.2} like={} share={} skips=-{:.2} => {:.3}",
        interaction.user_id,
        interaction.track_id,
        play_term,
        listen_term,
        like_term,
        share_term,
        skip_penalty,
        score
    );
    score
}

/// Average fraction of the track heard per play, scaled and capped.
/// Zero plays short-circuit to zero instead of dividing.
#[inline]
fn listen_term(interaction: &Interaction, duration: f64, context: &ScoringContext) -> f64 {
    match interaction.play_count {
        0 => 0.0,
        plays => {
            let ratio = interaction.total_listen_time.max(0.0) / (duration * f64::from(plays));
            (ratio * context.listen_weight).min(context.listen_cap)
        }
    }
}

/// Recomputes the stored score from the cumulative counters and stamps the
/// interaction time. This is the only writer of `interaction_score`.
pub fn rescore(
    interaction: &mut Interaction,
    track_duration: Option<u32>,
    context: &ScoringContext,
    at: DateTime<Utc>,
) {
    interaction.interaction_score = calculate_score_functional(interaction, track_duration, context);
    interaction.last_interaction_at = Some(at);
}

/// Distribution of stored interaction scores, used for tuning thresholds.
pub mod statistics {
    use serde::Serialize;

    /// Summarizes a set of scores. An empty input yields all zeros.
    #[must_use]
    pub fn analyze_score_distribution(scores: &[f64]) -> ScoreStatistics {
        if scores.is_empty() {
            return ScoreStatistics::default();
        }

        #[allow(clippy::cast_precision_loss)]
        let count = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / count;
        let variance = scores.iter().map(|&score| (score - mean).powi(2)).sum::<f64>() / count;

        ScoreStatistics {
            mean,
            variance,
            std_deviation: variance.sqrt(),
            min: scores.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
            max: scores.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
            count: scores.len(),
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct ScoreStatistics {
        pub mean: f64,
        pub variance: f64,
        pub std_deviation: f64,
        pub min: f64,
        pub max: f64,
        pub count: usize,
    }
}
