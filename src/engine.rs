//! Request orchestration.
//!
//! Every request walks the same phases:
//!
//! ```text
//! Received -> Validated -> Dispatched(strategy) -> Running(strategy) -> Assembled -> Returned
//! ```
//!
//! Validation errors are the only failures a caller ever sees. A storage or
//! computation failure inside a strategy is logged and answered with the
//! trending list instead; if even that cannot be read, the answer is an
//! empty list tagged [`FALLBACK_ALGORITHM`].

use crate::collaborative::CollaborativeRecommender;
use crate::config::EngineConfig;
use crate::content::{ContentRecommender, SeedKind};
use crate::error::{RecommendError, ValidationError};
use crate::fallback::{FallbackProvider, FALLBACK_ALGORITHM};
use crate::hybrid::HybridRecommender;
use crate::models::{
    Interaction, InteractionType, RecommendationRequest, RecommendationResponse, Recommendations,
    Strategy, TrackId, UserId,
};
use crate::scoring::{rescore, ScoringContext};
use crate::store::Stores;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fmt;

pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Validated,
    Dispatched(Strategy),
    Running(Strategy),
    Assembled,
    Returned,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("RECEIVED"),
            Self::Validated => f.write_str("VALIDATED"),
            Self::Dispatched(strategy) => write!(f, "DISPATCHED({strategy})"),
            Self::Running(strategy) => write!(f, "{strategy}"),
            Self::Assembled => f.write_str("ASSEMBLED"),
            Self::Returned => f.write_str("RETURNED"),
        }
    }
}

fn enter(phase: RequestPhase) {
    debug!("Request phase -> {phase}");
}

/// Single entry point over every strategy.
///
/// Holds no per-request state: one engine can serve any number of threads.
#[derive(Clone)]
pub struct RecommendationEngine {
    stores: Stores,
    config: EngineConfig,
    scoring: ScoringContext,
    content: ContentRecommender,
    collaborative: CollaborativeRecommender,
    hybrid: HybridRecommender,
    fallback: FallbackProvider,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self {
            content: ContentRecommender::new(&stores),
            collaborative: CollaborativeRecommender::new(&stores, &config),
            hybrid: HybridRecommender::new(&stores, &config),
            fallback: FallbackProvider::new(stores.catalog.clone(), stores.interactions.clone()),
            scoring: ScoringContext::default()
                .with_default_duration(f64::from(config.default_track_duration_secs)),
            stores,
            config,
        }
    }

    /// Produces a ranked, explained list for the request.
    ///
    /// # Errors
    ///
    /// Only [`RecommendError::Validation`]; every other failure degrades to
    /// the trending list.
    pub fn get_recommendations(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse, RecommendError> {
        self.get_recommendations_at(request, Utc::now())
    }

    /// Same as [`Self::get_recommendations`] with an explicit clock, which
    /// anchors the trending and new release windows.
    pub fn get_recommendations_at(
        &self,
        request: &RecommendationRequest,
        now: DateTime<Utc>,
    ) -> Result<RecommendationResponse, RecommendError> {
        enter(RequestPhase::Received);

        let recommendations = match self.validate(request) {
            Ok(()) => {
                enter(RequestPhase::Validated);
                enter(RequestPhase::Dispatched(request.strategy));
                match self.dispatch(request, now) {
                    Ok(recommendations) => recommendations,
                    Err(err) => {
                        error!("Strategy {} failed: {err:#}", request.strategy);
                        self.recover(request.limit, now)
                    }
                }
            }
            Err(RecommendError::Validation(err)) => {
                info!("Rejected {} request: {err}", request.strategy);
                return Err(err.into());
            }
            Err(RecommendError::Storage(err)) => {
                error!("Could not validate {} request: {err:#}", request.strategy);
                self.recover(request.limit, now)
            }
        };

        let response = RecommendationResponse::assemble(request.strategy, recommendations);
        enter(RequestPhase::Assembled);
        info!(
            "{} request for user {:?}: {} items via {}{}",
            request.strategy,
            request.user_id,
            response.total_count,
            response.algorithm,
            if response.fallback_used { " (fallback)" } else { "" }
        );
        enter(RequestPhase::Returned);
        Ok(response)
    }

    fn validate(&self, request: &RecommendationRequest) -> Result<(), RecommendError> {
        if !(1..=MAX_LIMIT).contains(&request.limit) {
            return Err(ValidationError::LimitOutOfRange(request.limit).into());
        }
        if !(0.0..=1.0).contains(&request.diversity_factor) {
            return Err(ValidationError::DiversityOutOfRange(request.diversity_factor).into());
        }
        if !request.min_interaction_score.is_finite() || request.min_interaction_score < 0.0 {
            return Err(ValidationError::InvalidMinScore(request.min_interaction_score).into());
        }

        match request.strategy {
            Strategy::SimilarTracks if request.seed_track_id.is_none() => {
                return Err(ValidationError::MissingSeedTrack(request.strategy).into());
            }
            Strategy::GenreBased if request.seed_genre_ids.is_empty() => {
                return Err(ValidationError::MissingSeedGenres.into());
            }
            Strategy::ArtistBased if request.seed_artist_ids.is_empty() => {
                return Err(ValidationError::MissingSeedArtists.into());
            }
            _ => {}
        }

        if request.strategy.is_personalized() {
            let user_id = required_user(request)?;
            if !self.stores.users.user_exists(user_id)? {
                return Err(ValidationError::UnknownUser(user_id).into());
            }
        }
        Ok(())
    }

    fn dispatch(
        &self,
        request: &RecommendationRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Recommendations> {
        let strategy = request.strategy;
        let limit = request.limit;
        let min_score = request.min_interaction_score;
        enter(RequestPhase::Running(strategy));

        match strategy {
            Strategy::ContentBased => self.content.recommend_for_user(
                required_user(request)?,
                min_score,
                limit,
                request.include_known_tracks,
            ),
            Strategy::Collaborative => {
                self.collaborative
                    .recommend(required_user(request)?, min_score, limit)
            }
            Strategy::Hybrid => self.hybrid.recommend(
                required_user(request)?,
                min_score,
                limit,
                request.include_known_tracks,
                request.diversity_factor,
            ),
            Strategy::SimilarTracks => {
                let seed = request
                    .seed_track_id
                    .ok_or(ValidationError::MissingSeedTrack(strategy))?;
                self.content.similar_to(seed, limit)
            }
            Strategy::GenreBased => self.seeded(SeedKind::Genres, &request.seed_genre_ids, request, now),
            Strategy::ArtistBased => self.seeded(SeedKind::Artists, &request.seed_artist_ids, request, now),
            Strategy::Trending => self
                .fallback
                .trending(limit, self.config.trending_window_days, now),
            Strategy::NewReleases => self
                .fallback
                .new_releases(limit, self.config.new_release_window_days, now),
        }
    }

    fn seeded(
        &self,
        kind: SeedKind,
        seed_ids: &[i64],
        request: &RecommendationRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Recommendations> {
        let exclude_known_for = if request.include_known_tracks {
            None
        } else {
            request.user_id
        };
        match self
            .content
            .recommend_from_seeds(kind, seed_ids, exclude_known_for, request.limit)?
        {
            Some(recommendations) => Ok(recommendations),
            None => {
                let mut trending =
                    self.fallback
                        .trending(request.limit, self.config.trending_window_days, now)?;
                trending.fallback = true;
                Ok(trending)
            }
        }
    }

    fn recover(&self, limit: usize, now: DateTime<Utc>) -> Recommendations {
        match self.fallback.trending(limit, self.config.trending_window_days, now) {
            Ok(mut trending) => {
                warn!("Answering with trending tracks after a failure");
                trending.fallback = true;
                trending
            }
            Err(err) => {
                error!("Trending fallback failed as well: {err:#}");
                Recommendations::fallback(Vec::new(), FALLBACK_ALGORITHM)
            }
        }
    }

    /// Applies one behavioral event to the (user, track) record and
    /// recomputes its score from the cumulative counters.
    ///
    /// `listen_time` is in seconds and only counts for plays and skips.
    pub fn record_interaction(
        &self,
        user_id: UserId,
        track_id: TrackId,
        kind: InteractionType,
        listen_time: Option<f64>,
    ) -> Result<Interaction, RecommendError> {
        self.record_interaction_at(user_id, track_id, kind, listen_time, Utc::now())
    }

    pub fn record_interaction_at(
        &self,
        user_id: UserId,
        track_id: TrackId,
        kind: InteractionType,
        listen_time: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<Interaction, RecommendError> {
        let listen_time = listen_time.unwrap_or(0.0);
        if !listen_time.is_finite() || listen_time < 0.0 {
            return Err(ValidationError::InvalidListenTime(listen_time).into());
        }
        if !self.stores.users.user_exists(user_id)? {
            return Err(ValidationError::UnknownUser(user_id).into());
        }
        let track = self
            .stores
            .catalog
            .track(track_id)?
            .ok_or(ValidationError::UnknownTrack(track_id))?;

        let context = self.scoring;
        let interaction = self.stores.interactions.update_interaction(
            user_id,
            track_id,
            &mut |interaction: &mut Interaction| {
                apply_event(interaction, kind, listen_time);
                rescore(interaction, track.duration_secs, &context, at);
            },
        )?;

        if kind == InteractionType::Play {
            self.stores
                .interactions
                .record_track_play(user_id, track_id, at)?;
        }

        debug!(
            "Recorded {kind} for user {user_id} / track {track_id}: score {:.3}",
            interaction.interaction_score()
        );
        Ok(interaction)
    }
}

fn required_user(request: &RecommendationRequest) -> Result<UserId, ValidationError> {
    request
        .user_id
        .ok_or(ValidationError::MissingUser(request.strategy))
}

fn apply_event(interaction: &mut Interaction, kind: InteractionType, listen_time: f64) {
    match kind {
        InteractionType::Play => {
            interaction.play_count = interaction.play_count.saturating_add(1);
            interaction.total_listen_time += listen_time;
        }
        InteractionType::Skip => {
            interaction.skip_count = interaction.skip_count.saturating_add(1);
            interaction.total_listen_time += listen_time;
        }
        InteractionType::Like => interaction.is_liked = true,
        InteractionType::Unlike => interaction.is_liked = false,
        InteractionType::Share => interaction.is_shared = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewTrack, SqliteStore};
    use crate::fallback::{Placeholder, TRENDING_ALGORITHM};
    use crate::models::{ArtistId, GenreId};
    use crate::store::{InteractionStore, TrackCatalog, UserDirectory};
    use anyhow::bail;
    use chrono::Duration;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn engine() -> anyhow::Result<(Arc<SqliteStore>, RecommendationEngine)> {
        let store = Arc::new(SqliteStore::open_in_memory()?);
        let engine = RecommendationEngine::new(Stores::shared(store.clone()), EngineConfig::default());
        Ok((store, engine))
    }

    fn validation_error(engine: &RecommendationEngine, request: &RecommendationRequest) -> ValidationError {
        match engine.get_recommendations(request) {
            Err(RecommendError::Validation(err)) => err,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_malformed_requests() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let user = store.add_user("someone")?;

        let zero = RecommendationRequest::new(Strategy::Trending).with_limit(0);
        assert!(matches!(validation_error(&engine, &zero), ValidationError::LimitOutOfRange(0)));
        let huge = RecommendationRequest::new(Strategy::Trending).with_limit(101);
        assert!(matches!(validation_error(&engine, &huge), ValidationError::LimitOutOfRange(101)));

        let mut diverse = RecommendationRequest::new(Strategy::Trending);
        diverse.diversity_factor = 1.5;
        assert!(matches!(
            validation_error(&engine, &diverse),
            ValidationError::DiversityOutOfRange(_)
        ));

        let similar = RecommendationRequest::new(Strategy::SimilarTracks);
        assert!(matches!(
            validation_error(&engine, &similar),
            ValidationError::MissingSeedTrack(Strategy::SimilarTracks)
        ));
        assert!(matches!(
            validation_error(&engine, &RecommendationRequest::new(Strategy::GenreBased)),
            ValidationError::MissingSeedGenres
        ));
        assert!(matches!(
            validation_error(&engine, &RecommendationRequest::new(Strategy::ArtistBased)),
            ValidationError::MissingSeedArtists
        ));

        assert!(matches!(
            validation_error(&engine, &RecommendationRequest::new(Strategy::Hybrid)),
            ValidationError::MissingUser(Strategy::Hybrid)
        ));
        let ghost = RecommendationRequest::for_user(user + 100, Strategy::ContentBased);
        assert!(matches!(
            validation_error(&engine, &ghost),
            ValidationError::UnknownUser(id) if id == user + 100
        ));
        Ok(())
    }

    #[test]
    fn test_cold_start_user_gets_popular_tracks() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let user = store.add_user("newcomer")?;
        store.add_track(&NewTrack::new("Big").plays(30))?;
        store.add_track(&NewTrack::new("Small").plays(3))?;

        let request = RecommendationRequest::for_user(user, Strategy::ContentBased).with_limit(5);
        let response = engine.get_recommendations(&request)?;

        let expected = FallbackProvider::new(store.clone(), store.clone()).popular(5, Placeholder::CONTENT)?;
        assert_eq!(response.recommendations, expected.items);
        assert_eq!(response.strategy, Strategy::ContentBased);
        assert_eq!(response.algorithm, "Popularity-based");
        assert!(response.fallback_used);
        assert_eq!(response.total_count, 2);
        assert!((response.average_confidence - 0.3).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_non_personalized_strategies_need_no_user() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let now = Utc::now();
        store.add_track(&NewTrack::new("Old").created_at(now - Duration::days(90)).plays(10))?;
        store.add_track(&NewTrack::new("New").created_at(now - Duration::days(1)))?;

        let trending = engine.get_recommendations_at(&RecommendationRequest::new(Strategy::Trending), now)?;
        assert_eq!(trending.algorithm, TRENDING_ALGORITHM);
        assert_eq!(trending.total_count, 2);
        assert!(!trending.fallback_used);

        let fresh = engine.get_recommendations_at(&RecommendationRequest::new(Strategy::NewReleases), now)?;
        assert_eq!(fresh.algorithm, "Recency-based");
        assert_eq!(fresh.total_count, 1);
        assert_eq!(fresh.recommendations[0].track.title, "New");
        Ok(())
    }

    #[test]
    fn test_unknown_seed_genres_fall_back_to_trending() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        store.add_track(&NewTrack::new("Anything").genres(&["pop"]))?;

        let mut request = RecommendationRequest::new(Strategy::GenreBased);
        request.seed_genre_ids = vec![404];
        let response = engine.get_recommendations(&request)?;
        assert_eq!(response.algorithm, TRENDING_ALGORITHM);
        assert!(response.fallback_used);
        assert_eq!(response.total_count, 1);
        Ok(())
    }

    #[test]
    fn test_seeds_matching_only_inactive_tracks_fall_back_to_trending() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let retired = store.add_track(&NewTrack::new("Retired").genres(&["jazz"]))?;
        store.set_track_active(retired, false)?;
        store.add_track(&NewTrack::new("Chart").genres(&["pop"]).plays(5))?;
        let jazz = store.add_genre("jazz")?;

        let mut request = RecommendationRequest::new(Strategy::GenreBased);
        request.seed_genre_ids = vec![jazz];
        let response = engine.get_recommendations(&request)?;
        assert_eq!(response.algorithm, TRENDING_ALGORITHM);
        assert!(response.fallback_used);
        assert_eq!(response.total_count, 1);
        assert_eq!(response.recommendations[0].track.title, "Chart");
        Ok(())
    }

    #[test]
    fn test_seeds_fully_known_to_user_fall_back_to_trending() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let user = store.add_user("fan")?;
        let single = store.add_track(&NewTrack::new("Single").artists(&["Band"]))?;
        let b_side = store.add_track(&NewTrack::new("B-side").artists(&["Band"]))?;
        store.add_track(&NewTrack::new("Elsewhere").artists(&["Stranger"]))?;
        engine.record_interaction(user, single, InteractionType::Play, None)?;
        engine.record_interaction(user, b_side, InteractionType::Like, None)?;
        let band = store.add_artist("Band")?;

        let mut request = RecommendationRequest::for_user(user, Strategy::ArtistBased);
        request.seed_artist_ids = vec![band];
        let response = engine.get_recommendations(&request)?;
        assert_eq!(response.algorithm, TRENDING_ALGORITHM);
        assert!(response.fallback_used);
        assert_eq!(response.total_count, 3);

        request.include_known_tracks = true;
        let response = engine.get_recommendations(&request)?;
        assert_eq!(response.algorithm, "Artist Similarity");
        assert!(!response.fallback_used);
        assert_eq!(response.total_count, 2);
        Ok(())
    }

    #[test]
    fn test_record_interaction_is_cumulative() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let user = store.add_user("listener")?;
        let track = store.add_track(&NewTrack::new("Song").duration(180))?;

        let first = engine.record_interaction(user, track, InteractionType::Play, Some(90.0))?;
        // one play + half the track heard
        assert!((first.interaction_score() - 2.0).abs() < 1e-12);

        let second = engine.record_interaction(user, track, InteractionType::Play, Some(180.0))?;
        assert_eq!(second.play_count, 2);
        assert!((second.total_listen_time - 270.0).abs() < 1e-12);
        // 2 plays + (270 / 360) * 2, not the 3.0 the second event alone would give
        assert!((second.interaction_score() - 3.5).abs() < 1e-12);
        assert!(second.last_interaction_at.is_some());

        let liked = engine.record_interaction(user, track, InteractionType::Like, None)?;
        assert!((liked.interaction_score() - 5.0).abs() < 1e-12);
        let unliked = engine.record_interaction(user, track, InteractionType::Unlike, None)?;
        assert!((unliked.interaction_score() - 3.5).abs() < 1e-12);

        let skipped = engine.record_interaction(user, track, InteractionType::Skip, Some(10.0))?;
        assert_eq!(skipped.skip_count, 1);
        assert_eq!(skipped.play_count, 2);

        assert_eq!(store.track(track)?.map(|t| t.play_count), Some(2));
        Ok(())
    }

    #[test]
    fn test_record_interaction_validates_input() -> anyhow::Result<()> {
        let (store, engine) = engine()?;
        let user = store.add_user("listener")?;
        let track = store.add_track(&NewTrack::new("Song"))?;

        let err = engine
            .record_interaction(user, track, InteractionType::Play, Some(-1.0))
            .unwrap_err();
        assert!(matches!(err, RecommendError::Validation(ValidationError::InvalidListenTime(_))));

        let err = engine
            .record_interaction(user + 1, track, InteractionType::Play, None)
            .unwrap_err();
        assert!(matches!(err, RecommendError::Validation(ValidationError::UnknownUser(_))));

        let err = engine
            .record_interaction(user, track + 1, InteractionType::Share, None)
            .unwrap_err();
        assert!(matches!(err, RecommendError::Validation(ValidationError::UnknownTrack(_))));
        Ok(())
    }

    /// A collaborator whose every read fails.
    struct BrokenStore;

    impl TrackCatalog for BrokenStore {
        fn track(&self, _: TrackId) -> anyhow::Result<Option<crate::models::Track>> {
            bail!("catalog offline")
        }
        fn tracks(&self, _: &[TrackId]) -> anyhow::Result<Vec<crate::models::Track>> {
            bail!("catalog offline")
        }
        fn active_tracks(&self) -> anyhow::Result<Vec<crate::models::Track>> {
            bail!("catalog offline")
        }
        fn top_tracks_by_play_count(&self, _: usize) -> anyhow::Result<Vec<crate::models::Track>> {
            bail!("catalog offline")
        }
        fn tracks_created_since(
            &self,
            _: DateTime<Utc>,
            _: usize,
        ) -> anyhow::Result<Vec<crate::models::Track>> {
            bail!("catalog offline")
        }
        fn genre_names(&self, _: &[GenreId]) -> anyhow::Result<Vec<String>> {
            bail!("catalog offline")
        }
        fn artist_names(&self, _: &[ArtistId]) -> anyhow::Result<Vec<String>> {
            bail!("catalog offline")
        }
    }

    impl InteractionStore for BrokenStore {
        fn qualifying_interactions(&self, _: UserId, _: f64) -> anyhow::Result<Vec<Interaction>> {
            bail!("interactions offline")
        }
        fn known_track_ids(&self, _: UserId) -> anyhow::Result<HashSet<TrackId>> {
            bail!("interactions offline")
        }
        fn users_sharing_tracks(&self, _: &[TrackId], _: f64, _: UserId) -> anyhow::Result<Vec<UserId>> {
            bail!("interactions offline")
        }
        fn qualifying_interactions_for_users(
            &self,
            _: &[UserId],
            _: f64,
        ) -> anyhow::Result<HashMap<UserId, Vec<Interaction>>> {
            bail!("interactions offline")
        }
        fn update_interaction(
            &self,
            _: UserId,
            _: TrackId,
            _: &mut dyn FnMut(&mut Interaction),
        ) -> anyhow::Result<Interaction> {
            bail!("interactions offline")
        }
        fn record_track_play(&self, _: UserId, _: TrackId, _: DateTime<Utc>) -> anyhow::Result<()> {
            bail!("interactions offline")
        }
        fn recent_play_counts(&self, _: DateTime<Utc>) -> anyhow::Result<HashMap<TrackId, u64>> {
            bail!("interactions offline")
        }
    }

    impl UserDirectory for BrokenStore {
        fn user_exists(&self, _: UserId) -> anyhow::Result<bool> {
            bail!("users offline")
        }
    }

    #[test]
    fn test_strategy_failure_degrades_to_trending() -> anyhow::Result<()> {
        let store = Arc::new(SqliteStore::open_in_memory()?);
        let user = store.add_user("me")?;
        store.add_track(&NewTrack::new("Still here").plays(4))?;

        // The user check fails, the catalog and interactions still work.
        let stores = Stores::new(store.clone(), store.clone(), Arc::new(BrokenStore));
        let engine = RecommendationEngine::new(stores, EngineConfig::default());

        let response = engine.get_recommendations(&RecommendationRequest::for_user(user, Strategy::Hybrid))?;
        assert_eq!(response.algorithm, TRENDING_ALGORITHM);
        assert!(response.fallback_used);
        assert_eq!(response.total_count, 1);
        Ok(())
    }

    #[test]
    fn test_total_failure_yields_empty_fallback() -> anyhow::Result<()> {
        let store = Arc::new(SqliteStore::open_in_memory()?);
        let user = store.add_user("me")?;
        store.add_track(&NewTrack::new("Unreachable"))?;

        let stores = Stores::new(store.clone(), Arc::new(BrokenStore), store.clone());
        let engine = RecommendationEngine::new(stores, EngineConfig::default());

        let response =
            engine.get_recommendations(&RecommendationRequest::for_user(user, Strategy::ContentBased))?;
        assert_eq!(response.algorithm, FALLBACK_ALGORITHM);
        assert!(response.fallback_used);
        assert!(response.recommendations.is_empty());
        assert_eq!(response.average_confidence, 0.0);

        // Validation still wins over storage trouble.
        let bad = RecommendationRequest::for_user(user, Strategy::ContentBased).with_limit(0);
        assert!(engine.get_recommendations(&bad).unwrap_err().is_validation());
        Ok(())
    }
}
