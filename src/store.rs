//! Data-access seams the engine depends on.
//!
//! The engine never talks to a database directly: each recommender is handed
//! these traits at construction and reads one snapshot per strategy pass.
//! [`crate::db::SqliteStore`] is the bundled implementation.

use crate::models::{ArtistId, GenreId, Interaction, Track, TrackId, UserId};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub trait TrackCatalog: Send + Sync {
    /// Returns the track with the given id, active or not.
    /// Returns None if it does not exist.
    fn track(&self, track_id: TrackId) -> Result<Option<Track>>;

    /// Returns the given tracks that exist, ordered by id.
    fn tracks(&self, track_ids: &[TrackId]) -> Result<Vec<Track>>;

    /// Returns every active track, ordered by id.
    fn active_tracks(&self) -> Result<Vec<Track>>;

    /// Returns up to `limit` active tracks by descending all-time play count.
    fn top_tracks_by_play_count(&self, limit: usize) -> Result<Vec<Track>>;

    /// Returns up to `limit` active tracks created at or after `since`,
    /// newest first.
    fn tracks_created_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Track>>;

    /// Resolves genre ids to names. Unknown ids are skipped.
    fn genre_names(&self, genre_ids: &[GenreId]) -> Result<Vec<String>>;

    /// Resolves artist ids to names. Unknown ids are skipped.
    fn artist_names(&self, artist_ids: &[ArtistId]) -> Result<Vec<String>>;
}

pub trait InteractionStore: Send + Sync {
    /// Returns the user's interactions whose score is at least `min_score`.
    fn qualifying_interactions(&self, user_id: UserId, min_score: f64) -> Result<Vec<Interaction>>;

    /// Returns every track the user has any interaction record for.
    fn known_track_ids(&self, user_id: UserId) -> Result<HashSet<TrackId>>;

    /// Returns the users, other than `exclude`, holding a qualifying
    /// interaction with at least one of the given tracks.
    fn users_sharing_tracks(
        &self,
        track_ids: &[TrackId],
        min_score: f64,
        exclude: UserId,
    ) -> Result<Vec<UserId>>;

    /// Returns the qualifying interactions of every given user, keyed by user.
    fn qualifying_interactions_for_users(
        &self,
        user_ids: &[UserId],
        min_score: f64,
    ) -> Result<HashMap<UserId, Vec<Interaction>>>;

    /// Atomically loads the (user, track) record, or a zeroed one when
    /// absent, lets `apply` mutate it and persists the result.
    fn update_interaction(
        &self,
        user_id: UserId,
        track_id: TrackId,
        apply: &mut dyn FnMut(&mut Interaction),
    ) -> Result<Interaction>;

    /// Counts one play of the track: bumps its all-time play count and logs
    /// a timestamped play event.
    fn record_track_play(&self, user_id: UserId, track_id: TrackId, at: DateTime<Utc>) -> Result<()>;

    /// Number of play events per track at or after `since`.
    fn recent_play_counts(&self, since: DateTime<Utc>) -> Result<HashMap<TrackId, u64>>;
}

pub trait UserDirectory: Send + Sync {
    fn user_exists(&self, user_id: UserId) -> Result<bool>;
}

/// The collaborators handed to every recommender.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn TrackCatalog>,
    pub interactions: Arc<dyn InteractionStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn TrackCatalog>,
        interactions: Arc<dyn InteractionStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            catalog,
            interactions,
            users,
        }
    }

    /// Uses one backend for all three roles.
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: TrackCatalog + InteractionStore + UserDirectory + 'static,
    {
        Self {
            catalog: store.clone(),
            interactions: store.clone(),
            users: store,
        }
    }
}
