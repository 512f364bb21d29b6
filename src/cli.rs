//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Resonance using Clap derive macros.
//!
//! ## Commands
//!
//! - `init-db`: Create an empty database
//! - `import`: Load a JSON track catalog
//! - `add-user`: Register a listener
//! - `record`: Record one behavioral event (play, skip, like, unlike, share)
//! - `recommend`: Ask the engine for recommendations
//! - `stats`: Show the distribution of interaction scores
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! resonance init-db
//! resonance import catalog.json
//! resonance record 1 42 play --listen-time 180
//! resonance recommend --user 1 --strategy collaborative --limit 5
//! resonance recommend --strategy similar-tracks --seed-track 42 --json
//! ```

use crate::models::{ArtistId, GenreId, InteractionType, RecommendationRequest, Strategy, TrackId, UserId};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "resonance")]
#[command(about = "Resonance: explainable track recommendations from listening behavior")]
#[command(version)]
pub struct Args {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "RESONANCE_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// Engine tuning file in JSON (optional)
    #[arg(long, global = true, env = "RESONANCE_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty database
    ///
    /// Fails if the database already exists unless --force is given.
    InitDb {
        /// Delete and recreate an existing database
        #[arg(long)]
        force: bool,
    },

    /// Import tracks from a JSON catalog file
    ///
    /// The file holds an array of tracks, each with a title and optional
    /// artists, genres, duration_secs, play_count, is_active and created_at.
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,
    },

    /// Register a listener and print its id
    AddUser { handle: String },

    /// Record one behavioral event for a (user, track) pair
    ///
    /// The interaction score is recomputed from the cumulative counters.
    Record {
        user: UserId,
        track: TrackId,
        /// play, skip, like, unlike or share
        kind: InteractionType,
        /// Seconds listened (plays and skips only)
        #[arg(long)]
        listen_time: Option<f64>,
    },

    /// Ask the engine for recommendations
    Recommend(RecommendArgs),

    /// Show the distribution of stored interaction scores
    Stats {
        /// Restrict to one listener
        #[arg(long)]
        user: Option<UserId>,
    },

    /// Generate shell completions
    ///
    /// Usage: resonance completion bash > ~/.local/share/bash-completion/completions/resonance
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecommendArgs {
    /// Listener id (required by content-based, collaborative and hybrid)
    #[arg(long)]
    pub user: Option<UserId>,

    /// content-based, collaborative, hybrid, similar-tracks, genre-based,
    /// artist-based, trending or new-releases
    #[arg(long, default_value = "hybrid")]
    pub strategy: Strategy,

    /// Number of tracks to return (1-100)
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Minimum interaction score for a track to count as liked
    #[arg(long, default_value_t = 2.0)]
    pub min_score: f64,

    /// Also recommend tracks the listener already interacted with
    #[arg(long)]
    pub include_known: bool,

    /// Penalty for consecutive tracks by the same artist (0-1)
    #[arg(long, default_value_t = 0.3)]
    pub diversity: f64,

    #[arg(long)]
    pub seed_track: Option<TrackId>,

    /// May be repeated
    #[arg(long = "seed-artist")]
    pub seed_artists: Vec<ArtistId>,

    /// May be repeated
    #[arg(long = "seed-genre")]
    pub seed_genres: Vec<GenreId>,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
}

impl RecommendArgs {
    #[must_use]
    pub fn to_request(&self) -> RecommendationRequest {
        RecommendationRequest {
            user_id: self.user,
            strategy: self.strategy,
            limit: self.limit,
            min_interaction_score: self.min_score,
            include_known_tracks: self.include_known,
            diversity_factor: self.diversity,
            seed_track_id: self.seed_track,
            seed_artist_ids: self.seed_artists.clone(),
            seed_genre_ids: self.seed_genres.clone(),
        }
    }
}
