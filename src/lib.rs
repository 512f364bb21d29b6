//! Explainable track recommendations from listening behavior.
//!
//! Core modules:
//! - [`scoring`] - Interaction scoring (behavior to a bounded 0-5 affinity)
//! - [`profile`] - Content feature vectors and cosine similarity
//! - [`content`] - Content-based, seed-track and genre/artist-seeded ranking
//! - [`collaborative`] - User-based collaborative filtering
//! - [`hybrid`] - Weighted blending with a diversity pass
//! - [`fallback`] - Popular, trending and new release lists
//! - [`engine`] - Request validation, dispatch and failure recovery
//!
//! ### Supporting Modules
//!
//! - [`models`] - Tracks, interactions, requests and responses
//! - [`store`] - Data-access traits the engine is built on
//! - [`db`] - SQLite implementation of those traits
//! - [`error`] - Validation and storage errors
//! - [`config`] - Data directory and engine tuning
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use resonance::config::EngineConfig;
//! use resonance::db::{NewTrack, SqliteStore};
//! use resonance::engine::RecommendationEngine;
//! use resonance::models::{InteractionType, RecommendationRequest, Strategy};
//! use resonance::store::Stores;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open(&resonance::config::get_db_path()?)?);
//! let user = store.add_user("alice")?;
//! let track = store.add_track(&NewTrack::new("Teardrop").artists(&["Massive Attack"]).genres(&["trip hop"]))?;
//!
//! let engine = RecommendationEngine::new(Stores::shared(store), EngineConfig::default());
//! engine.record_interaction(user, track, InteractionType::Play, Some(320.0))?;
//! engine.record_interaction(user, track, InteractionType::Like, None)?;
//!
//! let request = RecommendationRequest::for_user(user, Strategy::Hybrid).with_limit(5);
//! for item in engine.get_recommendations(&request)?.recommendations {
//!     println!("{} ({:.2}): {}", item.track.title, item.score, item.reason);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Strategies
//!
//! | Strategy         | Needs                 | Algorithm label                          |
//! |------------------|-----------------------|------------------------------------------|
//! | `CONTENT_BASED`  | user                  | `TF-IDF + Cosine Similarity`             |
//! | `COLLABORATIVE`  | user                  | `User-Based Collaborative Filtering`     |
//! | `HYBRID`         | user                  | `Hybrid (Collaborative + Content-Based)` |
//! | `SIMILAR_TRACKS` | seed track            | `Content Similarity`                     |
//! | `GENRE_BASED`    | seed genres           | `Genre Similarity`                       |
//! | `ARTIST_BASED`   | seed artists          | `Artist Similarity`                      |
//! | `TRENDING`       | nothing               | `Trending (Recent Play Volume)`          |
//! | `NEW_RELEASES`   | nothing               | `Recency-based`                          |
//!
//! Personalized strategies without enough signal answer with the popular
//! list (`Popularity-based`) and set `fallback_used`.
//!
//! ## Error Handling
//!
//! [`engine::RecommendationEngine::get_recommendations`] only ever fails
//! with a validation error. Storage failures are logged and answered with
//! the trending list. Collaborator traits return `anyhow::Result`.

pub mod cli;
pub mod collaborative;
pub mod completion;
pub mod config;
pub mod content;
pub mod db;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod hybrid;
pub mod models;
pub mod profile;
pub mod scoring;
pub mod store;
