//! # Resonance - Track Recommendations
//!
//! Command-line front end over the SQLite store and the recommendation
//! engine.
//!
//! ## Usage
//!
//! ```bash
//! # Create and fill a database
//! resonance init-db
//! resonance import catalog.json
//! resonance add-user alice
//!
//! # Feed behavior
//! resonance record 1 42 play --listen-time 200
//! resonance record 1 42 like
//!
//! # Ask for recommendations
//! resonance recommend --user 1 --strategy hybrid --limit 5
//! resonance recommend --strategy trending
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::{debug, info};
use resonance::cli::{self, Command};
use resonance::completion;
use resonance::config::RuntimeConfig;
use resonance::db::{self, SqliteStore};
use resonance::engine::RecommendationEngine;
use resonance::models::RecommendationResponse;
use resonance::scoring::statistics::analyze_score_distribution;
use resonance::store::Stores;
use std::sync::Arc;

fn open_engine(runtime: &RuntimeConfig) -> Result<RecommendationEngine> {
    let store = Arc::new(SqliteStore::open(&runtime.db_path)?);
    let config = runtime.engine_config()?;
    debug!("Engine configuration: {config:?}");
    Ok(RecommendationEngine::new(Stores::shared(store), config))
}

fn print_response(response: &RecommendationResponse) {
    println!(
        "{} via {}{}",
        response.strategy,
        response.algorithm,
        if response.fallback_used { " (fallback)" } else { "" }
    );

    for (rank, item) in response.recommendations.iter().enumerate() {
        println!(
            "{:>3}. {} - {}  score {:.3}  confidence {:.0}%  ({})",
            rank + 1,
            item.track.primary_artist().unwrap_or("Unknown"),
            item.track.title,
            item.score,
            item.confidence * 100.0,
            item.reason
        );
    }

    println!(
        "{} tracks, average confidence {:.0}%",
        response.total_count,
        response.average_confidence * 100.0
    );
}

/// Main entry point for the Resonance application.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug resonance recommend --user 1` - Enable debug logging
/// - `RUST_LOG=resonance::collaborative=trace resonance recommend --user 1` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let cli::Args { db, config, command } = cli::Args::parse();
    let resolve = || -> Result<RuntimeConfig> {
        let runtime = RuntimeConfig::resolve(db.clone(), config.clone())?;
        debug!("Using database {}", runtime.db_path.display());
        Ok(runtime)
    };

    match command {
        Command::InitDb { force } => {
            let runtime = resolve()?;
            info!("Initializing database at {}", runtime.db_path.display());
            db::init_database(&runtime.db_path, force)?;
            println!("Initialized database at {}", runtime.db_path.display());
        }
        Command::Import { path } => {
            let runtime = resolve()?;
            let store = SqliteStore::open(&runtime.db_path)?;
            let imported = store.import_catalog(&path)?;
            println!("Imported {imported} tracks from {}", path.display());
        }
        Command::AddUser { handle } => {
            let runtime = resolve()?;
            let store = SqliteStore::open(&runtime.db_path)?;
            let user_id = store.add_user(&handle)?;
            println!("Created user {handle} with id {user_id}");
        }
        Command::Record {
            user,
            track,
            kind,
            listen_time,
        } => {
            let engine = open_engine(&resolve()?)?;
            let interaction = engine.record_interaction(user, track, kind, listen_time)?;
            println!(
                "Recorded {kind}: plays {}, skips {}, listened {:.0}s, liked {}, shared {}, score {:.2}",
                interaction.play_count,
                interaction.skip_count,
                interaction.total_listen_time,
                interaction.is_liked,
                interaction.is_shared,
                interaction.interaction_score()
            );
        }
        Command::Recommend(recommend) => {
            let engine = open_engine(&resolve()?)?;
            let response = engine.get_recommendations(&recommend.to_request())?;
            if recommend.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Command::Stats { user } => {
            let runtime = resolve()?;
            let store = SqliteStore::open(&runtime.db_path)?;
            let stats = analyze_score_distribution(&store.interaction_scores(user)?);
            println!("Interactions: {}", stats.count);
            println!("Mean score:   {:.3}", stats.mean);
            println!("Std dev:      {:.3}", stats.std_deviation);
            println!("Min / max:    {:.3} / {:.3}", stats.min, stats.max);
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
    }

    Ok(())
}
