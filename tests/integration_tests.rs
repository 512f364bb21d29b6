//! # Integration Tests for Resonance
//!
//! End-to-end tests against real database files: the library API through
//! the engine, concurrent use from several threads, and the CLI binary.

use anyhow::Result;
use resonance::config::EngineConfig;
use resonance::db::{self, SqliteStore};
use resonance::engine::RecommendationEngine;
use resonance::models::{InteractionType, RecommendationRequest, RecommendationResponse, Strategy};
use resonance::store::{InteractionStore, Stores, TrackCatalog};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const CATALOG: &str = r#"[
    { "title": "Paranoid Android", "artists": ["Radiohead"], "genres": ["rock", "alternative"], "duration_secs": 383, "play_count": 120 },
    { "title": "Karma Police", "artists": ["Radiohead"], "genres": ["rock", "alternative"], "duration_secs": 264, "play_count": 95 },
    { "title": "Everlong", "artists": ["Foo Fighters"], "genres": ["rock"], "duration_secs": 250, "play_count": 80 },
    { "title": "Windowlicker", "artists": ["Aphex Twin"], "genres": ["electronic"], "duration_secs": 366, "play_count": 40 },
    { "title": "Teardrop", "artists": ["Massive Attack", "Elizabeth Fraser"], "genres": ["trip hop", "electronic"], "duration_secs": 330, "play_count": 70 },
    { "title": "So What", "artists": ["Miles Davis"], "genres": ["jazz"], "duration_secs": 562, "play_count": 60 },
    { "title": "Retired", "artists": ["Nobody"], "genres": ["rock"], "is_active": false, "play_count": 999 }
]"#;

/// Test helper to create a temporary database with the sample catalog
fn create_test_database() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_resonance.db");
    let catalog_path = temp_dir.path().join("catalog.json");
    std::fs::write(&catalog_path, CATALOG)?;

    let store = db::init_database(&db_path, false)?;
    assert_eq!(store.import_catalog(&catalog_path)?, 7);

    Ok((temp_dir, db_path))
}

fn open_engine(db_path: &Path) -> Result<(Arc<SqliteStore>, RecommendationEngine)> {
    let store = Arc::new(SqliteStore::open(db_path)?);
    let engine = RecommendationEngine::new(Stores::shared(store.clone()), EngineConfig::default());
    Ok((store, engine))
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    #[test]
    fn test_listening_history_drives_recommendations() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        let (store, engine) = open_engine(&db_path)?;

        let alice = store.add_user("alice")?;
        let bob = store.add_user("bob")?;

        // Both love Paranoid Android; bob also loves Everlong.
        for user in [alice, bob] {
            engine.record_interaction(user, 1, InteractionType::Play, Some(383.0))?;
            engine.record_interaction(user, 1, InteractionType::Like, None)?;
        }
        engine.record_interaction(bob, 3, InteractionType::Play, Some(250.0))?;
        engine.record_interaction(bob, 3, InteractionType::Like, None)?;

        let content = engine.get_recommendations(
            &RecommendationRequest::for_user(alice, Strategy::ContentBased).with_limit(3),
        )?;
        assert_eq!(content.algorithm, "TF-IDF + Cosine Similarity");
        assert_eq!(content.recommendations[0].track.title, "Karma Police");
        assert!(content.recommendations.iter().all(|item| item.track.id != 1));

        let collaborative = engine.get_recommendations(
            &RecommendationRequest::for_user(alice, Strategy::Collaborative).with_limit(3),
        )?;
        assert_eq!(collaborative.algorithm, "User-Based Collaborative Filtering");
        assert_eq!(collaborative.recommendations.len(), 1);
        assert_eq!(collaborative.recommendations[0].track.title, "Everlong");

        let hybrid = engine.get_recommendations(
            &RecommendationRequest::for_user(alice, Strategy::Hybrid).with_limit(4),
        )?;
        assert_eq!(hybrid.algorithm, "Hybrid (Collaborative + Content-Based)");
        assert!(hybrid.total_count <= 4);
        assert!(!hybrid.fallback_used);
        assert!(hybrid
            .recommendations
            .iter()
            .all(|item| (0.0..=1.0).contains(&item.confidence)));
        Ok(())
    }

    #[test]
    fn test_inactive_tracks_are_never_recommended() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        let (_store, engine) = open_engine(&db_path)?;

        for strategy in [Strategy::Trending, Strategy::NewReleases] {
            let response = engine.get_recommendations(&RecommendationRequest::new(strategy).with_limit(100))?;
            assert!(response.recommendations.iter().all(|item| item.track.title != "Retired"));
        }

        let mut similar = RecommendationRequest::new(Strategy::SimilarTracks);
        similar.seed_track_id = Some(3);
        let response = engine.get_recommendations(&similar)?;
        assert_eq!(response.total_count, 5);
        assert!(response.recommendations.iter().all(|item| item.track.title != "Retired"));
        Ok(())
    }

    #[test]
    fn test_state_survives_reopening() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        {
            let (store, engine) = open_engine(&db_path)?;
            let user = store.add_user("carol")?;
            engine.record_interaction(user, 6, InteractionType::Play, Some(562.0))?;
        }

        let store = SqliteStore::open(&db_path)?;
        let carol = store.user_id("carol")?.expect("carol was persisted");
        let interactions = store.qualifying_interactions(carol, 0.0)?;
        assert_eq!(interactions.len(), 1);
        assert!((interactions[0].interaction_score() - 3.0).abs() < 1e-12);
        assert_eq!(store.track(6)?.map(|t| t.play_count), Some(61));

        assert!(db::init_database(&db_path, false).is_err());
        let fresh = db::init_database(&db_path, true)?;
        assert!(fresh.active_tracks()?.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    #[test]
    fn test_concurrent_events_are_not_lost() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        let (store, engine) = open_engine(&db_path)?;
        let user = store.add_user("busy")?;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || -> Result<()> {
                    for _ in 0..10 {
                        engine.record_interaction(user, 2, InteractionType::Play, Some(10.0))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked")?;
        }

        let interaction = store
            .qualifying_interactions(user, 0.0)?
            .into_iter()
            .find(|i| i.track_id == 2)
            .expect("interaction exists");
        assert_eq!(interaction.play_count, 80);
        assert!((interaction.total_listen_time - 800.0).abs() < 1e-9);
        assert_eq!(store.track(2)?.map(|t| t.play_count), Some(95 + 80));
        Ok(())
    }

    #[test]
    fn test_parallel_requests_agree() -> Result<()> {
        let (_temp_dir, db_path) = create_test_database()?;
        let (store, engine) = open_engine(&db_path)?;
        let user = store.add_user("dave")?;
        engine.record_interaction(user, 4, InteractionType::Play, Some(366.0))?;
        engine.record_interaction(user, 4, InteractionType::Share, None)?;

        let request = RecommendationRequest::for_user(user, Strategy::ContentBased).with_limit(5);
        let expected = engine.get_recommendations(&request)?;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = engine.clone();
                let request = request.clone();
                thread::spawn(move || engine.get_recommendations(&request))
            })
            .collect();
        for handle in handles {
            let response = handle.join().expect("worker panicked")?;
            assert_eq!(response, expected);
        }
        assert_eq!(expected.recommendations[0].track.title, "Teardrop");
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn resonance(db_path: &Path, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_resonance"))
            .arg("--db")
            .arg(db_path)
            .arg("--config")
            .arg(db_path.with_extension("json"))
            .args(args)
            .output()
            .expect("Failed to run resonance")
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_resonance"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success());
        assert!(stdout.contains("resonance"));
        assert!(stdout.contains("recommend"));
        assert!(stdout.contains("record"));
    }

    #[test]
    fn test_completion_generation() {
        let output = Command::new(env!("CARGO_BIN_EXE_resonance"))
            .args(["completion", "bash"])
            .output()
            .expect("Failed to run completion command");
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("resonance"));
    }

    #[test]
    fn test_cli_workflow() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("cli.db");
        let catalog_path = temp_dir.path().join("catalog.json");
        std::fs::write(&catalog_path, CATALOG)?;

        assert!(resonance(&db_path, &["init-db"]).status.success());
        assert!(!resonance(&db_path, &["init-db"]).status.success());

        let import = resonance(&db_path, &["import", catalog_path.to_str().unwrap_or_default()]);
        assert!(import.status.success());
        assert!(String::from_utf8_lossy(&import.stdout).contains("Imported 7 tracks"));

        assert!(resonance(&db_path, &["add-user", "erin"]).status.success());
        let record = resonance(&db_path, &["record", "1", "5", "play", "--listen-time", "330"]);
        assert!(record.status.success(), "{}", String::from_utf8_lossy(&record.stderr));

        let output = resonance(&db_path, &["recommend", "--user", "1", "--strategy", "content-based", "--json"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let response: RecommendationResponse = serde_json::from_slice(&output.stdout)?;
        assert_eq!(response.strategy, Strategy::ContentBased);
        assert_eq!(response.recommendations[0].track.title, "Windowlicker");

        let invalid = resonance(&db_path, &["recommend", "--strategy", "similar-tracks"]);
        assert!(!invalid.status.success());
        assert!(String::from_utf8_lossy(&invalid.stderr).contains("seed_track_id"));

        let stats = resonance(&db_path, &["stats"]);
        assert!(String::from_utf8_lossy(&stats.stdout).contains("Interactions: 1"));
        Ok(())
    }
}
