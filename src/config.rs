//! # Configuration Module
//!
//! Data directory resolution and engine tuning parameters.
//!
//! ## Data Storage
//!
//! Resonance stores its database in the platform-standard data directory:
//! - Linux: `~/.local/share/resonance/`
//! - macOS: `~/Library/Application Support/resonance/`
//! - Windows: `%APPDATA%\resonance\`
//!
//! ## Engine Tuning
//!
//! [`EngineConfig`] holds every knob the recommenders read. It is loaded
//! from an optional JSON file; any field left out keeps its default:
//!
//! ```json
//! { "collaborative_weight": 0.7, "content_weight": 0.3, "trending_window_days": 14 }
//! ```

use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "resonance";
const DB_FILE: &str = "resonance.db";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform-appropriate data directory for Resonance,
/// creating it if it does not exist yet.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The resonance subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create Resonance data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Returns the platform-appropriate database file path.
///
/// # Examples
///
/// ```no_run
/// use resonance::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Default location of the engine tuning file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CONFIG_FILE))
}

/// Tunable parameters of the recommendation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of collaborative scores when blending.
    pub collaborative_weight: f64,
    /// Weight of content scores when blending.
    pub content_weight: f64,
    /// Candidates must be strictly more similar than this to count as
    /// similar listeners.
    pub similar_user_threshold: f64,
    pub max_similar_users: usize,
    pub trending_window_days: u32,
    pub new_release_window_days: u32,
    /// Each sub-strategy of a hybrid request is asked for
    /// `limit * hybrid_candidate_multiplier` items before blending.
    pub hybrid_candidate_multiplier: usize,
    /// Two combined scores closer than this count as a near tie for the
    /// diversity pass.
    pub near_tie_epsilon: f64,
    pub default_track_duration_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collaborative_weight: 0.6,
            content_weight: 0.4,
            similar_user_threshold: 0.1,
            max_similar_users: 50,
            trending_window_days: 7,
            new_release_window_days: 30,
            hybrid_candidate_multiplier: 2,
            near_tie_epsilon: 0.05,
            default_track_duration_secs: 180,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed or out-of-range one
    /// is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No engine config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Engine config {} is not valid JSON", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Engine config {} is invalid", path.display()))?;

        debug!("Loaded engine config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("collaborative_weight", self.collaborative_weight),
            ("content_weight", self.content_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("{name} must be a non-negative number, got {weight}");
            }
        }
        if !(0.0..=1.0).contains(&self.similar_user_threshold) {
            bail!(
                "similar_user_threshold must be within [0, 1], got {}",
                self.similar_user_threshold
            );
        }
        if !self.near_tie_epsilon.is_finite() || self.near_tie_epsilon < 0.0 {
            bail!("near_tie_epsilon must be non-negative, got {}", self.near_tie_epsilon);
        }
        if self.max_similar_users == 0 {
            bail!("max_similar_users must be at least 1");
        }
        if self.trending_window_days == 0 || self.new_release_window_days == 0 {
            bail!("trending and new release windows must span at least one day");
        }
        if self.hybrid_candidate_multiplier == 0 {
            bail!("hybrid_candidate_multiplier must be at least 1");
        }
        Ok(())
    }
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Path to the engine tuning file (may not exist)
    pub config_path: PathBuf,
}

impl RuntimeConfig {
    /// Resolves both paths, preferring the given overrides over the
    /// platform data directory.
    pub fn resolve(db_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => get_db_path()?,
        };
        let config_path = match config_path {
            Some(path) => path,
            None => get_config_path()?,
        };
        Ok(Self {
            db_path,
            config_path,
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::load(&self.config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_db_path_structure() {
        let path = get_db_path().expect("Should get valid path");

        assert!(path.is_absolute(), "Database path should be absolute");
        assert_eq!(path.file_name().unwrap(), "resonance.db");

        let parent = path.parent().expect("Should have parent directory");
        assert_eq!(parent.file_name().unwrap(), "resonance");
        assert!(parent.is_dir());
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "collaborative_weight": 0.7, "trending_window_days": 14 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.collaborative_weight, 0.7);
        assert_eq!(config.trending_window_days, 14);
        assert_eq!(config.content_weight, 0.4);
        assert_eq!(config.max_similar_users, 50);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(EngineConfig::load(&path).is_err());

        fs::write(&path, r#"{ "content_weight": -1.0 }"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());

        let zero_window = EngineConfig {
            trending_window_days: 0,
            ..EngineConfig::default()
        };
        assert!(zero_window.validate().is_err());
    }

    #[test]
    fn test_runtime_config_overrides() {
        let runtime = RuntimeConfig::resolve(
            Some(PathBuf::from("/tmp/custom.db")),
            Some(PathBuf::from("/tmp/custom.json")),
        )
        .unwrap();
        assert_eq!(runtime.db_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(runtime.config_path, PathBuf::from("/tmp/custom.json"));
    }
}
