//! SQLite-backed implementation of the storage seams.
//!
//! One connection guarded by a mutex: reads take the lock for a single
//! query, and interaction updates run their read-modify-write inside one
//! transaction under the same lock, so concurrent events for one
//! (user, track) pair are never lost.

use crate::models::{Artist, ArtistId, Genre, GenreId, Interaction, Track, TrackId, UserId};
use crate::store::{InteractionStore, TrackCatalog, UserDirectory};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, trace};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Upper bound on ids bound into a single `IN (...)` clause.
const MAX_BOUND_IDS: usize = 500;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id      INTEGER PRIMARY KEY,
        handle  TEXT    NOT NULL UNIQUE,
        created INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artists (
        id   INTEGER PRIMARY KEY,
        name TEXT    NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS genres (
        id   INTEGER PRIMARY KEY,
        name TEXT    NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS tracks (
        id            INTEGER PRIMARY KEY,
        title         TEXT    NOT NULL,
        duration_secs INTEGER,
        play_count    INTEGER NOT NULL DEFAULT 0,
        is_active     INTEGER NOT NULL DEFAULT 1,
        created_at    INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS track_artists (
        track_id  INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
        artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
        position  INTEGER NOT NULL,
        PRIMARY KEY (track_id, artist_id)
    );
    CREATE TABLE IF NOT EXISTS track_genres (
        track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
        genre_id INTEGER NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
        PRIMARY KEY (track_id, genre_id)
    );
    CREATE TABLE IF NOT EXISTS interactions (
        user_id             INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        track_id            INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
        play_count          INTEGER NOT NULL DEFAULT 0,
        total_listen_time   REAL    NOT NULL DEFAULT 0,
        skip_count          INTEGER NOT NULL DEFAULT 0,
        is_liked            INTEGER NOT NULL DEFAULT 0,
        is_shared           INTEGER NOT NULL DEFAULT 0,
        interaction_score   REAL    NOT NULL DEFAULT 0,
        last_interaction_at INTEGER,
        UNIQUE (user_id, track_id)
    );
    CREATE TABLE IF NOT EXISTS play_events (
        id        INTEGER PRIMARY KEY,
        user_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        track_id  INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
        played_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id);
    CREATE INDEX IF NOT EXISTS idx_interactions_track ON interactions(track_id);
    CREATE INDEX IF NOT EXISTS idx_play_events_played_at ON play_events(played_at);
    CREATE INDEX IF NOT EXISTS idx_tracks_play_count ON tracks(play_count);
";

const INTERACTION_COLUMNS: &str = "user_id, track_id, play_count, total_listen_time, skip_count, \
     is_liked, is_shared, interaction_score, last_interaction_at";

const TRACK_COLUMNS: &str = "id, title, duration_secs, play_count, is_active, created_at";

/// A track to be inserted into the catalog, with artists and genres by name.
///
/// This is also the shape of one entry in an imported catalog JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrack {
    pub title: String,
    /// Ordered; the first artist is the primary one.
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Defaults to the insertion time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_active() -> bool {
    true
}

impl NewTrack {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artists: Vec::new(),
            genres: Vec::new(),
            duration_secs: None,
            play_count: 0,
            is_active: true,
            created_at: None,
        }
    }

    #[must_use]
    pub fn artists(mut self, names: &[&str]) -> Self {
        self.artists = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    #[must_use]
    pub fn genres(mut self, names: &[&str]) -> Self {
        self.genres = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    #[must_use]
    pub fn duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn plays(mut self, play_count: u64) -> Self {
        self.play_count = play_count;
        self
    }

    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Creates a fresh database at `db_path`.
///
/// Fails if one already exists, unless `force` is set, in which case the
/// old file is removed first.
pub fn init_database(db_path: &Path, force: bool) -> Result<SqliteStore> {
    if db_path.exists() {
        if !force {
            bail!(
                "Database already exists at {}. Use --force to overwrite it.",
                db_path.display()
            );
        }
        info!("Removing existing database at {}", db_path.display());
        fs::remove_file(db_path)
            .with_context(|| format!("Failed to remove old database {}", db_path.display()))?;
    }

    SqliteStore::open(db_path)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database file and ensures the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        debug!("Opened database {}", db_path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }

    pub fn add_user(&self, handle: &str) -> Result<UserId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (handle, created) VALUES (?1, ?2)",
            params![handle, Utc::now().timestamp()],
        )
        .with_context(|| format!("Failed to create user `{handle}`"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn user_id(&self, handle: &str) -> Result<Option<UserId>> {
        let conn = self.conn()?;
        conn.query_row("SELECT id FROM users WHERE handle = ?1", [handle], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up user `{handle}`"))
    }

    pub fn add_artist(&self, name: &str) -> Result<ArtistId> {
        let conn = self.conn()?;
        upsert_named(&conn, "artists", name)
    }

    pub fn add_genre(&self, name: &str) -> Result<GenreId> {
        let conn = self.conn()?;
        upsert_named(&conn, "genres", name)
    }

    pub fn add_track(&self, track: &NewTrack) -> Result<TrackId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = insert_track(&tx, track)?;
        tx.commit().context("Committing track insert failed")?;
        Ok(id)
    }

    /// Imports a JSON array of [`NewTrack`]s in one transaction.
    /// Returns the number of tracks inserted.
    pub fn import_catalog(&self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let tracks: Vec<NewTrack> = serde_json::from_str(&raw)
            .with_context(|| format!("Catalog file {} is not valid JSON", path.display()))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for track in &tracks {
            insert_track(&tx, track)?;
        }
        tx.commit().context("Committing catalog import failed")?;

        info!("Imported {} tracks from {}", tracks.len(), path.display());
        Ok(tracks.len())
    }

    /// Retires a track from, or returns it to, the recommendable catalog.
    pub fn set_track_active(&self, track_id: TrackId, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tracks SET is_active = ?1 WHERE id = ?2",
            params![active, track_id],
        )?;
        if changed == 0 {
            bail!("Track {track_id} not found");
        }
        Ok(())
    }

    /// Stored interaction scores, for one user or for everybody.
    pub fn interaction_scores(&self, user_id: Option<UserId>) -> Result<Vec<f64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT interaction_score FROM interactions WHERE ?1 IS NULL OR user_id = ?1",
        )?;
        let scores = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()
            .context("Cannot query interaction scores")?;
        Ok(scores)
    }
}

fn upsert_named(conn: &Connection, table: &str, name: &str) -> Result<i64> {
    let name = name.trim();
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)"),
        [name],
    )
    .with_context(|| format!("Invalid SQL when INSERTing `{name}` INTO {table}"))?;
    conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = ?1"),
        [name],
        |row| row.get(0),
    )
    .with_context(|| format!("Failed to read back {table} entry `{name}`"))
}

fn insert_track(conn: &Connection, track: &NewTrack) -> Result<TrackId> {
    let created_at = track.created_at.unwrap_or_else(Utc::now);
    let play_count = i64::try_from(track.play_count).unwrap_or(i64::MAX);

    conn.execute(
        "INSERT INTO tracks (title, duration_secs, play_count, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            track.title,
            track.duration_secs,
            play_count,
            track.is_active,
            created_at.timestamp()
        ],
    )
    .with_context(|| format!("Invalid SQL when INSERTing track: {track:?}"))?;
    let track_id = conn.last_insert_rowid();

    for (position, artist) in track.artists.iter().enumerate() {
        let artist_id = upsert_named(conn, "artists", artist)?;
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        conn.execute(
            "INSERT OR IGNORE INTO track_artists (track_id, artist_id, position) VALUES (?1, ?2, ?3)",
            params![track_id, artist_id, position],
        )?;
    }
    for genre in &track.genres {
        let genre_id = upsert_named(conn, "genres", genre)?;
        conn.execute(
            "INSERT OR IGNORE INTO track_genres (track_id, genre_id) VALUES (?1, ?2)",
            params![track_id, genre_id],
        )?;
    }

    trace!("Inserted track {track_id} `{}`", track.title);
    Ok(track_id)
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn row_to_track(row: &Row<'_>) -> rusqlite::Result<Track> {
    let play_count: i64 = row.get(3)?;
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artists: Vec::new(),
        genres: Vec::new(),
        duration_secs: row.get(2)?,
        play_count: u64::try_from(play_count).unwrap_or(0),
        is_active: row.get(4)?,
        created_at: timestamp_to_datetime(row.get(5)?),
    })
}

fn row_to_interaction(row: &Row<'_>) -> rusqlite::Result<Interaction> {
    let last: Option<i64> = row.get(8)?;
    Ok(Interaction {
        user_id: row.get(0)?,
        track_id: row.get(1)?,
        play_count: row.get(2)?,
        total_listen_time: row.get(3)?,
        skip_count: row.get(4)?,
        is_liked: row.get(5)?,
        is_shared: row.get(6)?,
        interaction_score: row.get(7)?,
        last_interaction_at: last.map(timestamp_to_datetime),
    })
}

/// Runs a track query and resolves artist/genre associations for the result.
fn query_tracks<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Track>> {
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("Invalid SQL statement: {sql}"))?;
    let mut tracks = stmt
        .query_map(params, row_to_track)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Cannot query tracks")?;
    attach_associations(conn, &mut tracks)?;
    Ok(tracks)
}

fn attach_associations(conn: &Connection, tracks: &mut [Track]) -> Result<()> {
    let ids: Vec<TrackId> = tracks.iter().map(|track| track.id).collect();
    let mut artists: HashMap<TrackId, Vec<Artist>> = HashMap::new();
    let mut genres: HashMap<TrackId, Vec<Genre>> = HashMap::new();

    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let marks = placeholders(chunk.len());

        let mut stmt = conn.prepare(&format!(
            "SELECT ta.track_id, a.id, a.name FROM track_artists ta
             JOIN artists a ON a.id = ta.artist_id
             WHERE ta.track_id IN ({marks}) ORDER BY ta.track_id, ta.position"
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, TrackId>(0)?, Artist { id: row.get(1)?, name: row.get(2)? }))
        })?;
        for row in rows {
            let (track_id, artist) = row.context("Queried artist row failed")?;
            artists.entry(track_id).or_default().push(artist);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT tg.track_id, g.id, g.name FROM track_genres tg
             JOIN genres g ON g.id = tg.genre_id
             WHERE tg.track_id IN ({marks}) ORDER BY tg.track_id, g.id"
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, TrackId>(0)?, Genre { id: row.get(1)?, name: row.get(2)? }))
        })?;
        for row in rows {
            let (track_id, genre) = row.context("Queried genre row failed")?;
            genres.entry(track_id).or_default().push(genre);
        }
    }

    for track in tracks.iter_mut() {
        track.artists = artists.remove(&track.id).unwrap_or_default();
        track.genres = genres.remove(&track.id).unwrap_or_default();
    }
    Ok(())
}

fn names_by_id(conn: &Connection, table: &str, ids: &[i64]) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let mut stmt = conn.prepare(&format!(
            "SELECT name FROM {table} WHERE id IN ({}) ORDER BY id",
            placeholders(chunk.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk), |row| row.get::<_, String>(0))?;
        for name in rows {
            names.push(name.with_context(|| format!("Cannot read {table} name"))?);
        }
    }
    Ok(names)
}

impl TrackCatalog for SqliteStore {
    fn track(&self, track_id: TrackId) -> Result<Option<Track>> {
        let conn = self.conn()?;
        let tracks = query_tracks(
            &conn,
            &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"),
            [track_id],
        )?;
        Ok(tracks.into_iter().next())
    }

    fn tracks(&self, track_ids: &[TrackId]) -> Result<Vec<Track>> {
        let conn = self.conn()?;
        let mut tracks = Vec::with_capacity(track_ids.len());
        for chunk in track_ids.chunks(MAX_BOUND_IDS) {
            tracks.extend(query_tracks(
                &conn,
                &format!(
                    "SELECT {TRACK_COLUMNS} FROM tracks WHERE id IN ({})",
                    placeholders(chunk.len())
                ),
                params_from_iter(chunk),
            )?);
        }
        tracks.sort_by_key(|track| track.id);
        Ok(tracks)
    }

    fn active_tracks(&self) -> Result<Vec<Track>> {
        let conn = self.conn()?;
        query_tracks(
            &conn,
            &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE is_active = 1 ORDER BY id"),
            [],
        )
    }

    fn top_tracks_by_play_count(&self, limit: usize) -> Result<Vec<Track>> {
        let conn = self.conn()?;
        query_tracks(
            &conn,
            &format!(
                "SELECT {TRACK_COLUMNS} FROM tracks WHERE is_active = 1
                 ORDER BY play_count DESC, id ASC LIMIT ?1"
            ),
            [i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    fn tracks_created_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Track>> {
        let conn = self.conn()?;
        query_tracks(
            &conn,
            &format!(
                "SELECT {TRACK_COLUMNS} FROM tracks WHERE is_active = 1 AND created_at >= ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ),
            params![since.timestamp(), i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    fn genre_names(&self, genre_ids: &[GenreId]) -> Result<Vec<String>> {
        let conn = self.conn()?;
        names_by_id(&conn, "genres", genre_ids)
    }

    fn artist_names(&self, artist_ids: &[ArtistId]) -> Result<Vec<String>> {
        let conn = self.conn()?;
        names_by_id(&conn, "artists", artist_ids)
    }
}

impl InteractionStore for SqliteStore {
    fn qualifying_interactions(&self, user_id: UserId, min_score: f64) -> Result<Vec<Interaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interactions
             WHERE user_id = ?1 AND interaction_score >= ?2 ORDER BY track_id"
        ))?;
        let interactions = stmt
            .query_map(params![user_id, min_score], row_to_interaction)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Cannot query interactions of user {user_id}"))?;
        Ok(interactions)
    }

    fn known_track_ids(&self, user_id: UserId) -> Result<HashSet<TrackId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT track_id FROM interactions WHERE user_id = ?1")?;
        let ids = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<TrackId>>>()
            .with_context(|| format!("Cannot query known tracks of user {user_id}"))?;
        Ok(ids)
    }

    fn users_sharing_tracks(
        &self,
        track_ids: &[TrackId],
        min_score: f64,
        exclude: UserId,
    ) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        let mut users = HashSet::new();
        for chunk in track_ids.chunks(MAX_BOUND_IDS) {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT user_id FROM interactions
                 WHERE interaction_score >= ? AND user_id != ? AND track_id IN ({})",
                placeholders(chunk.len())
            ))?;
            let bound = [Value::from(min_score), Value::from(exclude)]
                .into_iter()
                .chain(chunk.iter().map(|&id| Value::from(id)));
            let rows = stmt.query_map(params_from_iter(bound), |row| row.get::<_, UserId>(0))?;
            for user in rows {
                users.insert(user.context("Cannot read candidate user")?);
            }
        }
        let mut users: Vec<UserId> = users.into_iter().collect();
        users.sort_unstable();
        Ok(users)
    }

    fn qualifying_interactions_for_users(
        &self,
        user_ids: &[UserId],
        min_score: f64,
    ) -> Result<HashMap<UserId, Vec<Interaction>>> {
        let conn = self.conn()?;
        let mut by_user: HashMap<UserId, Vec<Interaction>> = HashMap::new();
        for chunk in user_ids.chunks(MAX_BOUND_IDS) {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTERACTION_COLUMNS} FROM interactions
                 WHERE interaction_score >= ? AND user_id IN ({}) ORDER BY user_id, track_id",
                placeholders(chunk.len())
            ))?;
            let bound = std::iter::once(Value::from(min_score))
                .chain(chunk.iter().map(|&id| Value::from(id)));
            let rows = stmt.query_map(params_from_iter(bound), row_to_interaction)?;
            for interaction in rows {
                let interaction = interaction.context("Cannot read candidate interaction")?;
                by_user.entry(interaction.user_id).or_default().push(interaction);
            }
        }
        Ok(by_user)
    }

    fn update_interaction(
        &self,
        user_id: UserId,
        track_id: TrackId,
        apply: &mut dyn FnMut(&mut Interaction),
    ) -> Result<Interaction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {INTERACTION_COLUMNS} FROM interactions WHERE user_id = ?1 AND track_id = ?2"
                ),
                params![user_id, track_id],
                row_to_interaction,
            )
            .optional()
            .with_context(|| format!("Cannot load interaction ({user_id}, {track_id})"))?;

        let mut interaction = existing.unwrap_or_else(|| Interaction::new(user_id, track_id));
        apply(&mut interaction);

        tx.execute(
            &format!(
                "INSERT INTO interactions ({INTERACTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (user_id, track_id) DO UPDATE SET
                    play_count = excluded.play_count,
                    total_listen_time = excluded.total_listen_time,
                    skip_count = excluded.skip_count,
                    is_liked = excluded.is_liked,
                    is_shared = excluded.is_shared,
                    interaction_score = excluded.interaction_score,
                    last_interaction_at = excluded.last_interaction_at"
            ),
            params![
                interaction.user_id,
                interaction.track_id,
                interaction.play_count,
                interaction.total_listen_time,
                interaction.skip_count,
                interaction.is_liked,
                interaction.is_shared,
                interaction.interaction_score,
                interaction.last_interaction_at.map(|at| at.timestamp()),
            ],
        )
        .with_context(|| format!("Invalid SQL statement when upserting interaction {interaction:?}"))?;

        tx.commit().context("Committing interaction update failed")?;
        Ok(interaction)
    }

    fn record_track_play(&self, user_id: UserId, track_id: TrackId, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE tracks SET play_count = play_count + 1 WHERE id = ?1",
            [track_id],
        )?;
        tx.execute(
            "INSERT INTO play_events (user_id, track_id, played_at) VALUES (?1, ?2, ?3)",
            params![user_id, track_id, at.timestamp()],
        )
        .with_context(|| format!("Cannot log play of track {track_id}"))?;
        tx.commit().context("Committing play event failed")?;
        Ok(())
    }

    fn recent_play_counts(&self, since: DateTime<Utc>) -> Result<HashMap<TrackId, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT track_id, COUNT(*) FROM play_events WHERE played_at >= ?1 GROUP BY track_id",
        )?;
        let counts = stmt
            .query_map([since.timestamp()], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, TrackId>(0)?, u64::try_from(count).unwrap_or(0)))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()
            .context("Cannot query recent play counts")?;
        Ok(counts)
    }
}

impl UserDirectory for SqliteStore {
    fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Cannot check existence of user {user_id}"))?;
        Ok(found.is_some())
    }
}
