//! # Play Ledger
//!
//! Durable, deduplicating store of every play the tracker has accepted. The
//! ledger lives in a single SQLite database; every [`Ledger::try_insert`] runs
//! in its own immediate transaction so a play is written at most once, even
//! when the process dies between an insert and the cursor update that
//! normally follows it.
//!
//! ## Identity
//!
//! Two observations describe the same play when they share a track id and
//!
//! - their timestamps are within the match tolerance, or
//! - a `RecentlyPlayed` observation falls within the provisional window
//!   (`max(poll interval, track duration)` plus the tolerance) of a
//!   provisional `CurrentlyPlaying` row, or
//! - a `CurrentlyPlaying` observation finds a row recorded since the play it
//!   observes started. A play that started after the previous row is a new
//!   listen, even when it follows right after.
//!
//! A provisional row is superseded in place once the authoritative
//! `RecentlyPlayed` observation for the same play arrives; rows are never
//! deleted.
//!
//! The ledger also caches artist details (image, genres) looked up once per
//! artist for the spreadsheet export.

mod entries;
mod error;
pub mod schema;

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use crate::model::{ArtistProfile, LedgerEntry, PlayEvent, PlaySource};

pub use entries::Entries;
pub use error::LedgerError;

const PLAY_COLUMNS: &str = "id, track_id, track_name, artist_name, album_name, played_at, \
     duration_ms, source, album_id, artist_ids, track_url, image_url";

/// Outcome of [`Ledger::try_insert`]; every variant carries the row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// A new row was written.
    Accepted(i64),
    /// The play is already recorded by this row.
    DuplicateOf(i64),
    /// A provisional row was upgraded in place with the authoritative timestamp.
    Superseded(i64),
}

impl InsertResult {
    pub fn entry_id(&self) -> i64 {
        match *self {
            InsertResult::Accepted(id)
            | InsertResult::DuplicateOf(id)
            | InsertResult::Superseded(id) => id,
        }
    }

    /// Whether the ledger changed.
    pub fn is_write(&self) -> bool {
        !matches!(self, InsertResult::DuplicateOf(_))
    }
}

/// Tolerances used to decide whether two observations are the same play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub tolerance: Duration,
    pub poll_interval: Duration,
}

impl MatchWindow {
    pub fn new(tolerance: Duration, poll_interval: Duration) -> Self {
        Self {
            tolerance,
            poll_interval,
        }
    }

    fn tolerance_ms(&self) -> i64 {
        duration_to_ms(self.tolerance)
    }

    fn provisional_ms(&self, duration_ms: u64) -> i64 {
        let span = duration_to_ms(self.poll_interval).max(u64_to_i64(duration_ms));
        span.saturating_add(self.tolerance_ms())
    }
}

impl Default for MatchWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}

#[derive(Debug)]
struct Candidate {
    id: i64,
    played_at: i64,
    source: PlaySource,
}

pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Opens (or creates) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Records `event` unless the ledger already holds the same play.
    ///
    /// `RecentlyPlayed` events are checked against authoritative rows within
    /// the tolerance first (`DuplicateOf`), then against the nearest
    /// provisional row within the provisional window (`Superseded`).
    /// `CurrentlyPlaying` events are duplicates of a row for the track that
    /// was recorded since the observed play started (`played_at` minus the
    /// playback position, or one poll interval back when the position is
    /// unknown).
    pub fn try_insert(
        &self,
        event: &PlayEvent,
        window: &MatchWindow,
    ) -> Result<InsertResult, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let at = event.played_at.timestamp_millis();
        let tolerance = window.tolerance_ms();
        let provisional = window.provisional_ms(event.duration_ms);
        let candidates = find_candidates(
            &tx,
            &event.track_id,
            at.saturating_sub(provisional),
            at.saturating_add(provisional),
        )?;

        let outcome = match event.source {
            PlaySource::RecentlyPlayed => {
                let duplicate = nearest(
                    candidates.iter().filter(|c| {
                        c.source.is_authoritative() && (c.played_at - at).abs() <= tolerance
                    }),
                    at,
                );
                let provisional_row = nearest(
                    candidates.iter().filter(|c| !c.source.is_authoritative()),
                    at,
                );

                match (duplicate, provisional_row) {
                    (Some(existing), _) => InsertResult::DuplicateOf(existing.id),
                    (None, Some(existing)) => {
                        supersede(&tx, existing.id, event)?;
                        InsertResult::Superseded(existing.id)
                    }
                    (None, None) => InsertResult::Accepted(insert(&tx, event)?),
                }
            }
            PlaySource::CurrentlyPlaying => {
                // only rows observed since this play started can be the same play
                let started = match event.progress_ms {
                    Some(progress) => at.saturating_sub(u64_to_i64(progress)),
                    None => at.saturating_sub(duration_to_ms(window.poll_interval)),
                };
                let earliest = started.saturating_sub(tolerance);
                let latest = at.saturating_add(tolerance);
                let existing = nearest(
                    candidates
                        .iter()
                        .filter(|c| c.played_at >= earliest && c.played_at <= latest),
                    at,
                );

                match existing {
                    Some(existing) => InsertResult::DuplicateOf(existing.id),
                    None => InsertResult::Accepted(insert(&tx, event)?),
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Latest authoritative `played_at`, used to resume the poll cursor.
    ///
    /// Provisional rows are stamped with the poll time and would move the
    /// cursor past recently played records that have not been fetched yet, so
    /// they are ignored.
    pub fn max_played_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let conn = self.lock()?;
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(played_at) FROM plays WHERE source = ?1",
            params![PlaySource::RecentlyPlayed.as_str()],
            |row| row.get(0),
        )?;
        max.map(|ms| millis_to_datetime(0, ms)).transpose()
    }

    /// All entries ordered by `played_at` ascending. Each call starts over.
    pub fn entries(&self) -> Entries<'_> {
        Entries::new(self)
    }

    pub fn len(&self) -> Result<u64, LedgerError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM plays", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Number of rows still waiting for an authoritative timestamp.
    pub fn provisional_count(&self) -> Result<u64, LedgerError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plays WHERE source = ?1",
            params![PlaySource::CurrentlyPlaying.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAY_COLUMNS} FROM plays ORDER BY played_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![u64_to_i64(limit as u64)], RawRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_entry).collect()
    }

    pub fn get(&self, id: i64) -> Result<Option<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {PLAY_COLUMNS} FROM plays WHERE id = ?1"),
                params![id],
                RawRow::read,
            )
            .optional()?;
        row.map(RawRow::into_entry).transpose()
    }

    /// Stores or replaces the cached details of an artist.
    pub fn upsert_artist(
        &self,
        profile: &ArtistProfile,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let genres = serde_json::to_string(&profile.genres).map_err(|e| LedgerError::CorruptArtist {
            artist_id: profile.artist_id.clone(),
            reason: e.to_string(),
        })?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO artists (artist_id, name, image_url, genres, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (artist_id) DO UPDATE SET
                 name = excluded.name,
                 image_url = excluded.image_url,
                 genres = excluded.genres,
                 fetched_at = excluded.fetched_at",
            params![
                profile.artist_id,
                profile.name,
                profile.image_url,
                genres,
                fetched_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn artist(&self, artist_id: &str) -> Result<Option<ArtistProfile>, LedgerError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT artist_id, name, image_url, genres FROM artists WHERE artist_id = ?1",
                params![artist_id],
                read_artist,
            )
            .optional()?;
        row.map(into_profile).transpose()
    }

    /// Every cached artist, ordered by name.
    pub fn artists(&self) -> Result<Vec<ArtistProfile>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT artist_id, name, image_url, genres FROM artists ORDER BY name, artist_id",
        )?;
        let rows = stmt
            .query_map([], read_artist)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_profile).collect()
    }

    /// Primary artists of recorded plays that have no cached details yet,
    /// most recently played first.
    pub fn missing_artist_ids(&self, limit: usize) -> Result<Vec<String>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT p.primary_artist_id FROM plays p
             LEFT JOIN artists a ON a.artist_id = p.primary_artist_id
             WHERE p.primary_artist_id != '' AND a.artist_id IS NULL
             GROUP BY p.primary_artist_id
             ORDER BY MAX(p.played_at) DESC
             LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![u64_to_i64(limit as u64)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// One keyset page of entries strictly after `after` (`played_at`, `id`).
    fn page(&self, after: Option<(i64, i64)>, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        let (after_at, after_id) = after.unwrap_or((i64::MIN, i64::MIN));
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAY_COLUMNS}
             FROM plays
             WHERE played_at > ?1 OR (played_at = ?1 AND id > ?2)
             ORDER BY played_at ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![after_at, after_id, u64_to_i64(limit as u64)], RawRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_entry).collect()
    }
}

fn find_candidates(
    tx: &Transaction<'_>,
    track_id: &str,
    from: i64,
    to: i64,
) -> Result<Vec<Candidate>, LedgerError> {
    let mut stmt = tx.prepare(
        "SELECT id, played_at, source FROM plays
         WHERE track_id = ?1 AND played_at BETWEEN ?2 AND ?3",
    )?;
    let rows = stmt
        .query_map(params![track_id, from, to], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, played_at, source)| {
            let source = PlaySource::parse(&source).ok_or_else(|| LedgerError::CorruptRow {
                id,
                reason: format!("unknown source '{source}'"),
            })?;
            Ok(Candidate {
                id,
                played_at,
                source,
            })
        })
        .collect()
}

fn nearest<'a>(candidates: impl Iterator<Item = &'a Candidate>, at: i64) -> Option<&'a Candidate> {
    candidates.min_by_key(|c| ((c.played_at - at).abs(), c.id))
}

fn insert(tx: &Transaction<'_>, event: &PlayEvent) -> Result<i64, LedgerError> {
    tx.execute(
        "INSERT INTO plays (track_id, track_name, artist_name, album_name, played_at, duration_ms,
                            source, album_id, artist_ids, primary_artist_id, track_url, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.track_id,
            event.track_name,
            event.artist_name,
            event.album_name,
            event.played_at.timestamp_millis(),
            u64_to_i64(event.duration_ms),
            event.source.as_str(),
            event.album_id,
            event.artist_ids.join(","),
            event.primary_artist_id().unwrap_or_default(),
            event.track_url,
            event.image_url,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn supersede(tx: &Transaction<'_>, id: i64, event: &PlayEvent) -> Result<(), LedgerError> {
    tx.execute(
        "UPDATE plays SET played_at = ?1, source = ?2 WHERE id = ?3",
        params![event.played_at.timestamp_millis(), event.source.as_str(), id],
    )?;
    Ok(())
}

struct RawRow {
    id: i64,
    track_id: String,
    track_name: String,
    artist_name: String,
    album_name: String,
    played_at: i64,
    duration_ms: i64,
    source: String,
    album_id: String,
    artist_ids: String,
    track_url: String,
    image_url: String,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            track_id: row.get(1)?,
            track_name: row.get(2)?,
            artist_name: row.get(3)?,
            album_name: row.get(4)?,
            played_at: row.get(5)?,
            duration_ms: row.get(6)?,
            source: row.get(7)?,
            album_id: row.get(8)?,
            artist_ids: row.get(9)?,
            track_url: row.get(10)?,
            image_url: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<LedgerEntry, LedgerError> {
        let source = PlaySource::parse(&self.source).ok_or_else(|| LedgerError::CorruptRow {
            id: self.id,
            reason: format!("unknown source '{}'", self.source),
        })?;
        Ok(LedgerEntry {
            id: self.id,
            event: PlayEvent {
                track_id: self.track_id,
                track_name: self.track_name,
                artist_name: self.artist_name,
                album_name: self.album_name,
                played_at: millis_to_datetime(self.id, self.played_at)?,
                duration_ms: self.duration_ms.max(0) as u64,
                source,
                album_id: self.album_id,
                artist_ids: self
                    .artist_ids
                    .split(',')
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect(),
                track_url: self.track_url,
                image_url: self.image_url,
                progress_ms: None,
            },
        })
    }
}

type ArtistRow = (String, String, String, String);

fn read_artist(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtistRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_profile((artist_id, name, image_url, genres): ArtistRow) -> Result<ArtistProfile, LedgerError> {
    let genres = serde_json::from_str(&genres).map_err(|e| LedgerError::CorruptArtist {
        artist_id: artist_id.clone(),
        reason: e.to_string(),
    })?;
    Ok(ArtistProfile {
        artist_id,
        name,
        image_url,
        genres,
    })
}

fn millis_to_datetime(id: i64, ms: i64) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| LedgerError::CorruptRow {
        id,
        reason: format!("timestamp {ms} out of range"),
    })
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
