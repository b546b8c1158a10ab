use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which provider endpoint produced an observation.
///
/// The two endpoints differ in timestamp reliability: `RecentlyPlayed`
/// carries the provider's authoritative `played_at`, `CurrentlyPlaying` is
/// stamped with the poll time and is therefore provisional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaySource {
    CurrentlyPlaying,
    RecentlyPlayed,
}

impl PlaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaySource::CurrentlyPlaying => "currently_playing",
            PlaySource::RecentlyPlayed => "recently_played",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "currently_playing" => Some(PlaySource::CurrentlyPlaying),
            "recently_played" => Some(PlaySource::RecentlyPlayed),
            _ => None,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, PlaySource::RecentlyPlayed)
    }
}

impl fmt::Display for PlaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observed instance of a track being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayEvent {
    pub track_id: String,
    pub track_name: String,
    /// All credited artists, joined with `", "`.
    pub artist_name: String,
    pub album_name: String,
    pub played_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub source: PlaySource,
    pub album_id: String,
    /// Credited artist ids in the provider's order; the first one is the
    /// primary artist.
    pub artist_ids: Vec<String>,
    pub track_url: String,
    /// Album cover, which doubles as the track image.
    pub image_url: String,
    /// Playback position at observation time. Only currently playing
    /// observations carry it and it is not persisted.
    pub progress_ms: Option<u64>,
}

impl PlayEvent {
    pub fn primary_artist_id(&self) -> Option<&str> {
        self.artist_ids.first().map(String::as_str)
    }
}

/// A play event accepted into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub event: PlayEvent,
}

/// A playback record as the provider reported it, before normalization.
///
/// Every field is optional because the provider omits data for local files,
/// podcasts and region-restricted tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPlayback {
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_names: Vec<String>,
    pub album_name: Option<String>,
    pub duration_ms: Option<u64>,
    /// Provider timestamp; only the recently played endpoint sets it.
    pub played_at: Option<DateTime<Utc>>,
    /// Playback position; only the currently playing endpoint sets it.
    pub progress_ms: Option<u64>,
    pub album_id: Option<String>,
    pub artist_ids: Vec<String>,
    pub track_url: Option<String>,
    pub image_url: Option<String>,
}

/// Details of an artist looked up once and cached in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistProfile {
    pub artist_id: String,
    pub name: String,
    pub image_url: String,
    pub genres: Vec<String>,
}
