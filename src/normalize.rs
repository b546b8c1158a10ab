//! Conversion of raw provider records into [`PlayEvent`]s.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{PlayEvent, PlaySource, RawPlayback};

/// The record has no track id and cannot be tracked.
///
/// Raised for local files and other items the provider does not identify.
/// The caller drops the record and keeps going with the rest of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {endpoint} record '{track_name}': missing track id")]
pub struct MalformedRecordError {
    pub endpoint: PlaySource,
    pub track_name: String,
}

/// Converts a raw playback record into a canonical play event.
///
/// Optional metadata that the provider omitted becomes an empty string or a
/// zero duration. `played_at` comes from the record when the provider supplied
/// one and falls back to `observed_at` (the poll time) otherwise.
pub fn normalize(
    raw: &RawPlayback,
    source: PlaySource,
    observed_at: DateTime<Utc>,
) -> Result<PlayEvent, MalformedRecordError> {
    let track_id = match raw.track_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => {
            return Err(MalformedRecordError {
                endpoint: source,
                track_name: raw.track_name.clone().unwrap_or_default(),
            });
        }
    };

    let artist_name = raw
        .artist_names
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let artist_ids = raw
        .artist_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    Ok(PlayEvent {
        track_id,
        track_name: raw.track_name.clone().unwrap_or_default(),
        artist_name,
        album_name: raw.album_name.clone().unwrap_or_default(),
        played_at: raw.played_at.unwrap_or(observed_at),
        duration_ms: raw.duration_ms.unwrap_or(0),
        source,
        album_id: raw.album_id.clone().unwrap_or_default(),
        artist_ids,
        track_url: raw.track_url.clone().unwrap_or_default(),
        image_url: raw.image_url.clone().unwrap_or_default(),
        progress_ms: match source {
            PlaySource::CurrentlyPlaying => raw.progress_ms,
            PlaySource::RecentlyPlayed => None,
        },
    })
}
