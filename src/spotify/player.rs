use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, header::HeaderMap};

use crate::{
    model::RawPlayback,
    tracker::ApiError,
    types::{CurrentlyPlayingResponse, RecentlyPlayedResponse, SpotifyTrack},
};

/// Used when a 429 response carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Reads the `Retry-After` header (delay in seconds).
pub fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Maps a non-success status to the tracker's error taxonomy.
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> Option<ApiError> {
    match status {
        s if s.is_success() => None,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Some(ApiError::Auth(format!("provider answered {status}")))
        }
        StatusCode::TOO_MANY_REQUESTS => Some(ApiError::RateLimited {
            retry_after: retry_after(headers),
        }),
        s => Some(ApiError::Transient(format!("provider answered {s}"))),
    }
}

pub(super) fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Transient(format!("request timed out: {err}"))
    } else {
        ApiError::Transient(err.to_string())
    }
}

pub(super) async fn send(client: &Client, url: &str, token: &str) -> Result<Response, ApiError> {
    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(transport_error)?;

    match classify_status(response.status(), response.headers()) {
        Some(err) => Err(err),
        None => Ok(response),
    }
}

pub async fn get_currently_playing(
    client: &Client,
    api_url: &str,
    token: &str,
) -> Result<Option<RawPlayback>, ApiError> {
    let url = format!("{api_url}/me/player/currently-playing");
    let response = send(client, &url, token).await?;

    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    let body = response.text().await.map_err(transport_error)?;
    if body.trim().is_empty() {
        return Ok(None);
    }

    let json: CurrentlyPlayingResponse =
        serde_json::from_str(&body).map_err(|e| ApiError::Transient(e.to_string()))?;

    Ok(currently_playing_to_raw(json))
}

pub fn currently_playing_to_raw(json: CurrentlyPlayingResponse) -> Option<RawPlayback> {
    let item = json.item?;
    let is_track = json
        .currently_playing_type
        .as_deref()
        .is_none_or(|t| t == "track");

    let mut raw = match serde_json::from_value::<SpotifyTrack>(item) {
        Ok(track) => track.into_raw(),
        Err(_) => RawPlayback::default(),
    };
    if !is_track {
        // episodes and ads are not tracks
        raw.track_id = None;
    }
    raw.progress_ms = json.progress_ms;
    Some(raw)
}

pub async fn get_recently_played(
    client: &Client,
    api_url: &str,
    token: &str,
    after: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<RawPlayback>, ApiError> {
    let url = format!(
        "{api_url}/me/player/recently-played?limit={limit}&after={after}",
        after = after.timestamp_millis().max(0)
    );
    let response = send(client, &url, token).await?;
    let json: RecentlyPlayedResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Transient(e.to_string()))?;

    Ok(recently_played_to_raw(json))
}

/// Converts a recently played page into oldest-first records; the provider
/// lists them newest first.
///
/// Nothing is filtered out: the tracker compares the page length with the
/// requested limit to decide whether to fetch a follow-up page, and a record
/// at the cursor is recognized by the ledger as already recorded.
pub fn recently_played_to_raw(json: RecentlyPlayedResponse) -> Vec<RawPlayback> {
    let mut records: Vec<RawPlayback> = json
        .items
        .into_iter()
        .map(|item| {
            let mut raw = item.track.into_raw();
            raw.played_at = Some(item.played_at);
            raw
        })
        .collect();

    records.sort_by_key(|r| r.played_at);
    records
}
