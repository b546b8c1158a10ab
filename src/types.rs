use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::model::{ArtistProfile, RawPlayback};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

#[derive(Debug, Clone)]
pub struct PkceToken {
    pub code_verifier: String,
    pub token: Option<Token>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Widest first.
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub album: Option<SpotifyAlbum>,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl SpotifyTrack {
    pub fn into_raw(self) -> RawPlayback {
        let (artist_ids, artist_names) = self
            .artists
            .into_iter()
            .map(|a| (a.id, a.name))
            .unzip::<_, _, Vec<_>, Vec<_>>();
        let (album_id, album_name, image_url) = match self.album {
            Some(album) => (
                album.id,
                album.name,
                album.images.into_iter().next().map(|i| i.url),
            ),
            None => (None, None, None),
        };

        RawPlayback {
            track_id: self.id,
            track_name: self.name,
            artist_names: artist_names.into_iter().flatten().collect(),
            album_name,
            duration_ms: self.duration_ms,
            album_id,
            artist_ids: artist_ids.into_iter().flatten().collect(),
            track_url: self.external_urls.spotify,
            image_url,
            ..RawPlayback::default()
        }
    }
}

/// `GET /me/player/currently-playing`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlayingResponse {
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub currently_playing_type: Option<String>,
    /// Tracks and episodes share this field; episodes fail to match and are
    /// treated as unidentified items.
    #[serde(default)]
    pub item: Option<serde_json::Value>,
}

/// `GET /me/player/recently-played`
#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayedResponse {
    pub items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryItem {
    pub track: SpotifyTrack,
    pub played_at: DateTime<Utc>,
}

/// `GET /artists/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl ArtistResponse {
    pub fn into_profile(self) -> ArtistProfile {
        ArtistProfile {
            artist_id: self.id,
            name: self.name,
            image_url: self
                .images
                .into_iter()
                .next()
                .map(|i| i.url)
                .unwrap_or_default(),
            genres: self.genres,
        }
    }
}

#[derive(Tabled)]
pub struct PlayTableRow {
    pub played_at: String,
    pub track: String,
    pub artist: String,
    pub album: String,
    pub duration: String,
    pub source: String,
}
