//! # Spotify Integration Module
//!
//! This module provides the interface to the Spotify Web API that the tracker
//! needs: the OAuth 2.0 PKCE handshake and the two player endpoints.
//!
//! ## Architecture
//!
//! ```text
//! Tracker
//!    ↓  (PlaybackApi)
//! SpotifyClient ── TokenManager (credential store)
//!    ↓
//! HTTP Layer (reqwest, JSON)
//!    ↓
//! Spotify Web API
//! ```
//!
//! ## API Coverage
//!
//! - `GET /me/player/currently-playing` - what is playing right now
//! - `GET /me/player/recently-played` - play history after a cursor
//! - `GET /artists/{id}` - artist image and genres for the export
//! - `POST /api/token` - token exchange and refresh operations
//!
//! ## Error Handling
//!
//! The client never retries. Responses are mapped to [`ApiError`]:
//! 401/403 become `Auth`, 429 becomes `RateLimited` with the `Retry-After`
//! delay, everything else (timeouts, 5xx, bad bodies) is `Transient`. Retry
//! policy lives in the tracker.

pub mod artists;
pub mod auth;
pub mod player;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::Mutex;

use crate::{
    config::{SpotifySettings, TrackerSettings},
    management::{CredentialError, TokenManager},
    model::{ArtistProfile, RawPlayback},
    tracker::{ApiError, PlaybackApi},
};

pub struct SpotifyClient {
    http: Client,
    settings: Arc<SpotifySettings>,
    tokens: Mutex<TokenManager>,
}

impl SpotifyClient {
    pub fn new(
        settings: Arc<SpotifySettings>,
        tracker: &TrackerSettings,
        tokens: TokenManager,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(tracker.request_timeout)
            .connect_timeout(tracker.request_timeout)
            .build()?;

        Ok(Self {
            http,
            settings,
            tokens: Mutex::new(tokens),
        })
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        let mut tokens = self.tokens.lock().await;
        tokens
            .get_valid_token(&self.http, &self.settings)
            .await
            .map_err(credential_error)
    }
}

fn credential_error(err: CredentialError) -> ApiError {
    match err {
        CredentialError::Network(reason) => ApiError::Transient(reason),
        other => ApiError::Auth(other.to_string()),
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn fetch_currently_playing(&self) -> Result<Option<RawPlayback>, ApiError> {
        let token = self.access_token().await?;
        player::get_currently_playing(&self.http, &self.settings.api_url, &token).await
    }

    async fn fetch_recently_played(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawPlayback>, ApiError> {
        let token = self.access_token().await?;
        player::get_recently_played(&self.http, &self.settings.api_url, &token, after, limit)
            .await
    }

    async fn fetch_artist(&self, artist_id: &str) -> Result<ArtistProfile, ApiError> {
        let token = self.access_token().await?;
        artists::get_artist(&self.http, &self.settings.api_url, &token, artist_id).await
    }

    async fn refresh_credentials(&self) -> Result<(), ApiError> {
        let mut tokens = self.tokens.lock().await;
        tokens
            .refresh(&self.http, &self.settings)
            .await
            .map_err(credential_error)
    }
}
