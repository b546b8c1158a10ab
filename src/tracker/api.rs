use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    export::{ExportError, ExportSummary},
    ledger::Ledger,
    model::{ArtistProfile, RawPlayback},
};

/// Failures of a single provider call. The client never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The access token is missing, expired or was rejected.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// The provider asked us to wait before the next request.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Network failure, timeout, server error or an unreadable response.
    #[error("transient network error: {0}")]
    Transient(String),
}

/// Read access to the provider's playback endpoints.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// What is playing right now; `None` when nothing is.
    async fn fetch_currently_playing(&self) -> Result<Option<RawPlayback>, ApiError>;

    /// Plays after `after`, oldest first, at most `limit` of them. The page
    /// is returned as the provider sent it so its length can be compared with
    /// `limit`; a record at exactly `after` may be included.
    async fn fetch_recently_played(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawPlayback>, ApiError>;

    /// Name, image and genres of an artist.
    async fn fetch_artist(&self, artist_id: &str) -> Result<ArtistProfile, ApiError>;

    /// Forces a credential refresh after the provider rejected the token.
    async fn refresh_credentials(&self) -> Result<(), ApiError>;
}

/// Materializes the ledger somewhere readable.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, ledger: &Ledger) -> Result<ExportSummary, ExportError>;
}
