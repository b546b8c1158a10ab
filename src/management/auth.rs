use std::path::PathBuf;

use chrono::Utc;
use reqwest::Client;
use thiserror::Error;

use crate::{
    config::{self, SpotifySettings},
    spotify,
    types::Token,
};

/// Seconds before the real expiry at which a token counts as expired.
const EXPIRY_MARGIN_SECS: u64 = 240;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no stored token at {0}, run `playlog auth` first")]
    NotFound(PathBuf),

    #[error("cannot access token store: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored token is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("token refresh rejected: {0}")]
    Rejected(String),

    #[error("token refresh failed: {0}")]
    Network(String),
}

pub struct TokenManager {
    token: Token,
    path: PathBuf,
}

impl TokenManager {
    pub fn new(token: Token) -> Self {
        TokenManager {
            token,
            path: Self::token_path(),
        }
    }

    pub async fn load() -> Result<Self, CredentialError> {
        Self::load_from(Self::token_path()).await
    }

    pub async fn load_from(path: PathBuf) -> Result<Self, CredentialError> {
        let content = match async_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        let token: Token = serde_json::from_str(&content)?;
        Ok(Self { token, path })
    }

    pub async fn persist(&self) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&self.token)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Returns an access token, refreshing and persisting it first when it is
    /// about to expire.
    pub async fn get_valid_token(
        &mut self,
        client: &Client,
        settings: &SpotifySettings,
    ) -> Result<String, CredentialError> {
        if self.is_expired() {
            self.refresh(client, settings).await?;
        }

        Ok(self.token.access_token.clone())
    }

    /// Exchanges the refresh token for a new access token and persists it.
    ///
    /// `client` carries the request timeout, so a token endpoint that never
    /// answers fails the refresh instead of stalling the caller.
    pub async fn refresh(
        &mut self,
        client: &Client,
        settings: &SpotifySettings,
    ) -> Result<(), CredentialError> {
        let mut fresh =
            spotify::auth::refresh_token(client, settings, &self.token.refresh_token).await?;
        // the provider may omit the refresh token when it did not rotate it
        if fresh.refresh_token.is_empty() {
            fresh.refresh_token = self.token.refresh_token.clone();
        }
        self.token = fresh;
        self.persist().await
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp().max(0) as u64;
        now + EXPIRY_MARGIN_SECS >= self.token.obtained_at + self.token.expires_in
    }

    fn token_path() -> PathBuf {
        config::data_dir().join("cache/token.json")
    }
}
