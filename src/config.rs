//! Configuration management for the listening history tracker.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. It provides a centralized way to manage application
//! configuration including Spotify API credentials, server settings, polling
//! cadence and file locations.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

pub const APP_DIR: &str = "playlog";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";
const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_SCOPE: &str =
    "user-read-currently-playing user-read-playback-state user-read-recently-played";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the necessary directory structure if it doesn't exist and loads
/// environment variables from a `.env` file located in the platform-specific
/// local data directory under `playlog/.env`. A missing `.env` file is not an
/// error: every value may come from the process environment instead.
///
/// # Directory Structure
///
/// The function looks for the `.env` file in:
/// - Linux: `~/.local/share/playlog/.env`
/// - macOS: `~/Library/Application Support/playlog/.env`
/// - Windows: `%LOCALAPPDATA%/playlog/.env`
///
/// # Errors
///
/// This function will return an error if the parent directory cannot be
/// created or an existing `.env` file cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Returns the application's local data directory (`<data_local_dir>/playlog`).
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn or_default(name: &'static str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::Invalid { name, value })
        }
        _ => Ok(default),
    }
}

/// Spotify application credentials and endpoints.
///
/// `client_id` and `client_secret` are obtained when registering the
/// application with Spotify's developer platform and must be set through
/// `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET`. The redirect URI must match
/// the one registered with the application.
///
/// # Security Note
///
/// The client secret should be kept confidential and never exposed in logs
/// or version control; the `Debug` implementation redacts it.
#[derive(Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    pub server_address: String,
}

impl std::fmt::Debug for SpotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifySettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .field("server_address", &self.server_address)
            .finish()
    }
}

impl SpotifySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required("SPOTIFY_CLIENT_ID")?,
            client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: or_default("SPOTIFY_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            scope: or_default("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE),
            auth_url: or_default("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: or_default("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_url: or_default("SPOTIFY_API_URL", DEFAULT_API_URL),
            server_address: or_default("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
        })
    }
}

/// Polling cadence, matching tolerances and file locations for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Time between two polling cycles.
    pub poll_interval: Duration,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Two observations of a track closer than this are the same play.
    pub match_tolerance: Duration,
    /// How far back the provider keeps recently played history.
    pub history_window: Duration,
    /// Maximum number of records the provider returns per page.
    pub page_limit: u32,
    pub ledger_path: PathBuf,
    pub export_path: PathBuf,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            match_tolerance: Duration::from_millis(2000),
            history_window: Duration::from_secs(24 * 60 * 60),
            page_limit: 50,
            ledger_path: data_dir().join("ledger.sqlite3"),
            export_path: data_dir().join("listening-history.csv"),
        }
    }
}

impl TrackerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_secs: u64 = parsed_or("PLAYLOG_POLL_INTERVAL_SECS", 30)?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PLAYLOG_POLL_INTERVAL_SECS",
                value: poll_secs.to_string(),
            });
        }

        let page_limit: u32 = parsed_or("PLAYLOG_PAGE_LIMIT", defaults.page_limit)?;
        if page_limit == 0 || page_limit > 50 {
            return Err(ConfigError::Invalid {
                name: "PLAYLOG_PAGE_LIMIT",
                value: page_limit.to_string(),
            });
        }

        let timeout_secs: u64 = parsed_or("PLAYLOG_REQUEST_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PLAYLOG_REQUEST_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
            });
        }

        let window_hours: u64 = parsed_or("PLAYLOG_HISTORY_WINDOW_HOURS", 24)?;
        let window_secs = window_hours
            .checked_mul(60 * 60)
            .ok_or_else(|| ConfigError::Invalid {
                name: "PLAYLOG_HISTORY_WINDOW_HOURS",
                value: window_hours.to_string(),
            })?;

        Ok(Self {
            poll_interval: Duration::from_secs(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            match_tolerance: Duration::from_millis(parsed_or("PLAYLOG_MATCH_TOLERANCE_MS", 2000)?),
            history_window: Duration::from_secs(window_secs),
            page_limit,
            ledger_path: env::var_os("PLAYLOG_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ledger_path),
            export_path: env::var_os("PLAYLOG_EXPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_path),
        })
    }
}
