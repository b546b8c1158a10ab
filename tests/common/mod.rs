#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use playlog::{
    config::TrackerSettings,
    export::{ExportError, ExportSummary},
    ledger::Ledger,
    model::{ArtistProfile, PlayEvent, PlaySource, RawPlayback},
    tracker::{ApiError, Exporter, PlaybackApi},
};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn raw_track(id: &str, played_at: Option<DateTime<Utc>>) -> RawPlayback {
    RawPlayback {
        track_id: Some(id.to_string()),
        track_name: Some(format!("Track {id}")),
        artist_names: vec!["Some Artist".to_string()],
        album_name: Some("Some Album".to_string()),
        duration_ms: Some(180_000),
        played_at,
        progress_ms: None,
        album_id: Some("album-1".to_string()),
        artist_ids: vec!["artist-1".to_string()],
        track_url: Some(format!("https://open.spotify.com/track/{id}")),
        image_url: Some("https://i.scdn.co/image/cover".to_string()),
    }
}

pub fn playing(id: &str, progress_ms: u64) -> RawPlayback {
    RawPlayback {
        progress_ms: Some(progress_ms),
        ..raw_track(id, None)
    }
}

pub fn event(id: &str, played_at: DateTime<Utc>, source: PlaySource) -> PlayEvent {
    PlayEvent {
        track_id: id.to_string(),
        track_name: format!("Track {id}"),
        artist_name: "Some Artist".to_string(),
        album_name: "Some Album".to_string(),
        played_at,
        duration_ms: 180_000,
        source,
        album_id: "album-1".to_string(),
        artist_ids: vec!["artist-1".to_string()],
        track_url: format!("https://open.spotify.com/track/{id}"),
        image_url: "https://i.scdn.co/image/cover".to_string(),
        progress_ms: None,
    }
}

pub fn artist(id: &str, genres: &[&str]) -> ArtistProfile {
    ArtistProfile {
        artist_id: id.to_string(),
        name: format!("Artist {id}"),
        image_url: format!("https://i.scdn.co/image/{id}"),
        genres: genres.iter().map(|g| g.to_string()).collect(),
    }
}

pub fn settings() -> TrackerSettings {
    TrackerSettings {
        poll_interval: Duration::from_secs(30),
        request_timeout: Duration::from_secs(10),
        match_tolerance: Duration::from_millis(2000),
        history_window: Duration::from_secs(24 * 60 * 60),
        page_limit: 50,
        ledger_path: PathBuf::from("unused.sqlite3"),
        export_path: PathBuf::from("unused.csv"),
    }
}

/// Scripted provider: every call pops the next queued answer. An empty queue
/// answers "nothing playing", an empty history page and a bare artist.
#[derive(Default)]
pub struct FakeApi {
    pub current: Mutex<VecDeque<Result<Option<RawPlayback>, ApiError>>>,
    pub recent: Mutex<VecDeque<Result<Vec<RawPlayback>, ApiError>>>,
    pub refresh: Mutex<VecDeque<Result<(), ApiError>>>,
    pub artists: Mutex<VecDeque<Result<ArtistProfile, ApiError>>>,
    pub artist_calls: Mutex<Vec<String>>,
    pub current_calls: AtomicUsize,
    pub recent_calls: Mutex<Vec<(DateTime<Utc>, u32)>>,
    pub refresh_calls: AtomicUsize,
}

impl FakeApi {
    pub fn push_current(&self, answer: Result<Option<RawPlayback>, ApiError>) {
        self.current.lock().unwrap().push_back(answer);
    }

    pub fn push_recent(&self, answer: Result<Vec<RawPlayback>, ApiError>) {
        self.recent.lock().unwrap().push_back(answer);
    }

    pub fn push_refresh(&self, answer: Result<(), ApiError>) {
        self.refresh.lock().unwrap().push_back(answer);
    }

    pub fn push_artist(&self, answer: Result<ArtistProfile, ApiError>) {
        self.artists.lock().unwrap().push_back(answer);
    }

    pub fn artist_calls(&self) -> Vec<String> {
        self.artist_calls.lock().unwrap().clone()
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> Vec<(DateTime<Utc>, u32)> {
        self.recent_calls.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackApi for FakeApi {
    async fn fetch_currently_playing(&self) -> Result<Option<RawPlayback>, ApiError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn fetch_recently_played(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawPlayback>, ApiError> {
        self.recent_calls.lock().unwrap().push((after, limit));
        self.recent
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    /// Unscripted lookups answer with a profile without genres.
    async fn fetch_artist(&self, artist_id: &str) -> Result<ArtistProfile, ApiError> {
        self.artist_calls.lock().unwrap().push(artist_id.to_string());
        self.artists
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(artist(artist_id, &[])))
    }

    async fn refresh_credentials(&self) -> Result<(), ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Counts exports; fails while `failing` is set.
#[derive(Default)]
pub struct FakeExporter {
    pub calls: AtomicUsize,
    pub failing: std::sync::atomic::AtomicBool,
}

impl FakeExporter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Exporter for FakeExporter {
    async fn export(&self, ledger: &Ledger) -> Result<ExportSummary, ExportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExportError::Io {
                path: PathBuf::from("unused.csv"),
                source: std::io::Error::other("disk full"),
            });
        }
        Ok(ExportSummary {
            path: PathBuf::from("unused.csv"),
            rows: ledger.len()? as usize,
            sheets: Vec::new(),
        })
    }
}
