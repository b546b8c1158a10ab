use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    export::ExportSummary,
    ledger::{Ledger, LedgerError},
};

use super::TrackerError;

/// First delay after a transient failure.
pub const TRANSIENT_BACKOFF_START: Duration = Duration::from_secs(5);

/// Longest pause between attempts while credentials are broken.
pub const AUTH_BACKOFF_CAP: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Ingesting,
    BackingOff,
}

/// Doubling delay between `initial` and `cap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial.min(self.cap),
            Some(previous) => previous.saturating_mul(2).min(self.cap),
        };
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn is_engaged(&self) -> bool {
        self.current.is_some()
    }
}

/// The currently playing track as seen by the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track_id: String,
    pub progress_ms: Option<u64>,
}

impl NowPlaying {
    /// Whether `next` is the same play carrying on, as opposed to a new track
    /// or the same track started over.
    pub fn continues_with(&self, track_id: &str, progress_ms: Option<u64>) -> bool {
        if self.track_id != track_id {
            return false;
        }
        match (self.progress_ms, progress_ms) {
            (Some(before), Some(now)) => now >= before,
            _ => true,
        }
    }
}

/// Recently played history between `cursor` and `oldest_returned` may have
/// fallen out of the provider's window before it could be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryGap {
    pub cursor: DateTime<Utc>,
    pub oldest_returned: DateTime<Utc>,
}

impl fmt::Display for HistoryGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "history gap: plays between {} and {} may be lost",
            self.cursor.to_rfc3339(),
            self.oldest_returned.to_rfc3339()
        )
    }
}

/// What a single polling cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub accepted: usize,
    pub superseded: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub pages: usize,
    /// Artists whose details were looked up and cached.
    pub artists: usize,
    pub gap: Option<HistoryGap>,
    pub exported: Option<ExportSummary>,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.accepted + self.superseded
    }
}

/// All state the polling loop carries from one cycle to the next.
#[derive(Debug, Clone)]
pub struct PollState {
    /// `played_at` of the newest recently played event already ingested.
    pub cursor: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub now_playing: Option<NowPlaying>,
    /// The ledger changed since the last successful export.
    pub export_pending: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub network_backoff: Backoff,
    pub auth_backoff: Backoff,
}

impl PollState {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            cursor: None,
            phase: Phase::Idle,
            now_playing: None,
            export_pending: false,
            last_success: None,
            network_backoff: Backoff::new(TRANSIENT_BACKOFF_START, poll_interval),
            auth_backoff: Backoff::new(poll_interval, AUTH_BACKOFF_CAP.max(poll_interval)),
        }
    }

    /// Picks up where a previous run left off: the cursor starts at the newest
    /// authoritative play in the ledger.
    pub fn resume(ledger: &Ledger, poll_interval: Duration) -> Result<Self, LedgerError> {
        let mut state = Self::new(poll_interval);
        state.cursor = ledger.max_played_at()?;
        Ok(state)
    }

    /// Moves the cursor forward; earlier timestamps are ignored.
    pub fn advance_cursor(&mut self, to: DateTime<Utc>) {
        if self.cursor.is_none_or(|current| to > current) {
            self.cursor = Some(to);
        }
    }

    /// How long to wait before retrying after `err`.
    pub fn backoff_for(&mut self, err: &TrackerError) -> Duration {
        match err {
            TrackerError::RateLimited { retry_after } => *retry_after,
            TrackerError::Unauthorized(_) => self.auth_backoff.next_delay(),
            TrackerError::Transient(_) | TrackerError::Ledger(_) | TrackerError::Export(_) => {
                self.network_backoff.next_delay()
            }
        }
    }

    pub(super) fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
        self.network_backoff.reset();
        self.auth_backoff.reset();
    }
}
