//! # Polling Tracker
//!
//! The tracker samples the provider's "currently playing" and "recently
//! played" views on a fixed interval and feeds every observation through the
//! normalizer into the ledger, which decides whether it is a new play, a
//! duplicate or the authoritative version of a provisional one.
//!
//! ## Cycle
//!
//! ```text
//! Idle -> Polling -> Ingesting -> Idle
//!            \-> BackingOff -> Idle      (on any fetch failure)
//! ```
//!
//! 1. **Currently playing**: a new play (different track, or the same track
//!    started over) is recorded provisionally with the poll time.
//! 2. **Recently played**: everything after the cursor, oldest first. A full
//!    page triggers a follow-up request anchored at the last returned play
//!    until a short page comes back. The cursor advances on every accepted or
//!    superseded play.
//! 3. **Export**: when the ledger changed, the whole ledger is exported again.
//!
//! ## Failures
//!
//! - Rate limiting waits exactly the `Retry-After` the provider sent.
//! - Transient failures back off exponentially from 5s up to the poll interval.
//! - A rejected token is refreshed once and the call retried once; if that
//!   fails too the cycle fails as unauthorized and polling stalls with a
//!   growing backoff until the credentials work again. The process never
//!   exits on its own.
//!
//! All cross-cycle state lives in [`PollState`], which the caller owns.

mod api;
mod error;
mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrackerSettings,
    debug, info,
    ledger::{InsertResult, Ledger, LedgerError, MatchWindow},
    model::{PlaySource, RawPlayback},
    normalize::normalize,
    success, warning,
};

pub use api::{ApiError, Exporter, PlaybackApi};
pub use error::TrackerError;
pub use state::{
    AUTH_BACKOFF_CAP, Backoff, CycleReport, HistoryGap, NowPlaying, Phase, PollState,
    TRANSIENT_BACKOFF_START,
};

/// Upper bound on follow-up pages in one cycle.
const MAX_PAGES_PER_CYCLE: usize = 20;

/// Artist lookups per cycle; the rest wait for later cycles.
const ARTIST_LOOKUPS_PER_CYCLE: usize = 10;

pub struct Tracker<A, E> {
    api: A,
    exporter: E,
    ledger: Arc<Ledger>,
    settings: TrackerSettings,
}

impl<A: PlaybackApi, E: Exporter> Tracker<A, E> {
    pub fn new(api: A, exporter: E, ledger: Arc<Ledger>, settings: TrackerSettings) -> Self {
        Self {
            api,
            exporter,
            ledger,
            settings,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn match_window(&self) -> MatchWindow {
        MatchWindow::new(self.settings.match_tolerance, self.settings.poll_interval)
    }

    /// Fresh loop state with the cursor resumed from the ledger.
    pub fn resume_state(&self) -> Result<PollState, LedgerError> {
        PollState::resume(&self.ledger, self.settings.poll_interval)
    }

    /// Polls until `stop` is cancelled.
    ///
    /// The stop signal is checked before each cycle and while sleeping; a
    /// cycle that already started always runs to completion, so the ledger
    /// never sees a half-finished batch.
    pub async fn run(&self, state: &mut PollState, stop: CancellationToken) {
        info!(
            "Tracking playback every {}s, exporting to {}",
            self.settings.poll_interval.as_secs(),
            self.settings.export_path.display()
        );

        while !stop.is_cancelled() {
            let delay = match self.poll_once(state).await {
                Ok(report) => {
                    if let Some(summary) = &report.exported {
                        debug!(
                            "Exported {} plays to {}",
                            summary.rows,
                            summary.path.display()
                        );
                    }
                    self.settings.poll_interval
                }
                Err(err) => {
                    state.phase = Phase::BackingOff;
                    let delay = state.backoff_for(&err);
                    match &err {
                        TrackerError::Unauthorized(_) => warning!(
                            "{}. Polling paused, run `playlog auth` to fix the credentials. Next attempt in {}s",
                            err,
                            delay.as_secs()
                        ),
                        _ => warning!("Polling cycle failed: {}. Retrying in {}s", err, delay.as_secs()),
                    }
                    delay
                }
            };

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        state.phase = Phase::Idle;
        info!("Tracker stopped");
    }

    /// Runs a single polling cycle.
    pub async fn poll_once(&self, state: &mut PollState) -> Result<CycleReport, TrackerError> {
        state.phase = Phase::Polling;
        let mut report = CycleReport::default();
        let observed_at = Utc::now();

        let current = self.currently_playing().await?;
        state.phase = Phase::Ingesting;
        self.ingest_current(state, current, observed_at, &mut report)?;

        self.ingest_recent(state, observed_at, &mut report).await?;
        self.enrich_artists(state, observed_at, &mut report).await?;

        if state.export_pending {
            let summary = self.exporter.export(&self.ledger).await?;
            state.export_pending = false;
            report.exported = Some(summary);
        }

        state.record_success(observed_at);
        state.phase = Phase::Idle;
        Ok(report)
    }

    fn ingest_current(
        &self,
        state: &mut PollState,
        current: Option<RawPlayback>,
        observed_at: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), TrackerError> {
        let Some(raw) = current else {
            state.now_playing = None;
            return Ok(());
        };

        let Some(track_id) = raw.track_id.clone() else {
            // local files and podcasts have no track id; normalize reports them
            self.ingest(state, &raw, PlaySource::CurrentlyPlaying, observed_at, report)?;
            state.now_playing = None;
            return Ok(());
        };

        let continuing = state
            .now_playing
            .as_ref()
            .is_some_and(|np| np.continues_with(&track_id, raw.progress_ms));

        if !continuing {
            self.ingest(state, &raw, PlaySource::CurrentlyPlaying, observed_at, report)?;
        }

        state.now_playing = Some(NowPlaying {
            track_id,
            progress_ms: raw.progress_ms,
        });
        Ok(())
    }

    async fn ingest_recent(
        &self,
        state: &mut PollState,
        observed_at: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), TrackerError> {
        let limit = self.settings.page_limit;
        let resumed_from = state.cursor;
        // an empty ledger starts from the epoch
        let mut anchor = resumed_from.unwrap_or_default();

        loop {
            let page = self.recently_played(anchor, limit).await?;
            report.pages += 1;

            if report.pages == 1 {
                if let Some(gap) = self.detect_gap(state, resumed_from, &page, limit, observed_at)
                {
                    warning!("{}", gap);
                    state.advance_cursor(gap.oldest_returned);
                    report.gap = Some(gap);
                }
            }

            for raw in &page {
                self.ingest(state, raw, PlaySource::RecentlyPlayed, observed_at, report)?;
            }

            if page.len() < limit as usize {
                break;
            }

            match page.iter().filter_map(|r| r.played_at).max() {
                Some(last) if last > anchor => anchor = last,
                _ => {
                    warning!("Recently played page did not advance past {}, stopping", anchor);
                    break;
                }
            }

            if report.pages >= MAX_PAGES_PER_CYCLE {
                warning!(
                    "Stopped paging after {} pages, continuing next cycle",
                    MAX_PAGES_PER_CYCLE
                );
                break;
            }
        }

        Ok(())
    }

    /// A gap exists when the history we still have to fetch reaches further
    /// back than the provider keeps it. A short first page holds everything
    /// played since the cursor, so only a full one can hide lost plays.
    fn detect_gap(
        &self,
        state: &PollState,
        cursor: Option<DateTime<Utc>>,
        page: &[RawPlayback],
        limit: u32,
        observed_at: DateTime<Utc>,
    ) -> Option<HistoryGap> {
        let cursor = cursor?;
        if page.len() < limit as usize {
            return None;
        }
        let oldest_returned = page.iter().filter_map(|r| r.played_at).min()?;

        let covered_until = state.last_success.map_or(cursor, |at| at.max(cursor));
        let uncovered = observed_at.signed_duration_since(covered_until).to_std().ok()?;
        if uncovered <= self.settings.history_window {
            return None;
        }

        Some(HistoryGap {
            cursor,
            oldest_returned,
        })
    }

    /// Looks up primary artists that have no cached details yet.
    ///
    /// Lookup failures never fail the cycle: the artist stays missing and is
    /// tried again next cycle. Only ledger errors are returned.
    async fn enrich_artists(
        &self,
        state: &mut PollState,
        observed_at: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), TrackerError> {
        let missing = self.ledger.missing_artist_ids(ARTIST_LOOKUPS_PER_CYCLE)?;

        for artist_id in missing {
            match self.api.fetch_artist(&artist_id).await {
                Ok(profile) => {
                    self.ledger.upsert_artist(&profile, observed_at)?;
                    debug!("Cached artist {} ({} genres)", profile.name, profile.genres.len());
                    report.artists += 1;
                    state.export_pending = true;
                }
                Err(e) => {
                    warning!("Cannot look up artist {}: {}", artist_id, e);
                    break;
                }
            }
        }

        Ok(())
    }

    fn ingest(
        &self,
        state: &mut PollState,
        raw: &RawPlayback,
        source: PlaySource,
        observed_at: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<Option<InsertResult>, TrackerError> {
        let event = match normalize(raw, source, observed_at) {
            Ok(event) => event,
            Err(e) => {
                warning!("Skipping record: {}", e);
                report.malformed += 1;
                return Ok(None);
            }
        };

        let result = self.ledger.try_insert(&event, &self.match_window())?;
        match result {
            InsertResult::Accepted(_) => {
                report.accepted += 1;
                success!(
                    "Recorded {} by {} ({})",
                    event.track_name,
                    event.artist_name,
                    event.played_at.to_rfc3339()
                );
            }
            InsertResult::Superseded(id) => {
                report.superseded += 1;
                debug!("Confirmed play #{} of {} at {}", id, event.track_name, event.played_at);
            }
            InsertResult::DuplicateOf(id) => {
                report.duplicates += 1;
                debug!("{} already recorded as play #{}", event.track_name, id);
            }
        }

        if result.is_write() {
            state.export_pending = true;
            if source.is_authoritative() {
                state.advance_cursor(event.played_at);
            }
        }

        Ok(Some(result))
    }

    async fn currently_playing(&self) -> Result<Option<RawPlayback>, TrackerError> {
        match self.api.fetch_currently_playing().await {
            Err(ApiError::Auth(reason)) => {
                self.reauthorize(&reason).await?;
                Ok(self.api.fetch_currently_playing().await?)
            }
            other => Ok(other?),
        }
    }

    async fn recently_played(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawPlayback>, TrackerError> {
        match self.api.fetch_recently_played(after, limit).await {
            Err(ApiError::Auth(reason)) => {
                self.reauthorize(&reason).await?;
                Ok(self.api.fetch_recently_played(after, limit).await?)
            }
            other => Ok(other?),
        }
    }

    async fn reauthorize(&self, reason: &str) -> Result<(), TrackerError> {
        warning!("Provider rejected the access token ({}), refreshing", reason);
        self.api.refresh_credentials().await.map_err(TrackerError::from)
    }
}
