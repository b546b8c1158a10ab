//! Spreadsheet export of the play ledger.
//!
//! The main export is a CSV file with one row per ledger entry, sorted by
//! `played_at` ascending. Next to it the exporter writes four summary sheets
//! named after the main file (`history.csv` gets `history.tracks.csv`,
//! `history.albums.csv`, `history.artists.csv` and `history.genres.csv`):
//!
//! - **tracks**: every distinct track in order of its first play
//! - **albums**: every distinct album in order of its first play
//! - **artists**: every artist whose details were looked up
//! - **genres**: plays per genre of the primary artist, most played first
//!
//! Every file is rewritten wholesale on every export: the rows are rendered in
//! memory, written to `<file>.tmp` next to the target and then renamed over
//! the previous export, so readers see either the old or the new file and
//! never a partial one.

use std::{
    collections::{HashMap, HashSet},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{
    ledger::{Ledger, LedgerError},
    model::{ArtistProfile, LedgerEntry},
    tracker::Exporter,
};

pub const HEADER: [&str; 5] = ["Track", "Artist", "Album", "Played At", "Duration (ms)"];
pub const TRACKS_HEADER: [&str; 5] = ["Song Name", "Track ID", "Song URL", "Track Image", "Artist"];
pub const ALBUMS_HEADER: [&str; 4] = ["Album", "Album ID", "Album Image", "Artist"];
pub const ARTISTS_HEADER: [&str; 4] = ["Artist", "Artist ID", "Artist Image", "Genres"];
pub const GENRES_HEADER: [&str; 2] = ["Genre", "Count"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot read ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("cannot encode spreadsheet: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    /// Summary sheets written next to `path`.
    pub sheets: Vec<PathBuf>,
}

/// Summary sheets derived from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Tracks,
    Albums,
    Artists,
    Genres,
}

impl Sheet {
    pub const ALL: [Sheet; 4] = [Sheet::Tracks, Sheet::Albums, Sheet::Artists, Sheet::Genres];

    pub fn name(&self) -> &'static str {
        match self {
            Sheet::Tracks => "tracks",
            Sheet::Albums => "albums",
            Sheet::Artists => "artists",
            Sheet::Genres => "genres",
        }
    }

    /// `dir/history.csv` becomes `dir/history.<name>.csv`.
    pub fn path_for(&self, export: &Path) -> PathBuf {
        let mut name = export
            .file_stem()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("export"));
        name.push(".");
        name.push(self.name());
        name.push(".");
        name.push(export.extension().unwrap_or(OsStr::new("csv")));
        export.with_file_name(name)
    }
}

/// A genre and the number of plays credited to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreCount {
    pub genre: String,
    pub plays: u64,
}

/// Counts plays per genre of each play's primary artist.
///
/// Genres are compared lowercased and trimmed. Plays whose primary artist
/// was not looked up yet count for nothing. Sorted by count descending, then
/// genre ascending.
pub fn genre_counts<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    artists: &[ArtistProfile],
) -> Vec<GenreCount> {
    let genres_by_artist: HashMap<&str, &[String]> = artists
        .iter()
        .map(|a| (a.artist_id.as_str(), a.genres.as_slice()))
        .collect();

    let mut counts: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        let Some(genres) = entry
            .event
            .primary_artist_id()
            .and_then(|id| genres_by_artist.get(id))
        else {
            continue;
        };

        // a genre listed twice for one artist still counts once per play
        let genres: HashSet<String> = genres
            .iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect();
        for genre in genres {
            *counts.entry(genre).or_default() += 1;
        }
    }

    let mut counts: Vec<GenreCount> = counts
        .into_iter()
        .map(|(genre, plays)| GenreCount { genre, plays })
        .collect();
    counts.sort_by(|a, b| b.plays.cmp(&a.plays).then_with(|| a.genre.cmp(&b.genre)));
    counts
}

#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    track: &'a str,
    artist: &'a str,
    album: &'a str,
    played_at: String,
    duration_ms: u64,
}

impl<'a> From<&'a LedgerEntry> for CsvRecord<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        let event = &entry.event;
        Self {
            track: &event.track_name,
            artist: &event.artist_name,
            album: &event.album_name,
            played_at: event
                .played_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            duration_ms: event.duration_ms,
        }
    }
}

/// Writes the ledger to a CSV file with an atomic replace.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders the main export and every summary sheet.
    pub fn render_all(ledger: &Ledger) -> Result<Rendered, ExportError> {
        let entries = ledger.entries().collect::<Result<Vec<_>, _>>()?;
        let artists = ledger.artists()?;

        Ok(Rendered {
            plays: render_plays(&entries)?,
            rows: entries.len(),
            sheets: vec![
                (Sheet::Tracks, render_tracks(&entries)?),
                (Sheet::Albums, render_albums(&entries)?),
                (Sheet::Artists, render_artists(&artists)?),
                (Sheet::Genres, render_genres(&entries, &artists)?),
            ],
        })
    }

    pub async fn write(&self, ledger: &Ledger) -> Result<ExportSummary, ExportError> {
        let rendered = Self::render_all(ledger)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent)
                    .await
                    .map_err(|source| io_error(parent, source))?;
            }
        }

        let mut sheets = Vec::with_capacity(rendered.sheets.len());
        for (sheet, bytes) in rendered.sheets {
            let path = sheet.path_for(&self.path);
            replace_file(&path, bytes).await?;
            sheets.push(path);
        }
        // the main file goes last so its timestamp marks a complete export
        replace_file(&self.path, rendered.plays).await?;

        Ok(ExportSummary {
            path: self.path.clone(),
            rows: rendered.rows,
            sheets,
        })
    }
}

/// CSV bytes of one export, before anything touches the disk.
#[derive(Debug)]
pub struct Rendered {
    pub plays: Vec<u8>,
    pub rows: usize,
    pub sheets: Vec<(Sheet, Vec<u8>)>,
}

#[async_trait]
impl Exporter for CsvExporter {
    async fn export(&self, ledger: &Ledger) -> Result<ExportSummary, ExportError> {
        self.write(ledger).await
    }
}

fn csv_writer<const N: usize>(header: [&str; N]) -> Result<csv::Writer<Vec<u8>>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    // written by hand so an empty sheet still gets a header row
    writer.write_record(header)?;
    Ok(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

fn render_plays(entries: &[LedgerEntry]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv_writer(HEADER)?;
    for entry in entries {
        writer.serialize(CsvRecord::from(entry))?;
    }
    finish(writer)
}

fn render_tracks(entries: &[LedgerEntry]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv_writer(TRACKS_HEADER)?;
    let mut seen = HashSet::new();
    for entry in entries {
        let event = &entry.event;
        if !seen.insert(event.track_id.as_str()) {
            continue;
        }
        writer.write_record([
            event.track_name.as_str(),
            event.track_id.as_str(),
            event.track_url.as_str(),
            event.image_url.as_str(),
            event.artist_name.as_str(),
        ])?;
    }
    finish(writer)
}

fn render_albums(entries: &[LedgerEntry]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv_writer(ALBUMS_HEADER)?;
    let mut seen = HashSet::new();
    for entry in entries {
        let event = &entry.event;
        // plays recorded without an album id fall back to the album name
        let key = if event.album_id.is_empty() {
            &event.album_name
        } else {
            &event.album_id
        };
        if !seen.insert(key.as_str()) {
            continue;
        }
        writer.write_record([
            event.album_name.as_str(),
            event.album_id.as_str(),
            event.image_url.as_str(),
            event.artist_name.as_str(),
        ])?;
    }
    finish(writer)
}

fn render_artists(artists: &[ArtistProfile]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv_writer(ARTISTS_HEADER)?;
    for artist in artists {
        writer.write_record([
            artist.name.as_str(),
            artist.artist_id.as_str(),
            artist.image_url.as_str(),
            artist.genres.join(", ").as_str(),
        ])?;
    }
    finish(writer)
}

fn render_genres(entries: &[LedgerEntry], artists: &[ArtistProfile]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv_writer(GENRES_HEADER)?;
    for count in genre_counts(entries, artists) {
        writer.write_record([count.genre.as_str(), count.plays.to_string().as_str()])?;
    }
    finish(writer)
}

/// Writes `bytes` to `<path>.tmp` and renames it over `path`.
async fn replace_file(path: &Path, bytes: Vec<u8>) -> Result<(), ExportError> {
    let tmp = temp_path(path);
    async_fs::write(&tmp, bytes)
        .await
        .map_err(|source| io_error(&tmp, source))?;

    if let Err(source) = async_fs::rename(&tmp, path).await {
        let _ = async_fs::remove_file(&tmp).await;
        return Err(io_error(path, source));
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("export"));
    name.push(".tmp");
    path.with_file_name(name)
}
