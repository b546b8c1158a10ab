mod common;

use std::sync::Arc;

use common::{artist, at, event};
use playlog::{
    export::{
        ALBUMS_HEADER, ARTISTS_HEADER, CsvExporter, GENRES_HEADER, GenreCount, HEADER, Sheet,
        TRACKS_HEADER, genre_counts,
    },
    ledger::{Ledger, MatchWindow},
    model::{LedgerEntry, PlaySource},
};

fn ledger_with(plays: &[(&str, i64)]) -> Ledger {
    let ledger = Ledger::in_memory().unwrap();
    for (id, secs) in plays {
        ledger
            .try_insert(
                &event(id, at(*secs), PlaySource::RecentlyPlayed),
                &MatchWindow::default(),
            )
            .unwrap();
    }
    ledger
}

fn read_rows(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[tokio::test]
async fn test_export_writes_header_and_sorted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("history.csv");
    let ledger = ledger_with(&[("late", 600), ("early", 0)]);

    let summary = CsvExporter::new(&path).write(&ledger).await.unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.path, path);

    let rows = read_rows(&path);
    assert_eq!(rows[0], HEADER.to_vec());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][0], "Track early");
    assert_eq!(rows[1][1], "Some Artist");
    assert_eq!(rows[1][3], "2023-11-14T22:13:20.000Z");
    assert_eq!(rows[1][4], "180000");
    assert_eq!(rows[2][0], "Track late");
}

#[tokio::test]
async fn test_export_of_empty_ledger_has_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");

    let summary = CsvExporter::new(&path)
        .write(&Ledger::in_memory().unwrap())
        .await
        .unwrap();

    assert_eq!(summary.rows, 0);
    assert_eq!(read_rows(&path), vec![HEADER.to_vec()]);
}

#[tokio::test]
async fn test_export_quotes_commas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let ledger = Ledger::in_memory().unwrap();
    let mut play = event("a", at(0), PlaySource::RecentlyPlayed);
    play.track_name = "Harder, Better, Faster, Stronger".to_string();
    ledger.try_insert(&play, &MatchWindow::default()).unwrap();

    CsvExporter::new(&path).write(&ledger).await.unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows[1][0], "Harder, Better, Faster, Stronger");
}

#[tokio::test]
async fn test_export_replaces_previous_file_without_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let ledger = ledger_with(&[("a", 0)]);
    let exporter = CsvExporter::new(&path);

    exporter.write(&ledger).await.unwrap();
    ledger
        .try_insert(
            &event("b", at(600), PlaySource::RecentlyPlayed),
            &MatchWindow::default(),
        )
        .unwrap();
    exporter.write(&ledger).await.unwrap();

    assert_eq!(read_rows(&path).len(), 3);
    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "history.albums.csv",
            "history.artists.csv",
            "history.csv",
            "history.genres.csv",
            "history.tracks.csv",
        ]
    );
}

#[tokio::test]
async fn test_readers_never_see_partial_export() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let plays: Vec<(String, i64)> = (0..500).map(|i| (format!("t{i}"), i * 200)).collect();
    let plays: Vec<(&str, i64)> = plays.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let ledger = Arc::new(ledger_with(&plays));
    let exporter = CsvExporter::new(&path);
    exporter.write(&ledger).await.unwrap();

    let reader_path = path.clone();
    let reader = std::thread::spawn(move || {
        for _ in 0..200 {
            let rows = read_rows(&reader_path);
            assert_eq!(rows.len(), 501);
        }
    });

    for _ in 0..20 {
        exporter.write(&ledger).await.unwrap();
    }

    reader.join().unwrap();
}

#[test]
fn test_sheet_paths_follow_export_name() {
    let export = std::path::Path::new("/data/history.csv");
    assert_eq!(
        Sheet::Tracks.path_for(export),
        std::path::PathBuf::from("/data/history.tracks.csv")
    );
    assert_eq!(
        Sheet::Genres.path_for(std::path::Path::new("plays")),
        std::path::PathBuf::from("plays.genres.csv")
    );
}

#[tokio::test]
async fn test_summary_sheets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let ledger = Ledger::in_memory().unwrap();
    for (id, album, artist_id, secs) in [
        ("a", "ram", "dp", 0),
        ("b", "ram", "dp", 300),
        ("a", "ram", "dp", 600),
        ("c", "hs", "jt", 900),
    ] {
        let mut play = event(id, at(secs), PlaySource::RecentlyPlayed);
        play.album_id = album.to_string();
        play.album_name = format!("Album {album}");
        play.artist_ids = vec![artist_id.to_string()];
        ledger.try_insert(&play, &MatchWindow::default()).unwrap();
    }
    ledger
        .upsert_artist(&artist("dp", &["French House", "electro"]), at(0))
        .unwrap();

    let summary = CsvExporter::new(&path).write(&ledger).await.unwrap();
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.sheets.len(), 4);

    let tracks = read_rows(&Sheet::Tracks.path_for(&path));
    assert_eq!(tracks[0], TRACKS_HEADER.to_vec());
    assert_eq!(tracks.len(), 4);
    assert_eq!(
        tracks[1],
        vec![
            "Track a",
            "a",
            "https://open.spotify.com/track/a",
            "https://i.scdn.co/image/cover",
            "Some Artist",
        ]
    );

    let albums = read_rows(&Sheet::Albums.path_for(&path));
    assert_eq!(albums[0], ALBUMS_HEADER.to_vec());
    let album_ids: Vec<_> = albums[1..].iter().map(|r| r[1].as_str()).collect();
    assert_eq!(album_ids, vec!["ram", "hs"]);

    // only looked up artists are listed
    let artists = read_rows(&Sheet::Artists.path_for(&path));
    assert_eq!(artists[0], ARTISTS_HEADER.to_vec());
    assert_eq!(
        artists[1],
        vec![
            "Artist dp",
            "dp",
            "https://i.scdn.co/image/dp",
            "French House, electro",
        ]
    );
    assert_eq!(artists.len(), 2);

    let genres = read_rows(&Sheet::Genres.path_for(&path));
    assert_eq!(
        genres,
        vec![
            GENRES_HEADER.to_vec(),
            vec!["electro", "3"],
            vec!["french house", "3"],
        ]
    );
}

#[test]
fn test_genre_counts_order_and_normalization() {
    let entries: Vec<LedgerEntry> = [("a", "dp"), ("b", "jt"), ("c", "jt"), ("d", "unknown")]
        .into_iter()
        .enumerate()
        .map(|(i, (id, artist_id))| {
            let mut play = event(id, at(i as i64 * 300), PlaySource::RecentlyPlayed);
            play.artist_ids = vec![artist_id.to_string()];
            LedgerEntry {
                id: i as i64 + 1,
                event: play,
            }
        })
        .collect();
    let artists = vec![
        artist("dp", &["Pop", "  disco "]),
        artist("jt", &["pop", "POP", "r&b", ""]),
    ];

    let counts = genre_counts(&entries, &artists);

    let as_pairs: Vec<_> = counts
        .iter()
        .map(|GenreCount { genre, plays }| (genre.as_str(), *plays))
        .collect();
    assert_eq!(as_pairs, vec![("pop", 3), ("r&b", 2), ("disco", 1)]);
}
