mod common;

use std::{sync::Arc, thread, time::Duration};

use common::{artist, at, event};
use playlog::{
    ledger::{InsertResult, Ledger, MatchWindow},
    model::{PlayEvent, PlaySource},
};

fn playing_since(id: &str, secs: i64, progress_ms: u64) -> PlayEvent {
    PlayEvent {
        progress_ms: Some(progress_ms),
        ..event(id, at(secs), PlaySource::CurrentlyPlaying)
    }
}

fn window() -> MatchWindow {
    MatchWindow::new(Duration::from_secs(2), Duration::from_secs(30))
}

#[test]
fn test_insert_is_idempotent() {
    let ledger = Ledger::in_memory().unwrap();
    let play = event("a", at(0), PlaySource::RecentlyPlayed);

    let first = ledger.try_insert(&play, &window()).unwrap();
    let second = ledger.try_insert(&play, &window()).unwrap();

    assert!(matches!(first, InsertResult::Accepted(_)));
    assert_eq!(second, InsertResult::DuplicateOf(first.entry_id()));
    assert_eq!(ledger.len().unwrap(), 1);
}

#[test]
fn test_timestamps_within_tolerance_are_one_play() {
    let ledger = Ledger::in_memory().unwrap();
    ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    let jittered = event("a", at(0) + chrono::Duration::milliseconds(1500), PlaySource::RecentlyPlayed);
    let result = ledger.try_insert(&jittered, &window()).unwrap();

    assert!(!result.is_write());
    assert_eq!(ledger.len().unwrap(), 1);
}

#[test]
fn test_repeated_listens_are_kept_apart() {
    let ledger = Ledger::in_memory().unwrap();
    // the same track played back to back, three minutes apart
    for start in [0, 180, 360] {
        let result = ledger
            .try_insert(&event("a", at(start), PlaySource::RecentlyPlayed), &window())
            .unwrap();
        assert!(matches!(result, InsertResult::Accepted(_)));
    }

    assert_eq!(ledger.len().unwrap(), 3);
}

#[test]
fn test_different_tracks_never_collapse() {
    let ledger = Ledger::in_memory().unwrap();
    ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();
    let result = ledger
        .try_insert(&event("b", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    assert!(matches!(result, InsertResult::Accepted(_)));
    assert_eq!(ledger.len().unwrap(), 2);
}

#[test]
fn test_recently_played_supersedes_currently_playing() {
    let ledger = Ledger::in_memory().unwrap();
    let provisional = ledger
        .try_insert(&event("a", at(0), PlaySource::CurrentlyPlaying), &window())
        .unwrap();

    // the provider stamps the play when it ends
    let confirmed = ledger
        .try_insert(&event("a", at(175), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    assert_eq!(confirmed, InsertResult::Superseded(provisional.entry_id()));
    assert_eq!(ledger.len().unwrap(), 1);
    assert_eq!(ledger.provisional_count().unwrap(), 0);

    let entry = ledger.get(provisional.entry_id()).unwrap().unwrap();
    assert_eq!(entry.event.played_at, at(175));
    assert_eq!(entry.event.source, PlaySource::RecentlyPlayed);
}

#[test]
fn test_confirmation_within_tolerance_supersedes() {
    let ledger = Ledger::in_memory().unwrap();
    let first = ledger
        .try_insert(&event("t", at(0), PlaySource::CurrentlyPlaying), &window())
        .unwrap();
    let second = ledger
        .try_insert(&event("t", at(1), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    assert!(matches!(first, InsertResult::Accepted(_)));
    assert_eq!(second, InsertResult::Superseded(first.entry_id()));

    let entries: Vec<_> = ledger.entries().map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event.source, PlaySource::RecentlyPlayed);
}

#[test]
fn test_currently_playing_after_confirmation_is_duplicate() {
    let ledger = Ledger::in_memory().unwrap();
    let confirmed = ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    let late_poll = ledger
        .try_insert(&event("a", at(20), PlaySource::CurrentlyPlaying), &window())
        .unwrap();

    assert_eq!(late_poll, InsertResult::DuplicateOf(confirmed.entry_id()));
}

#[test]
fn test_replay_seen_only_by_currently_playing_is_a_new_play() {
    let ledger = Ledger::in_memory().unwrap();
    ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    // 100s later with no position known: the window reaches back one poll
    let replay = ledger
        .try_insert(&event("a", at(100), PlaySource::CurrentlyPlaying), &window())
        .unwrap();

    assert!(matches!(replay, InsertResult::Accepted(_)));
    assert_eq!(ledger.len().unwrap(), 2);
}

#[test]
fn test_replay_that_started_after_the_last_play_is_new() {
    let ledger = Ledger::in_memory().unwrap();
    ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();

    // started at 195s, well after the recorded play
    let replay = ledger
        .try_insert(&playing_since("a", 200, 5_000), &window())
        .unwrap();

    assert!(matches!(replay, InsertResult::Accepted(_)));
}

#[test]
fn test_same_play_observed_again_after_restart_is_duplicate() {
    let ledger = Ledger::in_memory().unwrap();
    let first = ledger
        .try_insert(&playing_since("a", 0, 10_000), &window())
        .unwrap();

    // 150s later the same play is 160s in, so it started at -10s
    let again = ledger
        .try_insert(&playing_since("a", 150, 160_000), &window())
        .unwrap();

    assert_eq!(again, InsertResult::DuplicateOf(first.entry_id()));
    assert_eq!(ledger.len().unwrap(), 1);
}

#[test]
fn test_play_metadata_survives_storage() {
    let ledger = Ledger::in_memory().unwrap();
    let mut play = event("a", at(0), PlaySource::RecentlyPlayed);
    play.artist_ids = vec!["dp".to_string(), "pw".to_string()];
    play.album_id = "ram".to_string();

    let id = ledger.try_insert(&play, &window()).unwrap().entry_id();
    let stored = ledger.get(id).unwrap().unwrap().event;

    assert_eq!(stored.artist_ids, vec!["dp", "pw"]);
    assert_eq!(stored.primary_artist_id(), Some("dp"));
    assert_eq!(stored.album_id, "ram");
    assert_eq!(stored.track_url, "https://open.spotify.com/track/a");
    assert_eq!(stored.image_url, "https://i.scdn.co/image/cover");
    assert_eq!(stored.progress_ms, None);
}

#[test]
fn test_artist_cache() {
    let ledger = Ledger::in_memory().unwrap();
    assert_eq!(ledger.artist("dp").unwrap(), None);

    ledger
        .upsert_artist(&artist("dp", &["french house"]), at(0))
        .unwrap();
    ledger
        .upsert_artist(&artist("dp", &["french house", "electro"]), at(60))
        .unwrap();
    ledger.upsert_artist(&artist("ab", &[]), at(60)).unwrap();

    let cached = ledger.artist("dp").unwrap().unwrap();
    assert_eq!(cached.genres, vec!["french house", "electro"]);
    assert_eq!(cached.image_url, "https://i.scdn.co/image/dp");

    let names: Vec<_> = ledger.artists().unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Artist ab", "Artist dp"]);
}

#[test]
fn test_missing_artists_are_most_recent_first() {
    let ledger = Ledger::in_memory().unwrap();
    for (id, artist_id, secs) in [("a", "old", 0), ("b", "new", 600), ("c", "known", 1200)] {
        let mut play = event(id, at(secs), PlaySource::RecentlyPlayed);
        play.artist_ids = vec![artist_id.to_string(), "featured".to_string()];
        ledger.try_insert(&play, &window()).unwrap();
    }
    let mut local = event("d", at(1800), PlaySource::RecentlyPlayed);
    local.artist_ids.clear();
    ledger.try_insert(&local, &window()).unwrap();
    ledger.upsert_artist(&artist("known", &[]), at(0)).unwrap();

    // featured artists are never primary; plays without artists are skipped
    assert_eq!(ledger.missing_artist_ids(10).unwrap(), vec!["new", "old"]);
    assert_eq!(ledger.missing_artist_ids(1).unwrap(), vec!["new"]);
}

#[test]
fn test_provisional_rows_do_not_move_max_played_at() {
    let ledger = Ledger::in_memory().unwrap();
    assert_eq!(ledger.max_played_at().unwrap(), None);

    ledger
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();
    ledger
        .try_insert(&event("b", at(600), PlaySource::CurrentlyPlaying), &window())
        .unwrap();

    assert_eq!(ledger.max_played_at().unwrap(), Some(at(0)));
}

#[test]
fn test_entries_are_ordered_by_played_at() {
    let ledger = Ledger::in_memory().unwrap();
    for (id, secs) in [("c", 900), ("a", 0), ("b", 300)] {
        ledger
            .try_insert(&event(id, at(secs), PlaySource::RecentlyPlayed), &window())
            .unwrap();
    }

    let ids: Vec<String> = ledger
        .entries()
        .map(|e| e.unwrap().event.track_id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let newest = ledger.recent(2).unwrap();
    assert_eq!(newest[0].event.track_id, "c");
    assert_eq!(newest[1].event.track_id, "b");
}

#[test]
fn test_entries_cross_page_boundaries() {
    let ledger = Ledger::in_memory().unwrap();
    for i in 0..600 {
        ledger
            .try_insert(
                &event(&format!("t{i}"), at(i * 200), PlaySource::RecentlyPlayed),
                &window(),
            )
            .unwrap();
    }

    let entries: Vec<_> = ledger.entries().map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 600);
    assert!(
        entries
            .windows(2)
            .all(|w| w[0].event.played_at <= w[1].event.played_at)
    );
}

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("ledger.sqlite3");

    {
        let ledger = Ledger::open(&path).unwrap();
        ledger
            .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
            .unwrap();
        ledger
            .try_insert(&event("b", at(240), PlaySource::CurrentlyPlaying), &window())
            .unwrap();
    }

    let reopened = Ledger::open(&path).unwrap();
    assert_eq!(reopened.len().unwrap(), 2);
    assert_eq!(reopened.provisional_count().unwrap(), 1);
    assert_eq!(reopened.max_played_at().unwrap(), Some(at(0)));

    // replaying what was already stored adds nothing
    let again = reopened
        .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
        .unwrap();
    assert!(!again.is_write());
}

#[test]
fn test_concurrent_inserts_of_same_play_collapse() {
    let ledger = Arc::new(Ledger::in_memory().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                ledger
                    .try_insert(&event("a", at(0), PlaySource::RecentlyPlayed), &window())
                    .unwrap()
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| matches!(r, InsertResult::Accepted(_)))
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(ledger.len().unwrap(), 1);
}
