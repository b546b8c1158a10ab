use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS plays (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id TEXT NOT NULL,
    track_name TEXT NOT NULL DEFAULT '',
    artist_name TEXT NOT NULL DEFAULT '',
    album_name TEXT NOT NULL DEFAULT '',
    played_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL CHECK (source IN ('currently_playing', 'recently_played')),
    album_id TEXT NOT NULL DEFAULT '',
    artist_ids TEXT NOT NULL DEFAULT '',
    primary_artist_id TEXT NOT NULL DEFAULT '',
    track_url TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS plays_track_played_at ON plays (track_id, played_at);
CREATE INDEX IF NOT EXISTS plays_played_at_id ON plays (played_at, id);
CREATE INDEX IF NOT EXISTS plays_primary_artist ON plays (primary_artist_id);

-- genres are a JSON array
CREATE TABLE IF NOT EXISTS artists (
    artist_id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT '',
    genres TEXT NOT NULL DEFAULT '[]',
    fetched_at INTEGER NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
