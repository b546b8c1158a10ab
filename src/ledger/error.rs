use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("ledger row {id} is corrupt: {reason}")]
    CorruptRow { id: i64, reason: String },

    #[error("cached artist {artist_id} is corrupt: {reason}")]
    CorruptArtist { artist_id: String, reason: String },

    #[error("ledger lock poisoned")]
    Poisoned,
}
