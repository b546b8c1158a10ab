use std::time::Duration;

use thiserror::Error;

use crate::{export::ExportError, ledger::LedgerError};

use super::ApiError;

/// Why a polling cycle failed. None of these end the polling loop.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The provider rejected our credentials and a refresh did not help.
    #[error("unauthorized after credential refresh: {0}")]
    Unauthorized(String),

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("transient network error: {0}")]
    Transient(String),

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    #[error("export failure: {0}")]
    Export(#[from] ExportError),
}

impl From<ApiError> for TrackerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(reason) => TrackerError::Unauthorized(reason),
            ApiError::RateLimited { retry_after } => TrackerError::RateLimited { retry_after },
            ApiError::Transient(reason) => TrackerError::Transient(reason),
        }
    }
}
