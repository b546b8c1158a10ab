//! # CLI Module
//!
//! User-facing commands of playlog. Each command loads its configuration from
//! the environment, wires the library pieces together and reports progress
//! with the crate's output macros. Unrecoverable setup problems (missing
//! credentials, unreadable ledger) end the process through [`crate::error!`];
//! once tracking runs, failures are logged and retried instead.
//!
//! ## Commands
//!
//! - [`auth`] - Authorize with Spotify through the OAuth 2.0 PKCE flow
//! - [`track`] - Poll playback until interrupted, recording and exporting plays
//! - [`export`] - Write the spreadsheet export once from the current ledger
//! - [`status`] - Show ledger statistics and the most recent plays
//!
//! ## Usage Patterns
//!
//! ```bash
//! playlog auth            # authorize once
//! playlog track           # run until Ctrl-C
//! playlog status --limit 20
//! playlog export --output ~/plays.csv
//! ```

mod auth;
mod export;
mod status;
mod track;

pub use auth::auth;
pub use export::export;
pub use status::status;
pub use track::{stop_on_interrupt, track};
