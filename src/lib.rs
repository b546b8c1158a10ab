//! Spotify Listening History Tracker Library
//!
//! This library polls the Spotify Web API for what the user is listening to,
//! keeps a durable, duplicate-free log of every observed play and writes that
//! log out as a spreadsheet (CSV) file.
//!
//! # Modules
//!
//! - `api` - HTTP API endpoints for the local callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `export` - Spreadsheet export of the play ledger
//! - `ledger` - SQLite backed, deduplicating play ledger
//! - `management` - Credential storage and token lifecycle
//! - `model` - Play events and raw playback records
//! - `normalize` - Conversion of raw playback records into play events
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Spotify Web API client implementation
//! - `tracker` - The polling loop and its state machine
//! - `types` - Wire types and table rows
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use playlog::{config, cli};
//!
//! #[tokio::main]
//! async fn main() -> playlog::Res<()> {
//!     config::load_env().await?;
//!     cli::track().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod export;
pub mod ledger;
pub mod management;
pub mod model;
pub mod normalize;
pub mod server;
pub mod spotify;
pub mod tracker;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Provides a standard error handling pattern for the command layer using a
/// boxed dynamic error trait object. Library modules return their own typed
/// errors which convert into this through `?`.
///
/// # Type Parameters
///
/// - `T` - The success type returned on successful operations
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// Creates a formatted output line with a distinctive blue "o" indicator
/// followed by the provided message. Used for general information and
/// status updates throughout the application.
///
/// # Example
///
/// ```
/// info!("Polling every {} seconds", interval);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// Used to provide positive feedback when operations complete successfully,
/// e.g. when a play was recorded or an export finished.
///
/// # Example
///
/// ```
/// success!("Recorded {} by {}", track, artist);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Creates a formatted error output with a red "!" indicator and immediately
/// terminates the program with exit code 1.
///
/// # Behavior
///
/// This macro will cause the program to exit immediately after printing
/// the error message. It is reserved for startup failures (missing
/// configuration, unreadable ledger, no stored token). Failures inside the
/// polling loop are reported with [`warning!`] and never end the process.
///
/// # Example
///
/// ```
/// error!("Missing required environment variable: {}", var_name);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable issues: skipped records, history gaps, backoff
/// decisions and failed cycles.
///
/// # Example
///
/// ```
/// warning!("Rate limited, retrying in {}s", secs);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a dimmed diagnostic line when `PLAYLOG_DEBUG` is set.
#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => ({
    if std::env::var_os("PLAYLOG_DEBUG").is_some() {
      use colored::Colorize;
      println!("[{}] {}", "·".dimmed(), format!($($arg)*).dimmed());
    }
  })
}
