//! # API Module
//!
//! HTTP endpoints served by the short-lived local server that `playlog auth`
//! starts.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the authorization code from Spotify's consent
//!   page and exchanges it, together with the PKCE code verifier, for tokens.
//! - [`health`] - Reports status and version; useful to check that the
//!   callback server is reachable before authorizing.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use playlog::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
