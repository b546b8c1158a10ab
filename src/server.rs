use axum::{Extension, Router, routing::get};
use std::{io, net::SocketAddr, str::FromStr, sync::Arc};
use tokio::sync::Mutex;

use crate::{api, config::SpotifySettings, types::PkceToken};

/// Routes of the local callback server. The shared PKCE state and the
/// settings reach the callback handler as request extensions.
pub fn router(state: Arc<Mutex<Option<PkceToken>>>, settings: Arc<SpotifySettings>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback))
        .layer(Extension(state))
        .layer(Extension(settings))
}

/// Serves the OAuth callback and a health endpoint until the process exits.
pub async fn start_api_server(
    state: Arc<Mutex<Option<PkceToken>>>,
    settings: Arc<SpotifySettings>,
) -> Result<(), io::Error> {
    let addr = SocketAddr::from_str(&settings.server_address).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid server address {}: {e}", settings.server_address),
        )
    })?;

    let app = router(state, settings);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
