use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{config::SpotifySettings, error, spotify, types::PkceToken};

pub async fn auth(shared_state: Arc<Mutex<Option<PkceToken>>>) {
    let settings = match SpotifySettings::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => error!("Invalid configuration: {}", e),
    };

    spotify::auth::auth(settings, shared_state).await;
}
