use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::{SpotifySettings, TrackerSettings},
    error,
    export::CsvExporter,
    info,
    ledger::Ledger,
    management::TokenManager,
    spotify::SpotifyClient,
    tracker::Tracker,
    warning,
};

/// Runs the tracker in the foreground until Ctrl-C.
pub async fn track() {
    let spotify_settings = match SpotifySettings::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => error!("Invalid configuration: {}", e),
    };
    let settings = match TrackerSettings::from_env() {
        Ok(s) => s,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    let ledger = match Ledger::open(&settings.ledger_path) {
        Ok(l) => Arc::new(l),
        Err(e) => error!(
            "Cannot open ledger {}. Err: {}",
            settings.ledger_path.display(),
            e
        ),
    };

    let tokens = match TokenManager::load().await {
        Ok(t) => t,
        Err(e) => error!("Failed to load token. Err: {}", e),
    };

    let client = match SpotifyClient::new(spotify_settings, &settings, tokens) {
        Ok(c) => c,
        Err(e) => error!("Cannot build HTTP client. Err: {}", e),
    };

    let exporter = CsvExporter::new(settings.export_path.clone());
    let tracker = Tracker::new(client, exporter, Arc::clone(&ledger), settings);

    let mut state = match tracker.resume_state() {
        Ok(s) => s,
        Err(e) => error!("Cannot read ledger. Err: {}", e),
    };
    if let Some(cursor) = state.cursor {
        info!("Resuming after {}", cursor.to_rfc3339());
    }

    let stop = CancellationToken::new();
    tokio::spawn(stop_on_interrupt(tokio::signal::ctrl_c(), stop.clone()));

    tracker.run(&mut state, stop).await;
}

/// Cancels `signal` once `interrupt` reports Ctrl-C. When the handler cannot
/// be installed the tracker keeps running.
pub async fn stop_on_interrupt<F>(interrupt: F, signal: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match interrupt.await {
        Ok(()) => {
            info!("Interrupt received, finishing current cycle");
            signal.cancel();
        }
        Err(e) => warning!("Cannot listen for Ctrl-C, tracking without it: {}", e),
    }
}
