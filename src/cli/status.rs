use tabled::Table;

use crate::{
    config::TrackerSettings,
    error, info,
    ledger::{Ledger, LedgerError},
    types::PlayTableRow,
    utils, warning,
};

pub async fn status(limit: usize) {
    let settings = match TrackerSettings::from_env() {
        Ok(s) => s,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    if !settings.ledger_path.exists() {
        warning!(
            "No ledger at {} yet. Run `playlog track` first.",
            settings.ledger_path.display()
        );
        return;
    }

    let ledger = match Ledger::open(&settings.ledger_path) {
        Ok(l) => l,
        Err(e) => error!(
            "Cannot open ledger {}. Err: {}",
            settings.ledger_path.display(),
            e
        ),
    };

    if let Err(e) = print_status(&ledger, &settings, limit) {
        error!("Cannot read ledger. Err: {}", e);
    }
}

fn print_status(
    ledger: &Ledger,
    settings: &TrackerSettings,
    limit: usize,
) -> Result<(), LedgerError> {
    let total = ledger.len()?;
    let provisional = ledger.provisional_count()?;

    info!("Ledger: {}", settings.ledger_path.display());
    info!("Export: {}", settings.export_path.display());
    info!(
        "{} plays recorded, {} not yet confirmed by play history",
        total, provisional
    );

    match ledger.max_played_at()? {
        Some(at) => info!("Last confirmed play at {}", at.to_rfc3339()),
        None => info!("No confirmed plays yet"),
    }

    let rows: Vec<PlayTableRow> = ledger
        .recent(limit)?
        .into_iter()
        .map(|entry| PlayTableRow {
            played_at: entry
                .event
                .played_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            track: entry.event.track_name,
            artist: entry.event.artist_name,
            album: entry.event.album_name,
            duration: utils::format_duration_ms(entry.event.duration_ms),
            source: entry.event.source.to_string(),
        })
        .collect();

    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }

    Ok(())
}
