use std::path::PathBuf;

use crate::{
    config::TrackerSettings, error, export::CsvExporter, info, ledger::Ledger, success,
};

pub async fn export(output: Option<PathBuf>) {
    let settings = match TrackerSettings::from_env() {
        Ok(s) => s,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    let ledger = match Ledger::open(&settings.ledger_path) {
        Ok(l) => l,
        Err(e) => error!(
            "Cannot open ledger {}. Err: {}",
            settings.ledger_path.display(),
            e
        ),
    };

    let exporter = CsvExporter::new(output.unwrap_or(settings.export_path));
    match exporter.write(&ledger).await {
        Ok(summary) => {
            success!(
                "Exported {} plays to {}",
                summary.rows,
                summary.path.display()
            );
            for sheet in &summary.sheets {
                info!("Wrote {}", sheet.display());
            }
        }
        Err(e) => error!("Export failed. Err: {}", e),
    }
}
