//! Where predictions come from: a JSON dump of the scoring stage or the
//! `predictions` table of a SQLite database.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::persist;
use crate::prediction::{PlayerPrediction, PredictionRecord, ensure_unique};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Json,
    Sqlite,
}

impl SourceKind {
    /// `.json` files are read as JSON; anything else is opened as SQLite.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => SourceKind::Json,
            _ => SourceKind::Sqlite,
        }
    }
}

pub fn load_predictions(path: &Path) -> Result<Vec<PlayerPrediction>> {
    let predictions = match SourceKind::from_path(path) {
        SourceKind::Json => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read predictions {}", path.display()))?;
            parse_predictions_json(&raw)
                .with_context(|| format!("parse predictions {}", path.display()))?
        }
        SourceKind::Sqlite => {
            if !path.exists() {
                anyhow::bail!("predictions database {} does not exist", path.display());
            }
            let conn = persist::open_db(path)?;
            persist::load_predictions(&conn)
                .with_context(|| format!("load predictions from {}", path.display()))?
        }
    };
    info!(
        path = %path.display(),
        players = predictions.len(),
        "loaded predictions"
    );
    Ok(predictions)
}

/// Parses a JSON array of prediction records, validating each one.
pub fn parse_predictions_json(raw: &str) -> Result<Vec<PlayerPrediction>> {
    let records: Vec<PredictionRecord> =
        serde_json::from_str(raw).context("decode prediction records")?;
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        out.push(PlayerPrediction::try_from(record)?);
    }
    ensure_unique(&out)?;
    Ok(out)
}

/// Copies a JSON prediction dump into the `predictions` table of `db_path`,
/// replacing whatever batch was stored before.
pub fn import_predictions(json_path: &Path, db_path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("read predictions {}", json_path.display()))?;
    let predictions = parse_predictions_json(&raw)
        .with_context(|| format!("parse predictions {}", json_path.display()))?;
    let mut conn = persist::open_db(db_path)?;
    let stored = persist::replace_predictions(&mut conn, &predictions)?;
    debug!(stored, db = %db_path.display(), "imported predictions");
    Ok(stored)
}
