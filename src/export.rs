use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::lineup::BestSquad;
use crate::selector::SearchStats;

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    pub players: usize,
}

/// `<export_dir>/<gameweek>/best_squad_<constraint>.xlsx`
pub fn squad_export_path(export_dir: &Path, gameweek: u32, squad: &BestSquad) -> PathBuf {
    export_dir
        .join(gameweek.to_string())
        .join(format!("best_squad_{}.xlsx", squad.constraint.code()))
}

/// Writes the squad sheet (starters then bench) and a run summary sheet.
pub fn export_best_squad(
    export_dir: &Path,
    gameweek: u32,
    squad: &BestSquad,
    stats: &SearchStats,
) -> Result<ExportReport> {
    let path = squad_export_path(export_dir, gameweek, squad);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }

    let squad_rows = squad_rows(squad);
    let summary_rows = summary_rows(gameweek, squad, stats);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Squad")?;
        write_rows(sheet, &squad_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        write_rows(sheet, &summary_rows)?;
    }

    workbook
        .save(&path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        path,
        players: squad_rows.len().saturating_sub(1),
    })
}

fn squad_rows(squad: &BestSquad) -> Vec<Vec<String>> {
    let mut rows = vec![
        [
            "role",
            "position",
            "name",
            "team",
            "cost_m",
            "predicted_point_range",
            "prob_0",
            "prob_1",
            "prob_2",
            "prob_3",
            "captain",
            "opponent",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    ];
    for slot in &squad.slots {
        let p = &slot.player;
        rows.push(vec![
            slot.role.label(),
            p.position.code().to_string(),
            p.name.clone(),
            p.team.clone(),
            format!("{:.1}", p.cost_millions()),
            p.predicted_point_range.to_string(),
            format!("{:.4}", p.prob_0),
            format!("{:.4}", p.prob_1),
            format!("{:.4}", p.prob_2),
            format!("{:.4}", p.prob_3),
            if slot.captain { "C" } else { "" }.to_string(),
            opt_to_string(p.opponent.as_deref()),
        ]);
    }
    rows
}

fn summary_rows(gameweek: u32, squad: &BestSquad, stats: &SearchStats) -> Vec<Vec<String>> {
    let pair = |k: &str, v: String| vec![k.to_string(), v];
    vec![
        pair("gameweek", gameweek.to_string()),
        pair("constraint", squad.constraint.code().to_string()),
        pair("formation", squad.formation.to_string()),
        pair("total_value_m", format!("{:.1}", f64::from(squad.total_value) / 10.0)),
        pair("total_points", squad.total_points.to_string()),
        pair("total_prob", format!("{:.4}", squad.total_prob)),
        pair("starting_points", squad.starting_points.to_string()),
        pair("starting_prob", format!("{:.4}", squad.starting_prob)),
        pair(
            "captain",
            opt_to_string(squad.captain().map(|s| s.player.name.as_str())),
        ),
        pair("evaluated", stats.evaluated.to_string()),
        pair("pruned", stats.pruned.to_string()),
        pair("complete", stats.complete.to_string()),
    ]
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
