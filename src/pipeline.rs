use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::candidate_pool::build_candidate_pools;
use crate::config::SelectionConfig;
use crate::constraint::Constraint;
use crate::error::SquadError;
use crate::export::export_best_squad;
use crate::lineup::{BestSquad, resolve_starting_xi};
use crate::persist::{self, RunRecord};
use crate::prediction::{PlayerPrediction, ensure_unique, next_gameweek};
use crate::selector::{SearchStats, select_best_squad};
use crate::source;

#[derive(Debug, Clone)]
pub enum ConstraintOutcome {
    Selected {
        squad: BestSquad,
        stats: SearchStats,
        export: Option<PathBuf>,
    },
    /// Nothing satisfied the constraint, or the search budget ran out first.
    NoSquad { reason: String, stats: SearchStats },
}

#[derive(Debug, Clone)]
pub struct ConstraintReport {
    pub constraint: Constraint,
    pub outcome: ConstraintOutcome,
}

impl ConstraintReport {
    pub fn squad(&self) -> Option<&BestSquad> {
        match &self.outcome {
            ConstraintOutcome::Selected { squad, .. } => Some(squad),
            ConstraintOutcome::NoSquad { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionReport {
    pub gameweek: u32,
    pub pool_sizes: [usize; 4],
    pub search_space: u128,
    pub constraints: Vec<ConstraintReport>,
}

impl SelectionReport {
    pub fn get(&self, constraint: Constraint) -> Option<&ConstraintReport> {
        self.constraints.iter().find(|r| r.constraint == constraint)
    }
}

/// Loads predictions and the squad database named in `config`, then runs
/// every configured constraint.
pub fn run_selection(config: &SelectionConfig) -> Result<SelectionReport> {
    let predictions = source::load_predictions(&config.predictions_path)?;
    let mut conn = persist::open_db(&config.squad_db_path)?;
    select_and_store(&predictions, config, &mut conn)
}

/// Pools are built once; each constraint then goes through selection, XI
/// resolution, persistence and optional export. A constraint with no squad is
/// recorded and skipped; any other failure aborts the run.
pub fn select_and_store(
    predictions: &[PlayerPrediction],
    config: &SelectionConfig,
    conn: &mut Connection,
) -> Result<SelectionReport> {
    config.validate()?;
    ensure_unique(predictions)?;
    let gameweek = config
        .gameweek
        .unwrap_or_else(|| next_gameweek(predictions));
    let pools = build_candidate_pools(predictions, config.rows_to_check);
    let pool_sizes = pools.sizes();
    let search_space = pools.search_space();

    info!(
        gameweek,
        players = predictions.len(),
        rows_to_check = config.rows_to_check,
        gk = pool_sizes[0],
        def = pool_sizes[1],
        mid = pool_sizes[2],
        fwd = pool_sizes[3],
        search_space = %search_space,
        "candidate pools built"
    );
    if search_space > config.warn_search_space {
        warn!(
            search_space = %search_space,
            threshold = %config.warn_search_space,
            strategy = %config.strategy,
            "search space is large; consider lowering rows_to_check or setting a search budget"
        );
    }

    let mut constraints = Vec::with_capacity(config.constraints.len());
    for &constraint in &config.constraints {
        let started_at = Utc::now().to_rfc3339();
        let run = |stats: SearchStats| RunRecord {
            gameweek,
            constraint,
            strategy: config.strategy,
            rows_to_check: config.rows_to_check,
            stats,
            started_at: started_at.clone(),
        };

        let selection = match select_best_squad(&pools, constraint, config.strategy, config.budget)
        {
            Ok(selection) => selection,
            Err(err) if err.is_recoverable() => {
                let stats = match &err {
                    SquadError::SearchExhausted { evaluated } => SearchStats {
                        evaluated: *evaluated,
                        ..SearchStats::default()
                    },
                    _ => SearchStats {
                        complete: true,
                        ..SearchStats::default()
                    },
                };
                warn!(%constraint, error = %err, "no squad selected");
                persist::record_no_squad(conn, &run(stats))?;
                constraints.push(ConstraintReport {
                    constraint,
                    outcome: ConstraintOutcome::NoSquad {
                        reason: err.to_string(),
                        stats,
                    },
                });
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let squad = resolve_starting_xi(&selection.squad, constraint)?;
        info!(
            %constraint,
            formation = %squad.formation,
            total_value = squad.total_value,
            total_points = squad.total_points,
            total_prob = squad.total_prob,
            captain = squad.captain().map(|s| s.player.name.as_str()).unwrap_or_default(),
            "best squad selected"
        );

        persist::save_best_squad(conn, &squad, &run(selection.stats))
            .with_context(|| format!("persist {constraint} squad for gameweek {gameweek}"))?;

        let export = match &config.export_dir {
            Some(dir) => {
                let report = export_best_squad(dir, gameweek, &squad, &selection.stats)?;
                info!(path = %report.path.display(), players = report.players, "squad exported");
                Some(report.path)
            }
            None => None,
        };

        constraints.push(ConstraintReport {
            constraint,
            outcome: ConstraintOutcome::Selected {
                squad,
                stats: selection.stats,
                export,
            },
        });
    }

    Ok(SelectionReport {
        gameweek,
        pool_sizes,
        search_space,
        constraints,
    })
}
