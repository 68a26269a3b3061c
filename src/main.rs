use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fpl_squad::config::{SelectionConfig, load_dotenv, squad_db_path_from_env};
use fpl_squad::constraint::Constraint;
use fpl_squad::lineup::BestSquad;
use fpl_squad::persist;
use fpl_squad::pipeline::{ConstraintOutcome, run_selection};
use fpl_squad::selector::SearchStrategy;
use fpl_squad::source;

#[derive(Parser)]
#[command(name = "fpl_squad")]
#[command(about = "Pick the best Fantasy Premier League squad from point predictions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select, persist and optionally export the best squad per constraint
    Select {
        /// Predictions file (.json, or a SQLite database)
        #[arg(long)]
        predictions: Option<PathBuf>,
        /// Squad database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Write one .xlsx per constraint under this directory
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Candidates kept per position
        #[arg(long)]
        rows: Option<usize>,
        /// budget, team, all or none (repeatable or comma separated)
        #[arg(long, value_delimiter = ',')]
        constraint: Vec<String>,
        /// branch-and-bound or exhaustive
        #[arg(long)]
        strategy: Option<SearchStrategy>,
        #[arg(long)]
        max_candidates: Option<u64>,
        #[arg(long)]
        time_limit_secs: Option<f64>,
        #[arg(long)]
        gameweek: Option<u32>,
    },
    /// Import JSON predictions into the SQLite predictions table
    Import {
        /// JSON predictions file
        input: PathBuf,
        /// Target database (defaults to the squad database)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print a persisted squad
    Show {
        #[arg(long)]
        gameweek: u32,
        #[arg(long, default_value = "all")]
        constraint: Constraint,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fpl_squad=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Select {
            predictions,
            db,
            export_dir,
            rows,
            constraint,
            strategy,
            max_candidates,
            time_limit_secs,
            gameweek,
        } => {
            let mut config = SelectionConfig::from_env()?;
            if let Some(path) = predictions {
                config.predictions_path = path;
            }
            if let Some(path) = db {
                config.squad_db_path = path;
            }
            if export_dir.is_some() {
                config.export_dir = export_dir;
            }
            if let Some(rows) = rows {
                config.rows_to_check = rows;
            }
            if !constraint.is_empty() {
                config.constraints = Constraint::parse_list(&constraint.join(","))?;
            }
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if max_candidates.is_some() {
                config.budget.max_candidates = max_candidates;
            }
            if let Some(secs) = time_limit_secs {
                config.budget.time_limit = Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| anyhow!("invalid --time-limit-secs {secs}: {e}"))?,
                );
            }
            if gameweek.is_some() {
                config.gameweek = gameweek;
            }
            select(&config)
        }
        Commands::Import { input, db } => {
            let db = db.unwrap_or_else(squad_db_path_from_env);
            let stored = source::import_predictions(&input, &db)?;
            println!("Imported {stored} predictions into {}", db.display());
            Ok(())
        }
        Commands::Show {
            gameweek,
            constraint,
            db,
        } => {
            let db = db.unwrap_or_else(squad_db_path_from_env);
            show(&db, gameweek, constraint)
        }
    }
}

fn select(config: &SelectionConfig) -> Result<()> {
    let report = run_selection(config)?;
    println!(
        "Gameweek {}  pools GK/DEF/MID/FWD = {:?}  search space {}",
        report.gameweek, report.pool_sizes, report.search_space
    );
    for entry in &report.constraints {
        println!();
        match &entry.outcome {
            ConstraintOutcome::Selected {
                squad,
                stats,
                export,
            } => {
                print_squad(squad);
                println!(
                    "  evaluated {}  pruned {}{}",
                    stats.evaluated,
                    stats.pruned,
                    if stats.complete { "" } else { "  (partial)" }
                );
                if let Some(path) = export {
                    println!("  exported to {}", path.display());
                }
            }
            ConstraintOutcome::NoSquad { reason, .. } => {
                println!("[{}] {reason}", entry.constraint);
            }
        }
    }
    Ok(())
}

fn print_squad(squad: &BestSquad) {
    println!(
        "[{}] {}  value £{:.1}m  points {}  prob {:.3}",
        squad.constraint,
        squad.formation,
        f64::from(squad.total_value) / 10.0,
        squad.total_points,
        squad.total_prob
    );
    println!(
        "  {:<6} {:<4} {:<24} {:<16} {:>6} {:>5} {:>6}",
        "role", "pos", "name", "team", "cost", "class", "p3"
    );
    for slot in &squad.slots {
        let p = &slot.player;
        println!(
            "  {:<6} {:<4} {:<24} {:<16} {:>6.1} {:>5} {:>6.3}{}",
            slot.role.label(),
            p.position.code(),
            p.name,
            p.team,
            p.cost_millions(),
            p.predicted_point_range,
            p.prob_3,
            if slot.captain { "  (C)" } else { "" }
        );
    }
}

fn show(db: &std::path::Path, gameweek: u32, constraint: Constraint) -> Result<()> {
    let conn = persist::open_db(db)?;
    let slots = persist::load_best_squad(&conn, gameweek, constraint)
        .with_context(|| format!("load {constraint} squad for gameweek {gameweek}"))?;
    if slots.is_empty() {
        match persist::latest_run_status(&conn, gameweek, constraint)? {
            Some(status) => println!("[{constraint}] gameweek {gameweek}: last run {status}"),
            None => println!("[{constraint}] gameweek {gameweek}: no squad stored"),
        }
        return Ok(());
    }
    println!("[{constraint}] gameweek {gameweek}");
    for slot in slots {
        let p = &slot.player;
        println!(
            "  {:<6} {:<4} {:<24} {:<16} {:>6.1} {:>5} {:>6.3}{}",
            slot.role.label(),
            p.position.code(),
            p.name,
            p.team,
            p.cost_millions(),
            p.predicted_point_range,
            p.prob_3,
            if slot.captain { "  (C)" } else { "" }
        );
    }
    Ok(())
}
