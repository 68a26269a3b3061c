use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::constraint::Constraint;
use crate::lineup::{BestSquad, SquadRole};
use crate::prediction::{PlayerPrediction, PredictionRecord, ensure_unique};
use crate::selector::{SearchStats, SearchStrategy};

/// How a selection run for one constraint ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Found,
    Partial,
    NoSquad,
}

impl RunStatus {
    pub fn code(&self) -> &'static str {
        match self {
            RunStatus::Found => "found",
            RunStatus::Partial => "partial",
            RunStatus::NoSquad => "no_squad",
        }
    }
}

/// Run metadata stored next to each persisted squad.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub gameweek: u32,
    pub constraint: Constraint,
    pub strategy: SearchStrategy,
    pub rows_to_check: usize,
    pub stats: SearchStats,
    pub started_at: String,
}

/// One `best_squads` row read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSlot {
    pub slot: u32,
    pub role: SquadRole,
    pub captain: bool,
    pub player: PlayerPrediction,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            name TEXT NOT NULL,
            position TEXT NOT NULL,
            team TEXT NOT NULL,
            cost INTEGER NOT NULL,
            predicted_point_range INTEGER NOT NULL,
            prob_0 REAL NOT NULL,
            prob_1 REAL NOT NULL,
            prob_2 REAL NOT NULL,
            prob_3 REAL NOT NULL,
            round INTEGER NULL,
            opponent TEXT NULL,
            imported_at TEXT NOT NULL,
            PRIMARY KEY (name, team)
        );

        CREATE TABLE IF NOT EXISTS best_squads (
            gameweek INTEGER NOT NULL,
            constraint_name TEXT NOT NULL,
            slot INTEGER NOT NULL,
            role TEXT NOT NULL,
            position TEXT NOT NULL,
            name TEXT NOT NULL,
            team TEXT NOT NULL,
            cost INTEGER NOT NULL,
            predicted_point_range INTEGER NOT NULL,
            prob_0 REAL NOT NULL,
            prob_1 REAL NOT NULL,
            prob_2 REAL NOT NULL,
            prob_3 REAL NOT NULL,
            captain INTEGER NOT NULL,
            PRIMARY KEY (gameweek, constraint_name, slot)
        );

        CREATE TABLE IF NOT EXISTS selection_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            gameweek INTEGER NOT NULL,
            constraint_name TEXT NOT NULL,
            strategy TEXT NOT NULL,
            rows_to_check INTEGER NOT NULL,
            status TEXT NOT NULL,
            formation TEXT NULL,
            total_value INTEGER NULL,
            total_points INTEGER NULL,
            total_prob REAL NULL,
            evaluated INTEGER NOT NULL,
            accepted INTEGER NOT NULL,
            pruned INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_gameweek ON selection_runs(gameweek, constraint_name);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Replaces the stored prediction batch with `predictions`.
pub fn replace_predictions(conn: &mut Connection, predictions: &[PlayerPrediction]) -> Result<usize> {
    let imported_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin predictions transaction")?;
    tx.execute("DELETE FROM predictions", [])
        .context("clear predictions")?;
    for p in predictions {
        tx.execute(
            "INSERT INTO predictions(name, position, team, cost, predicted_point_range,
                                     prob_0, prob_1, prob_2, prob_3, round, opponent, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(name, team) DO UPDATE SET
                position = excluded.position,
                cost = excluded.cost,
                predicted_point_range = excluded.predicted_point_range,
                prob_0 = excluded.prob_0,
                prob_1 = excluded.prob_1,
                prob_2 = excluded.prob_2,
                prob_3 = excluded.prob_3,
                round = excluded.round,
                opponent = excluded.opponent,
                imported_at = excluded.imported_at",
            params![
                p.name,
                p.position.code(),
                p.team,
                p.cost as i64,
                p.predicted_point_range as i64,
                p.prob_0,
                p.prob_1,
                p.prob_2,
                p.prob_3,
                p.round.map(i64::from),
                p.opponent,
                imported_at
            ],
        )
        .with_context(|| format!("insert prediction {}", p.name))?;
    }
    tx.commit().context("commit predictions transaction")?;
    Ok(predictions.len())
}

/// Reads and validates every stored prediction.
pub fn load_predictions(conn: &Connection) -> Result<Vec<PlayerPrediction>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT name, position, team, cost, predicted_point_range,
                   prob_0, prob_1, prob_2, prob_3, round, opponent
            FROM predictions
            ORDER BY name ASC, team ASC
            "#,
        )
        .context("prepare load predictions query")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(PredictionRecord {
                name: row.get(0)?,
                position: row.get(1)?,
                team: row.get(2)?,
                cost: row.get(3)?,
                predicted_point_range: row.get(4)?,
                prob_0: row.get(5)?,
                prob_1: row.get(6)?,
                prob_2: row.get(7)?,
                prob_3: row.get(8)?,
                round: row.get(9)?,
                opponent: row.get(10)?,
            })
        })
        .context("query load predictions")?;

    let mut out = Vec::new();
    for row in rows {
        let record = row.context("decode prediction row")?;
        out.push(PlayerPrediction::try_from(record)?);
    }
    ensure_unique(&out)?;
    Ok(out)
}

/// Stores a squad, replacing any earlier squad for the same gameweek and
/// constraint, and logs the run. Returns the run id.
pub fn save_best_squad(conn: &mut Connection, squad: &BestSquad, run: &RunRecord) -> Result<i64> {
    let tx = conn.transaction().context("begin squad transaction")?;
    tx.execute(
        "DELETE FROM best_squads WHERE gameweek = ?1 AND constraint_name = ?2",
        params![run.gameweek as i64, squad.constraint.code()],
    )
    .context("clear previous squad")?;

    for (slot, entry) in squad.slots.iter().enumerate() {
        let p = &entry.player;
        tx.execute(
            "INSERT INTO best_squads(gameweek, constraint_name, slot, role, position, name, team,
                                     cost, predicted_point_range, prob_0, prob_1, prob_2, prob_3, captain)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                run.gameweek as i64,
                squad.constraint.code(),
                slot as i64,
                entry.role.label(),
                p.position.code(),
                p.name,
                p.team,
                p.cost as i64,
                p.predicted_point_range as i64,
                p.prob_0,
                p.prob_1,
                p.prob_2,
                p.prob_3,
                entry.captain as i64
            ],
        )
        .with_context(|| format!("insert squad slot {slot}"))?;
    }

    let status = if run.stats.complete {
        RunStatus::Found
    } else {
        RunStatus::Partial
    };
    let run_id = insert_run(&tx, run, status, Some(squad))?;
    tx.commit().context("commit squad transaction")?;
    Ok(run_id)
}

/// Records that no squad satisfied the constraint.
pub fn record_no_squad(conn: &Connection, run: &RunRecord) -> Result<i64> {
    insert_run(conn, run, RunStatus::NoSquad, None)
}

fn insert_run(
    conn: &Connection,
    run: &RunRecord,
    status: RunStatus,
    squad: Option<&BestSquad>,
) -> Result<i64> {
    let finished_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO selection_runs(gameweek, constraint_name, strategy, rows_to_check, status,
                                    formation, total_value, total_points, total_prob,
                                    evaluated, accepted, pruned, started_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            run.gameweek as i64,
            run.constraint.code(),
            run.strategy.code(),
            run.rows_to_check as i64,
            status.code(),
            squad.map(|s| s.formation.to_string()),
            squad.map(|s| s.total_value as i64),
            squad.map(|s| s.total_points as i64),
            squad.map(|s| s.total_prob),
            run.stats.evaluated as i64,
            run.stats.accepted as i64,
            run.stats.pruned as i64,
            run.started_at,
            finished_at
        ],
    )
    .context("insert selection run")?;
    Ok(conn.last_insert_rowid())
}

/// Status of the latest run for a gameweek and constraint, if any.
pub fn latest_run_status(
    conn: &Connection,
    gameweek: u32,
    constraint: Constraint,
) -> Result<Option<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT status FROM selection_runs
             WHERE gameweek = ?1 AND constraint_name = ?2
             ORDER BY run_id DESC LIMIT 1",
        )
        .context("prepare latest run query")?;
    let mut rows = stmt
        .query(params![gameweek as i64, constraint.code()])
        .context("query latest run")?;
    match rows.next().context("read latest run")? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

pub fn load_best_squad(
    conn: &Connection,
    gameweek: u32,
    constraint: Constraint,
) -> Result<Vec<StoredSlot>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT slot, role, position, name, team, cost, predicted_point_range,
                   prob_0, prob_1, prob_2, prob_3, captain
            FROM best_squads
            WHERE gameweek = ?1 AND constraint_name = ?2
            ORDER BY slot ASC
            "#,
        )
        .context("prepare load squad query")?;

    let rows = stmt
        .query_map(params![gameweek as i64, constraint.code()], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                PredictionRecord {
                    position: row.get(2)?,
                    name: row.get(3)?,
                    team: row.get(4)?,
                    cost: row.get(5)?,
                    predicted_point_range: row.get(6)?,
                    prob_0: row.get(7)?,
                    prob_1: row.get(8)?,
                    prob_2: row.get(9)?,
                    prob_3: row.get(10)?,
                    round: None,
                    opponent: None,
                },
                row.get::<_, i64>(11)? != 0,
            ))
        })
        .context("query load squad")?;

    let mut out = Vec::new();
    for row in rows {
        let (slot, role, record, captain) = row.context("decode squad row")?;
        let role = SquadRole::from_label(&role)
            .ok_or_else(|| anyhow!("unknown squad role '{role}' in slot {slot}"))?;
        out.push(StoredSlot {
            slot,
            role,
            captain,
            player: PlayerPrediction::try_from(record)?,
        });
    }
    Ok(out)
}
