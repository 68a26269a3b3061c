use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use fpl_squad::config::SelectionConfig;
use fpl_squad::constraint::Constraint;
use fpl_squad::lineup::SquadRole;
use fpl_squad::SquadError;
use fpl_squad::persist::{self, init_schema, latest_run_status, load_best_squad};
use fpl_squad::pipeline::{ConstraintOutcome, run_selection, select_and_store};
use fpl_squad::prediction::{PlayerPrediction, Position};
use fpl_squad::source::{import_predictions, load_predictions, parse_predictions_json};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn fixture_predictions() -> Vec<PlayerPrediction> {
    let raw = fs::read_to_string(fixture_path("predictions_small.json"))
        .expect("fixture file should be readable");
    parse_predictions_json(&raw).expect("fixture should parse")
}

fn memory_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory sqlite");
    init_schema(&conn).expect("schema");
    conn
}

fn scratch_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fpl_squad_{test}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn config_for(constraints: Vec<Constraint>) -> SelectionConfig {
    SelectionConfig {
        constraints,
        gameweek: None,
        export_dir: None,
        ..SelectionConfig::default()
    }
}

#[test]
fn stored_squad_reads_back_in_slot_order() {
    let predictions = fixture_predictions();
    let mut conn = memory_db();
    let report = select_and_store(
        &predictions,
        &config_for(vec![Constraint::All, Constraint::Unconstrained]),
        &mut conn,
    )
    .expect("selection should succeed");

    assert_eq!(report.gameweek, 8, "fixture rounds are 7");
    for constraint in [Constraint::All, Constraint::Unconstrained] {
        let squad = report
            .get(constraint)
            .and_then(|r| r.squad())
            .expect("squad selected");
        let stored = load_best_squad(&conn, report.gameweek, constraint).unwrap();
        assert_eq!(stored.len(), 15);

        let roles: Vec<SquadRole> = stored.iter().map(|s| s.role).collect();
        let expected: Vec<SquadRole> = squad.slots.iter().map(|s| s.role).collect();
        assert_eq!(roles, expected);
        assert_eq!(stored[11].role, SquadRole::SubGoalkeeper);
        assert_eq!(stored[14].role, SquadRole::Sub(3));

        let captain = stored.iter().find(|s| s.captain).expect("one captain");
        assert_eq!(
            Some(captain.player.name.as_str()),
            squad.captain().map(|s| s.player.name.as_str())
        );
        let total: u32 = stored.iter().map(|s| s.player.cost).sum();
        assert_eq!(total, squad.total_value);
        assert_eq!(
            latest_run_status(&conn, report.gameweek, constraint).unwrap().as_deref(),
            Some("found")
        );
    }
}

#[test]
fn rerunning_a_gameweek_replaces_its_rows() {
    let predictions = fixture_predictions();
    let mut conn = memory_db();
    let config = SelectionConfig {
        gameweek: Some(12),
        ..config_for(vec![Constraint::Budget])
    };
    select_and_store(&predictions, &config, &mut conn).unwrap();
    select_and_store(&predictions, &config, &mut conn).unwrap();

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM best_squads WHERE gameweek = 12 AND constraint_name = 'budget'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 15);
    let runs: i64 = conn
        .query_row("SELECT COUNT(*) FROM selection_runs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(runs, 2);
}

#[test]
fn constraint_without_squad_is_recorded_and_run_continues() {
    // Drop every forward but two: no 2/5/5/3 squad exists.
    let mut predictions = fixture_predictions();
    let mut forwards = 0;
    predictions.retain(|p| {
        if p.position != Position::Forward {
            return true;
        }
        forwards += 1;
        forwards <= 2
    });
    let mut conn = memory_db();
    let report = select_and_store(
        &predictions,
        &config_for(vec![Constraint::Budget, Constraint::Unconstrained]),
        &mut conn,
    )
    .expect("no squad is not fatal");

    assert_eq!(report.constraints.len(), 2);
    for entry in &report.constraints {
        assert!(matches!(entry.outcome, ConstraintOutcome::NoSquad { .. }));
        assert!(load_best_squad(&conn, report.gameweek, entry.constraint)
            .unwrap()
            .is_empty());
        assert_eq!(
            latest_run_status(&conn, report.gameweek, entry.constraint)
                .unwrap()
                .as_deref(),
            Some("no_squad")
        );
    }
}

#[test]
fn import_then_select_from_sqlite_with_export() {
    let dir = scratch_dir("import_select");
    let source_db = dir.join("predictions.sqlite");
    let stored = import_predictions(&fixture_path("predictions_small.json"), &source_db).unwrap();
    assert_eq!(stored, 23);

    let mut from_json = fixture_predictions();
    let mut from_db = load_predictions(&source_db).unwrap();
    let key = |p: &PlayerPrediction| (p.name.clone(), p.team.clone());
    from_json.sort_by_key(key);
    from_db.sort_by_key(key);
    assert_eq!(from_json, from_db);

    let config = SelectionConfig {
        predictions_path: source_db,
        squad_db_path: dir.join("squads.sqlite"),
        export_dir: Some(dir.join("exports")),
        ..config_for(vec![Constraint::All])
    };
    let report = run_selection(&config).unwrap();
    let Some(ConstraintOutcome::Selected { export, .. }) =
        report.get(Constraint::All).map(|r| &r.outcome)
    else {
        panic!("expected a squad under all constraints");
    };
    let export = export.as_ref().expect("export path");
    assert_eq!(
        export,
        &dir.join("exports").join("8").join("best_squad_all.xlsx")
    );
    assert!(export.exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn repeated_player_is_rejected_before_selection() {
    let mut predictions = fixture_predictions();
    let mut twin = predictions[0].clone();
    twin.cost += 5;
    predictions.push(twin);
    let mut conn = memory_db();
    let err = select_and_store(&predictions, &config_for(vec![Constraint::All]), &mut conn)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquadError>(),
        Some(SquadError::InvalidPrediction { name, .. }) if *name == predictions[0].name
    ));
    let runs: i64 = conn
        .query_row("SELECT COUNT(*) FROM selection_runs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(runs, 0);
}

#[test]
fn repeated_player_in_foreign_table_is_rejected() {
    // A predictions table written elsewhere, without the (name, team) key.
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE predictions (
            name TEXT, position TEXT, team TEXT, cost INTEGER,
            predicted_point_range INTEGER, prob_0 REAL, prob_1 REAL,
            prob_2 REAL, prob_3 REAL, round INTEGER, opponent TEXT
        );
        INSERT INTO predictions VALUES
            ('Salah', 'MID', 'Liverpool', 130, 3, 0.1, 0.2, 0.3, 0.4, 7, NULL),
            ('Salah', 'MID', 'Liverpool', 128, 2, 0.1, 0.2, 0.4, 0.3, 7, NULL),
            ('Saka', 'MID', 'Arsenal', 100, 2, 0.1, 0.2, 0.4, 0.3, 7, NULL);
        "#,
    )
    .unwrap();
    let err = persist::load_predictions(&conn).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("Salah"), "{msg}");
}

#[test]
fn zero_row_cap_is_rejected_by_selection() {
    let mut conn = memory_db();
    let config = SelectionConfig {
        rows_to_check: 0,
        ..config_for(vec![Constraint::All])
    };
    let err = select_and_store(&fixture_predictions(), &config, &mut conn).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SquadError>(),
        Some(SquadError::InvalidRowCap)
    ));
}
