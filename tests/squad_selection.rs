use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fpl_squad::candidate_pool::{CandidatePools, build_candidate_pools};
use fpl_squad::constraint::{BUDGET_CAP, Constraint, MAX_PER_TEAM};
use fpl_squad::lineup::{Formation, resolve_starting_xi};
use fpl_squad::prediction::{PlayerPrediction, Position};
use fpl_squad::selector::{SearchBudget, SearchStrategy, SquadSelection, select_best_squad};
use fpl_squad::source::parse_predictions_json;
use fpl_squad::SquadError;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_pools() -> CandidatePools {
    let players = parse_predictions_json(&read_fixture("predictions_small.json"))
        .expect("fixture should parse");
    build_candidate_pools(&players, 30)
}

fn select(pools: &CandidatePools, constraint: Constraint, strategy: SearchStrategy) -> SquadSelection {
    select_best_squad(pools, constraint, strategy, SearchBudget::default())
        .expect("fixture has a squad for every constraint")
}

fn names(selection: &SquadSelection) -> BTreeSet<String> {
    selection.squad.players().map(|p| p.name.clone()).collect()
}

const TEAMS: [&str; 6] = ["ARS", "LIV", "MCI", "CHE", "NEW", "TOT"];

/// Random pool with coarse probabilities so equal scores are common.
fn random_predictions(seed: u64, per_position: [usize; 4]) -> Vec<PlayerPrediction> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for position in Position::ALL {
        for n in 0..per_position[position.index()] {
            let prob_3 = f64::from(rng.gen_range(0..4u8)) * 0.1;
            out.push(PlayerPrediction {
                name: format!("{position}-{seed}-{n}"),
                position,
                team: TEAMS[rng.gen_range(0..TEAMS.len())].to_string(),
                cost: rng.gen_range(8..=16u32) * 5,
                predicted_point_range: rng.gen_range(0..=3u8),
                prob_0: 1.0 - prob_3,
                prob_1: 0.0,
                prob_2: 0.0,
                prob_3,
                round: Some(5),
                opponent: None,
            });
        }
    }
    out
}

#[test]
fn fixture_squads_match_known_optimum() {
    let pools = fixture_pools();

    let none = select(&pools, Constraint::Unconstrained, SearchStrategy::BranchAndBound);
    assert_eq!(none.squad.total_points, 36);
    assert_eq!(none.squad.total_value, 1250);
    assert!(names(&none).contains("Haaland"));
    assert!(names(&none).contains("Salah"));

    let budget = select(&pools, Constraint::Budget, SearchStrategy::BranchAndBound);
    assert_eq!(budget.squad.total_points, 30);
    assert_eq!(budget.squad.total_value, 1000);
    assert!(!names(&budget).contains("Salah"));

    let team = select(&pools, Constraint::Team, SearchStrategy::BranchAndBound);
    assert_eq!(team.squad.total_points, 34);
    assert_eq!(team.squad.total_value, 1225);

    let all = select(&pools, Constraint::All, SearchStrategy::BranchAndBound);
    assert_eq!(all.squad.total_points, 30);
    assert_eq!(all.squad.total_value, 1000);
    assert!(names(&all).contains("Van Dijk"));
}

#[test]
fn selected_squads_respect_shape_and_constraint() {
    let pools = fixture_pools();
    for constraint in Constraint::ALL_VARIANTS {
        let selection = select(&pools, constraint, SearchStrategy::BranchAndBound);
        let squad = &selection.squad;
        assert_eq!(squad.len(), 15);
        assert_eq!(squad.goalkeepers.len(), 2);
        assert_eq!(squad.defenders.len(), 5);
        assert_eq!(squad.midfielders.len(), 5);
        assert_eq!(squad.forwards.len(), 3);
        assert_eq!(names(&selection).len(), 15, "no duplicate players");
        assert!(squad.satisfies(constraint));
        if constraint.checks_budget() {
            assert!(squad.total_value <= BUDGET_CAP);
        }
        if constraint.checks_team() {
            assert!(squad.max_team_count() <= usize::from(MAX_PER_TEAM));
        }

        let best = resolve_starting_xi(squad, constraint).expect("2/5/5/3 always has a legal XI");
        assert_eq!(best.starters().count(), 11);
        assert!(Formation::LEGAL.contains(&best.formation));
        assert_eq!(
            best.starters()
                .filter(|s| s.player.position == Position::Goalkeeper)
                .count(),
            1
        );
        assert_eq!(best.slots.iter().filter(|s| s.captain).count(), 1);
        assert!(best.captain().unwrap().role.is_starter());
    }
}

#[test]
fn exact_size_pool_uses_every_player() {
    let players = random_predictions(11, [2, 5, 5, 3]);
    let pools = build_candidate_pools(&players, 5);
    let selection = select(&pools, Constraint::Unconstrained, SearchStrategy::Exhaustive);
    assert_eq!(selection.stats.evaluated, 1);
    let expected: u32 = players
        .iter()
        .map(|p| u32::from(p.predicted_point_range))
        .sum();
    assert_eq!(selection.squad.total_points, expected);
    assert_eq!(names(&selection).len(), 15);
}

#[test]
fn branch_and_bound_matches_exhaustive() {
    for seed in 0..8 {
        let players = random_predictions(seed, [5, 7, 7, 5]);
        let pools = build_candidate_pools(&players, 6);
        for constraint in Constraint::ALL_VARIANTS {
            let exhaustive = select_best_squad(
                &pools,
                constraint,
                SearchStrategy::Exhaustive,
                SearchBudget::default(),
            );
            let pruned = select_best_squad(
                &pools,
                constraint,
                SearchStrategy::BranchAndBound,
                SearchBudget::default(),
            );
            match (exhaustive, pruned) {
                (Ok(a), Ok(b)) => {
                    assert_eq!(a.squad, b.squad, "seed {seed} {constraint}");
                    assert!(b.stats.evaluated <= a.stats.evaluated);
                }
                (Err(SquadError::NoSquadFound(_)), Err(SquadError::NoSquadFound(_))) => {}
                (a, b) => panic!("seed {seed} {constraint}: strategies disagree: {a:?} vs {b:?}"),
            }
        }
    }
}

#[test]
fn identical_inputs_give_identical_squads() {
    let players = random_predictions(3, [5, 8, 8, 5]);
    let pools = build_candidate_pools(&players, 6);
    for strategy in [SearchStrategy::Exhaustive, SearchStrategy::BranchAndBound] {
        let first = select(&pools, Constraint::Unconstrained, strategy);
        let second = select(&pools, Constraint::Unconstrained, strategy);
        assert_eq!(first.squad, second.squad);

        let xi_a = resolve_starting_xi(&first.squad, Constraint::Unconstrained).unwrap();
        let xi_b = resolve_starting_xi(&second.squad, Constraint::Unconstrained).unwrap();
        assert_eq!(xi_a, xi_b);
    }
}

#[test]
fn relaxing_constraints_never_lowers_the_score() {
    for seed in 20..26 {
        let players = random_predictions(seed, [5, 7, 7, 5]);
        let pools = build_candidate_pools(&players, 6);
        let mut scores = HashMap::new();
        for constraint in Constraint::ALL_VARIANTS {
            if let Ok(selection) = select_best_squad(
                &pools,
                constraint,
                SearchStrategy::BranchAndBound,
                SearchBudget::default(),
            ) {
                scores.insert(
                    constraint,
                    (selection.squad.total_points, selection.squad.total_prob),
                );
            }
        }
        let none = scores[&Constraint::Unconstrained];
        for (tighter, looser) in [
            (Constraint::All, Constraint::Budget),
            (Constraint::All, Constraint::Team),
            (Constraint::Budget, Constraint::Unconstrained),
            (Constraint::Team, Constraint::Unconstrained),
        ] {
            let Some(&tight) = scores.get(&tighter) else {
                continue;
            };
            let loose = scores.get(&looser).copied().unwrap_or(none);
            assert!(
                (tight.0, tight.1) <= (loose.0, loose.1),
                "seed {seed}: {tighter} {tight:?} beat {looser} {loose:?}"
            );
        }
    }
}

#[test]
fn missing_forwards_yields_no_squad() {
    let players = random_predictions(4, [3, 6, 6, 2]);
    let pools = build_candidate_pools(&players, 30);
    assert_eq!(pools.short_positions(), vec![Position::Forward]);
    for strategy in [SearchStrategy::Exhaustive, SearchStrategy::BranchAndBound] {
        let err = select_best_squad(
            &pools,
            Constraint::Unconstrained,
            strategy,
            SearchBudget::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SquadError::NoSquadFound(Constraint::Unconstrained)));
        assert!(err.is_recoverable());
    }
}
