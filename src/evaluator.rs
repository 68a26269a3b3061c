use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::candidate_pool::CandidatePools;
use crate::combinations::IndexCombinations;
use crate::constraint::Constraint;
use crate::prediction::{PlayerPrediction, Position};

const DEADLINE_CHECK_INTERVAL: usize = 4096;

/// Dense ids for club names so team counting is an array bump.
#[derive(Debug, Clone, Default)]
pub struct TeamIndex {
    ids: HashMap<String, u16>,
}

impl TeamIndex {
    pub fn from_pools(pools: &CandidatePools) -> Self {
        let mut index = TeamIndex::default();
        for position in Position::ALL {
            for player in pools.get(position) {
                index.intern(&player.team);
            }
        }
        index
    }

    fn intern(&mut self, team: &str) -> u16 {
        if let Some(id) = self.ids.get(team) {
            return *id;
        }
        let id = self.ids.len() as u16;
        self.ids.insert(team.to_string(), id);
        id
    }

    pub fn id(&self, team: &str) -> Option<u16> {
        self.ids.get(team).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Pre-summed aggregates of one position combination.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    /// Position of this combination in the ranked enumeration.
    pub ordinal: usize,
    /// Indices into the position's candidate pool, ascending.
    pub members: Vec<usize>,
    pub value: u32,
    pub points: u32,
    pub prob: f64,
    pub teams: Vec<u16>,
}

/// Enumerates and sums every squad-quota combination of one position pool.
/// Gives up with `None` once `deadline` passes.
pub fn summarize_groups(
    pool: &[PlayerPrediction],
    position: Position,
    teams: &TeamIndex,
    deadline: Option<Instant>,
) -> Option<Vec<GroupSummary>> {
    let mut out = Vec::new();
    for (ordinal, members) in IndexCombinations::new(pool.len(), position.squad_quota()).enumerate()
    {
        if ordinal % DEADLINE_CHECK_INTERVAL == 0 && deadline.is_some_and(|d| Instant::now() >= d)
        {
            return None;
        }
        let mut value = 0u32;
        let mut points = 0u32;
        let mut prob = 0.0f64;
        let mut team_ids = Vec::with_capacity(members.len());
        for &i in &members {
            let p = &pool[i];
            value += p.cost;
            points += u32::from(p.predicted_point_range);
            prob += p.prob_3;
            team_ids.push(teams.id(&p.team).unwrap_or_default());
        }
        out.push(GroupSummary {
            ordinal,
            members,
            value,
            points,
            prob,
            teams: team_ids,
        });
    }
    Some(out)
}

/// Scratch per-club counter reused across evaluations.
#[derive(Debug, Clone)]
pub struct TeamCounts {
    counts: Vec<u8>,
}

impl TeamCounts {
    pub fn new(teams: usize) -> Self {
        Self {
            counts: vec![0; teams],
        }
    }

    /// Adds a group and returns the largest count among its clubs.
    pub fn add(&mut self, teams: &[u16]) -> u8 {
        let mut max = 0;
        for &t in teams {
            let c = &mut self.counts[t as usize];
            *c += 1;
            max = max.max(*c);
        }
        max
    }

    pub fn remove(&mut self, teams: &[u16]) {
        for &t in teams {
            self.counts[t as usize] -= 1;
        }
    }

    pub fn max_of(&self, teams: &[u16]) -> u8 {
        teams
            .iter()
            .map(|&t| self.counts[t as usize])
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquadTotals {
    pub total_value: u32,
    pub total_points: u32,
    pub total_prob: f64,
    pub max_team_count: u8,
}

/// Sums a GK/DEF/MID/FWD tuple. `counts` is left as it was found.
pub fn squad_totals(groups: [&GroupSummary; 4], counts: &mut TeamCounts) -> SquadTotals {
    for g in groups {
        counts.add(&g.teams);
    }
    let max_team_count = groups
        .iter()
        .map(|g| counts.max_of(&g.teams))
        .max()
        .unwrap_or(0);
    for g in groups {
        counts.remove(&g.teams);
    }
    SquadTotals {
        total_value: groups[0].value + groups[1].value + groups[2].value + groups[3].value,
        total_points: groups[0].points + groups[1].points + groups[2].points + groups[3].points,
        total_prob: groups[0].prob + groups[1].prob + groups[2].prob + groups[3].prob,
        max_team_count,
    }
}

/// Totals of the tuple when it satisfies `constraint`, otherwise `None`.
pub fn evaluate(
    groups: [&GroupSummary; 4],
    constraint: Constraint,
    counts: &mut TeamCounts,
) -> Option<SquadTotals> {
    let totals = squad_totals(groups, counts);
    constraint
        .accepts(totals.total_value, totals.max_team_count)
        .then_some(totals)
}

/// A full 15-man candidate with its aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamCombination {
    pub goalkeepers: Vec<PlayerPrediction>,
    pub defenders: Vec<PlayerPrediction>,
    pub midfielders: Vec<PlayerPrediction>,
    pub forwards: Vec<PlayerPrediction>,
    pub total_value: u32,
    pub total_points: u32,
    pub total_prob: f64,
    pub team_counts: BTreeMap<String, usize>,
}

impl TeamCombination {
    /// Builds the combination from per-position player lists (GK, DEF, MID, FWD).
    pub fn from_groups(groups: [Vec<PlayerPrediction>; 4]) -> Self {
        let [goalkeepers, defenders, midfielders, forwards] = groups;
        let group_prob = |players: &[PlayerPrediction]| -> f64 {
            players.iter().fold(0.0, |acc, p| acc + p.prob_3)
        };
        let total_prob = group_prob(&goalkeepers)
            + group_prob(&defenders)
            + group_prob(&midfielders)
            + group_prob(&forwards);

        let mut combination = TeamCombination {
            goalkeepers,
            defenders,
            midfielders,
            forwards,
            total_value: 0,
            total_points: 0,
            total_prob,
            team_counts: BTreeMap::new(),
        };
        let mut total_value = 0;
        let mut total_points = 0;
        let mut team_counts = BTreeMap::new();
        for p in combination.players() {
            total_value += p.cost;
            total_points += u32::from(p.predicted_point_range);
            *team_counts.entry(p.team.clone()).or_insert(0) += 1;
        }
        combination.total_value = total_value;
        combination.total_points = total_points;
        combination.team_counts = team_counts;
        combination
    }

    /// Materializes the tuple picked out of the group summaries.
    pub fn from_summaries(pools: &CandidatePools, groups: [&GroupSummary; 4]) -> Self {
        let players = |position: Position, group: &GroupSummary| -> Vec<PlayerPrediction> {
            let pool = pools.get(position);
            group.members.iter().map(|&i| pool[i].clone()).collect()
        };
        TeamCombination::from_groups([
            players(Position::Goalkeeper, groups[0]),
            players(Position::Defender, groups[1]),
            players(Position::Midfielder, groups[2]),
            players(Position::Forward, groups[3]),
        ])
    }

    /// All players in squad order: GK, DEF, MID, FWD.
    pub fn players(&self) -> impl Iterator<Item = &PlayerPrediction> {
        self.goalkeepers
            .iter()
            .chain(&self.defenders)
            .chain(&self.midfielders)
            .chain(&self.forwards)
    }

    pub fn len(&self) -> usize {
        self.goalkeepers.len() + self.defenders.len() + self.midfielders.len() + self.forwards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_team_count(&self) -> usize {
        self.team_counts.values().copied().max().unwrap_or(0)
    }

    pub fn satisfies(&self, constraint: Constraint) -> bool {
        let max_team = u8::try_from(self.max_team_count()).unwrap_or(u8::MAX);
        constraint.accepts(self.total_value, max_team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate_pool::build_candidate_pools;

    fn player(name: &str, position: Position, team: &str, cost: u32) -> PlayerPrediction {
        PlayerPrediction {
            name: name.to_string(),
            position,
            team: team.to_string(),
            cost,
            predicted_point_range: 1,
            prob_0: 0.4,
            prob_1: 0.3,
            prob_2: 0.2,
            prob_3: 0.1,
            round: None,
            opponent: None,
        }
    }

    fn squad(costs: [u32; 15], teams: [&str; 15]) -> TeamCombination {
        let mut groups: [Vec<PlayerPrediction>; 4] = Default::default();
        let mut i = 0;
        for position in Position::ALL {
            for _ in 0..position.squad_quota() {
                groups[position.index()].push(player(
                    &format!("p{i}"),
                    position,
                    teams[i],
                    costs[i],
                ));
                i += 1;
            }
        }
        TeamCombination::from_groups(groups)
    }

    const SPREAD: [&str; 15] = [
        "ARS", "AVL", "BOU", "BRE", "BHA", "CHE", "CRY", "EVE", "FUL", "LIV", "MCI", "MUN",
        "NEW", "NFO", "TOT",
    ];

    #[test]
    fn squad_costing_1001_only_fails_budget_rules() {
        let mut costs = [66u32; 15];
        costs[0] = 77; // 14 * 66 + 77 = 1001
        let combo = squad(costs, SPREAD);
        assert_eq!(combo.total_value, 1001);
        assert!(!combo.satisfies(Constraint::Budget));
        assert!(!combo.satisfies(Constraint::All));
        assert!(combo.satisfies(Constraint::Team));
        assert!(combo.satisfies(Constraint::Unconstrained));
    }

    #[test]
    fn four_from_one_club_only_fails_team_rules() {
        let mut teams = SPREAD;
        teams[1] = "LIV";
        teams[4] = "LIV";
        teams[12] = "LIV";
        let combo = squad([60; 15], teams);
        assert_eq!(combo.team_counts["LIV"], 4);
        assert!(!combo.satisfies(Constraint::Team));
        assert!(!combo.satisfies(Constraint::All));
        assert!(combo.satisfies(Constraint::Budget));
        assert!(combo.satisfies(Constraint::Unconstrained));
    }

    #[test]
    fn group_totals_match_materialized_combination() {
        let teams = ["ARS", "ARS", "LIV", "MCI", "LIV", "ARS", "CHE", "TOT", "ARS", "LIV", "MCI",
            "CHE", "TOT", "LIV", "MCI"];
        let combo = squad([55; 15], teams);
        let all: Vec<PlayerPrediction> = combo.players().cloned().collect();
        let pools = build_candidate_pools(&all, 30);
        let index = TeamIndex::from_pools(&pools);
        let summaries: Vec<Vec<GroupSummary>> = Position::ALL
            .iter()
            .map(|p| summarize_groups(pools.get(*p), *p, &index, None).unwrap())
            .collect();
        assert!(summaries.iter().all(|s| s.len() == 1));

        let mut counts = TeamCounts::new(index.len());
        let groups = [&summaries[0][0], &summaries[1][0], &summaries[2][0], &summaries[3][0]];
        let totals = squad_totals(groups, &mut counts);
        let rebuilt = TeamCombination::from_summaries(&pools, groups);

        assert_eq!(totals.total_value, rebuilt.total_value);
        assert_eq!(totals.total_points, rebuilt.total_points);
        assert_eq!(totals.total_prob, rebuilt.total_prob);
        assert_eq!(usize::from(totals.max_team_count), rebuilt.max_team_count());
        assert_eq!(rebuilt.max_team_count(), 4);
        assert!(evaluate(groups, Constraint::Team, &mut counts).is_none());
        assert!(evaluate(groups, Constraint::Budget, &mut counts).is_some());
        // Scratch counter is restored between calls.
        assert_eq!(counts.max_of(&groups[0].teams), 0);
    }

    #[test]
    fn passed_deadline_abandons_group_building() {
        let players: Vec<PlayerPrediction> = (0..20)
            .map(|i| player(&format!("d{i}"), Position::Defender, SPREAD[i % 15], 50))
            .collect();
        let pools = build_candidate_pools(&players, 30);
        let index = TeamIndex::from_pools(&pools);
        let pool = pools.get(Position::Defender);

        let past = Instant::now();
        assert!(summarize_groups(pool, Position::Defender, &index, Some(past)).is_none());

        let later = Instant::now() + std::time::Duration::from_secs(60);
        let groups = summarize_groups(pool, Position::Defender, &index, Some(later)).unwrap();
        assert_eq!(groups.len(), 15_504);
        assert_eq!(groups[0].members, vec![0, 1, 2, 3, 4]);
    }
}
