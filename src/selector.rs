use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidate_pool::CandidatePools;
use crate::constraint::{BUDGET_CAP, Constraint, MAX_PER_TEAM};
use crate::error::{Result, SquadError};
use crate::evaluator::{
    GroupSummary, SquadTotals, TeamCombination, TeamCounts, TeamIndex, evaluate, summarize_groups,
};
use crate::prediction::Position;

const FLUSH_INTERVAL: u64 = 4096;
// Visits between budget checks, pruned nodes included.
const CHECK_INTERVAL: u64 = 1024;
// Slack on the probability bound so float rounding never prunes a tie.
const PROB_BOUND_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    /// Depth-first over score-sorted combinations, pruning on team counts,
    /// remaining budget and an optimistic score bound.
    #[default]
    BranchAndBound,
    /// Every tuple of the cross product, in ranked enumeration order.
    Exhaustive,
}

impl SearchStrategy {
    pub fn code(&self) -> &'static str {
        match self {
            SearchStrategy::BranchAndBound => "branch-and-bound",
            SearchStrategy::Exhaustive => "exhaustive",
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = SquadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "branch-and-bound" | "bnb" => Ok(SearchStrategy::BranchAndBound),
            "exhaustive" | "full" => Ok(SearchStrategy::Exhaustive),
            _ => Err(SquadError::InvalidStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Optional caps on a single search. Counts are enforced at flush
/// granularity, so a parallel search may overshoot `max_candidates` slightly.
/// The time limit also covers building the position groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_candidates: Option<u64>,
    pub time_limit: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Full 15-man tuples summed and checked against the constraint.
    pub evaluated: u64,
    /// Evaluated tuples that satisfied the constraint.
    pub accepted: u64,
    /// Subtrees cut by branch-and-bound.
    pub pruned: u64,
    /// False when the search budget cut part of the search space off.
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct SquadSelection {
    pub constraint: Constraint,
    pub strategy: SearchStrategy,
    pub squad: TeamCombination,
    pub stats: SearchStats,
    pub elapsed: Duration,
}

/// Picks the best 15-man squad from the candidate pools under `constraint`.
///
/// Squads are ordered by total predicted points, then total top-class
/// probability (both descending), then total cost ascending, then by the
/// earliest (GK, DEF, MID, FWD) combination in ranked enumeration order.
/// Both strategies return the same squad for the same input.
pub fn select_best_squad(
    pools: &CandidatePools,
    constraint: Constraint,
    strategy: SearchStrategy,
    budget: SearchBudget,
) -> Result<SquadSelection> {
    let started = Instant::now();
    for position in pools.short_positions() {
        tracing::warn!(
            %position,
            candidates = pools.get(position).len(),
            needed = position.squad_quota(),
            "not enough candidates to fill position"
        );
    }

    let governor = Governor::new(budget, started);
    let Some(search) = Search::new(pools, constraint, strategy, governor.deadline) else {
        tracing::warn!(
            %constraint,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "time limit reached while building position groups"
        );
        return Err(SquadError::SearchExhausted { evaluated: 0 });
    };
    let task = search.run(&governor);
    let stats = SearchStats {
        evaluated: task.evaluated,
        accepted: task.accepted,
        pruned: task.pruned,
        complete: !task.cut_short,
    };
    let elapsed = started.elapsed();

    tracing::info!(
        %constraint,
        %strategy,
        evaluated = stats.evaluated,
        accepted = stats.accepted,
        pruned = stats.pruned,
        complete = stats.complete,
        elapsed_ms = elapsed.as_millis() as u64,
        "squad search finished"
    );

    let Some(best) = task.best else {
        if !stats.complete {
            return Err(SquadError::SearchExhausted {
                evaluated: stats.evaluated,
            });
        }
        return Err(SquadError::NoSquadFound(constraint));
    };
    if !stats.complete {
        tracing::warn!(%constraint, "search budget exhausted, returning best squad found so far");
    }

    Ok(SquadSelection {
        constraint,
        strategy,
        squad: TeamCombination::from_summaries(pools, search.groups_of(&best)),
        stats,
        elapsed,
    })
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    totals: SquadTotals,
    ordinals: [usize; 4],
    picks: [usize; 4],
}

/// `Less` means `a` is the better squad.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.totals
        .total_points
        .cmp(&a.totals.total_points)
        .then_with(|| b.totals.total_prob.total_cmp(&a.totals.total_prob))
        .then_with(|| a.totals.total_value.cmp(&b.totals.total_value))
        .then_with(|| a.ordinals.cmp(&b.ordinals))
}

#[derive(Debug, Default)]
struct Task {
    best: Option<Candidate>,
    evaluated: u64,
    accepted: u64,
    pruned: u64,
    unflushed: u64,
    visits: u64,
    /// Set when the budget stopped this task before its subtree was done.
    cut_short: bool,
}

impl Task {
    /// Returns true when `candidate` became the task's best.
    fn offer(&mut self, candidate: Candidate) -> bool {
        let improves = match &self.best {
            Some(best) => compare_candidates(&candidate, best) == Ordering::Less,
            None => true,
        };
        if improves {
            self.best = Some(candidate);
        }
        improves
    }

    fn merge(mut self, other: Task) -> Task {
        self.evaluated += other.evaluated;
        self.accepted += other.accepted;
        self.pruned += other.pruned;
        self.unflushed += other.unflushed;
        self.cut_short |= other.cut_short;
        if let Some(candidate) = other.best {
            self.offer(candidate);
        }
        self
    }
}

struct Governor {
    max_candidates: Option<u64>,
    deadline: Option<Instant>,
    interval: u64,
    charged: AtomicU64,
    stopped: AtomicBool,
}

impl Governor {
    fn new(budget: SearchBudget, started: Instant) -> Self {
        let interval = budget
            .max_candidates
            .map(|m| m.clamp(1, FLUSH_INTERVAL))
            .unwrap_or(FLUSH_INTERVAL);
        Self {
            max_candidates: budget.max_candidates,
            deadline: budget.time_limit.map(|limit| started + limit),
            interval,
            charged: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    fn stopped(&self) -> bool {
        self.stopped.load(AtomicOrdering::Relaxed)
    }

    /// Books the task's pending evaluations and returns the running total.
    fn book(&self, task: &mut Task) -> u64 {
        let pending = std::mem::take(&mut task.unflushed);
        self.charged.fetch_add(pending, AtomicOrdering::Relaxed) + pending
    }

    /// Called before more work is done; false once the budget is spent.
    fn allows_more(&self, task: &mut Task) -> bool {
        let total = self.book(task);
        let over_count = self.max_candidates.is_some_and(|max| total >= max);
        let over_time = self.deadline.is_some_and(|d| Instant::now() >= d);
        if over_count || over_time {
            self.stopped.store(true, AtomicOrdering::Relaxed);
        }
        !self.stopped()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Partial {
    value: u32,
    points: u32,
    prob: f64,
}

enum Visit {
    Continue,
    SkipSiblings,
    Stop,
}

struct Search {
    constraint: Constraint,
    prune: bool,
    teams: TeamIndex,
    groups: [Vec<GroupSummary>; 4],
    // Best points, min cost and max probability still reachable from the
    // positions after each level.
    rest_points: [u32; 4],
    rest_prob: [f64; 4],
    rest_min_value: [u32; 4],
    incumbent_points: AtomicI64,
}

impl Search {
    /// `None` when `deadline` passes while the groups are being built.
    fn new(
        pools: &CandidatePools,
        constraint: Constraint,
        strategy: SearchStrategy,
        deadline: Option<Instant>,
    ) -> Option<Self> {
        let teams = TeamIndex::from_pools(pools);
        let mut groups: [Vec<GroupSummary>; 4] = Default::default();
        for position in Position::ALL {
            groups[position.index()] =
                summarize_groups(pools.get(position), position, &teams, deadline)?;
        }

        let prune = strategy == SearchStrategy::BranchAndBound;
        if prune {
            for level in &mut groups {
                level.sort_by(|a, b| {
                    b.points
                        .cmp(&a.points)
                        .then_with(|| b.prob.total_cmp(&a.prob))
                        .then_with(|| a.value.cmp(&b.value))
                        .then_with(|| a.ordinal.cmp(&b.ordinal))
                });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
        }

        let mut rest_points = [0u32; 4];
        let mut rest_prob = [0.0f64; 4];
        let mut rest_min_value = [0u32; 4];
        for level in (0..3).rev() {
            let next = &groups[level + 1];
            let max_points = next.iter().map(|g| g.points).max().unwrap_or(0);
            let max_prob = next.iter().map(|g| g.prob).fold(0.0, f64::max);
            let min_value = next.iter().map(|g| g.value).min().unwrap_or(0);
            rest_points[level] = rest_points[level + 1] + max_points;
            rest_prob[level] = rest_prob[level + 1] + max_prob;
            rest_min_value[level] = rest_min_value[level + 1] + min_value;
        }

        Some(Self {
            constraint,
            prune,
            teams,
            groups,
            rest_points,
            rest_prob,
            rest_min_value,
            incumbent_points: AtomicI64::new(-1),
        })
    }

    fn groups_of(&self, candidate: &Candidate) -> [&GroupSummary; 4] {
        [
            &self.groups[0][candidate.picks[0]],
            &self.groups[1][candidate.picks[1]],
            &self.groups[2][candidate.picks[2]],
            &self.groups[3][candidate.picks[3]],
        ]
    }

    fn run(&self, governor: &Governor) -> Task {
        if self.groups.iter().any(|g| g.is_empty()) {
            return Task::default();
        }
        (0..self.groups[0].len())
            .into_par_iter()
            .map(|gk| {
                let mut task = Task::default();
                if governor.stopped() {
                    task.cut_short = true;
                    return task;
                }
                let mut partial_counts = TeamCounts::new(self.teams.len());
                let mut scratch = TeamCounts::new(self.teams.len());
                let mut picks = [0usize; 4];
                self.visit(
                    0,
                    gk,
                    Partial::default(),
                    &mut picks,
                    &mut partial_counts,
                    &mut scratch,
                    &mut task,
                    governor,
                );
                governor.book(&mut task);
                task
            })
            .reduce(Task::default, Task::merge)
    }

    fn descend(
        &self,
        level: usize,
        partial: Partial,
        picks: &mut [usize; 4],
        partial_counts: &mut TeamCounts,
        scratch: &mut TeamCounts,
        task: &mut Task,
        governor: &Governor,
    ) -> bool {
        for i in 0..self.groups[level].len() {
            match self.visit(level, i, partial, picks, partial_counts, scratch, task, governor) {
                Visit::Continue => {}
                Visit::SkipSiblings => break,
                Visit::Stop => return false,
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &self,
        level: usize,
        i: usize,
        partial: Partial,
        picks: &mut [usize; 4],
        partial_counts: &mut TeamCounts,
        scratch: &mut TeamCounts,
        task: &mut Task,
        governor: &Governor,
    ) -> Visit {
        if !self.keep_going(task, governor) {
            return Visit::Stop;
        }
        let group = &self.groups[level][i];
        let next = Partial {
            value: partial.value + group.value,
            points: partial.points + group.points,
            prob: partial.prob + group.prob,
        };

        if self.prune {
            // Siblings are sorted by (points, prob) descending, so a failed
            // score bound holds for every later sibling too.
            let optimistic_points = next.points + self.rest_points[level];
            if i64::from(optimistic_points) < self.incumbent_points.load(AtomicOrdering::Relaxed) {
                task.pruned += 1;
                return Visit::SkipSiblings;
            }
            if let Some(best) = &task.best {
                let optimistic_prob = next.prob + self.rest_prob[level];
                if optimistic_points < best.totals.total_points
                    || (optimistic_points == best.totals.total_points
                        && optimistic_prob + PROB_BOUND_EPS < best.totals.total_prob)
                {
                    task.pruned += 1;
                    return Visit::SkipSiblings;
                }
            }
            if self.constraint.checks_budget()
                && next.value + self.rest_min_value[level] > BUDGET_CAP
            {
                task.pruned += 1;
                return Visit::Continue;
            }
        }

        let track_teams = self.prune && self.constraint.checks_team();
        if track_teams && partial_counts.add(&group.teams) > MAX_PER_TEAM {
            partial_counts.remove(&group.teams);
            task.pruned += 1;
            return Visit::Continue;
        }

        picks[level] = i;
        let outcome = if level == 3 {
            self.leaf(picks, scratch, task);
            Visit::Continue
        } else if self.descend(level + 1, next, picks, partial_counts, scratch, task, governor) {
            Visit::Continue
        } else {
            Visit::Stop
        };

        if track_teams {
            partial_counts.remove(&group.teams);
        }
        outcome
    }

    /// Budget check run before every visit, so the walk only stops while
    /// work remains and pruned subtrees still see the deadline.
    fn keep_going(&self, task: &mut Task, governor: &Governor) -> bool {
        let due = task.visits % CHECK_INTERVAL == 0 || task.unflushed >= governor.interval;
        task.visits += 1;
        if due && !governor.allows_more(task) {
            task.cut_short = true;
            return false;
        }
        true
    }

    fn leaf(&self, picks: &[usize; 4], scratch: &mut TeamCounts, task: &mut Task) {
        let groups = [
            &self.groups[0][picks[0]],
            &self.groups[1][picks[1]],
            &self.groups[2][picks[2]],
            &self.groups[3][picks[3]],
        ];
        task.evaluated += 1;
        task.unflushed += 1;
        if let Some(totals) = evaluate(groups, self.constraint, scratch) {
            task.accepted += 1;
            let candidate = Candidate {
                totals,
                ordinals: groups.map(|g| g.ordinal),
                picks: *picks,
            };
            if task.offer(candidate) && self.prune {
                self.incumbent_points
                    .fetch_max(i64::from(totals.total_points), AtomicOrdering::Relaxed);
            }
        }
    }
}
