use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combinations::IndexCombinations;
use crate::constraint::Constraint;
use crate::error::{Result, SquadError};
use crate::evaluator::TeamCombination;
use crate::prediction::{PlayerPrediction, Position, rank_cmp};

pub const SQUAD_SIZE: usize = 15;
pub const STARTERS: usize = 11;

/// Outfield shape of a starting XI (the goalkeeper is implied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Formation {
    pub defenders: u8,
    pub midfielders: u8,
    pub forwards: u8,
}

impl Formation {
    /// Every shape with at least 3 DEF, 3 MID and 1 FWD summing to 10.
    pub const LEGAL: [Formation; 7] = [
        Formation::new(3, 4, 3),
        Formation::new(3, 5, 2),
        Formation::new(4, 3, 3),
        Formation::new(4, 4, 2),
        Formation::new(4, 5, 1),
        Formation::new(5, 3, 2),
        Formation::new(5, 4, 1),
    ];

    pub const fn new(defenders: u8, midfielders: u8, forwards: u8) -> Self {
        Self {
            defenders,
            midfielders,
            forwards,
        }
    }

    /// Checks a full XI by position counts `[GK, DEF, MID, FWD]`.
    pub fn from_counts(counts: [u8; 4]) -> Option<Self> {
        let [gk, def, mid, fwd] = counts;
        let legal = gk == 1 && def >= 3 && mid >= 3 && fwd >= 1 && gk + def + mid + fwd == 11;
        legal.then(|| Formation::new(def, mid, fwd))
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.defenders, self.midfielders, self.forwards)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SquadRole {
    Starter(Position),
    SubGoalkeeper,
    /// Outfield substitute, 1 is first off the bench.
    Sub(u8),
}

impl SquadRole {
    pub fn label(&self) -> String {
        match self {
            SquadRole::Starter(position) => position.code().to_string(),
            SquadRole::SubGoalkeeper => "SubGK".to_string(),
            SquadRole::Sub(n) => format!("Sub{n}"),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if label == "SubGK" {
            return Some(SquadRole::SubGoalkeeper);
        }
        if let Some(n) = label.strip_prefix("Sub") {
            return n.parse().ok().map(SquadRole::Sub);
        }
        Position::from_code(label).map(SquadRole::Starter)
    }

    pub fn is_starter(&self) -> bool {
        matches!(self, SquadRole::Starter(_))
    }
}

impl fmt::Display for SquadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadSlot {
    pub role: SquadRole,
    pub player: PlayerPrediction,
    pub captain: bool,
}

/// Selected squad split into starters and an ordered bench.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSquad {
    pub constraint: Constraint,
    pub formation: Formation,
    /// Eleven starters in squad order, then SubGK, Sub1, Sub2, Sub3.
    pub slots: Vec<SquadSlot>,
    pub total_value: u32,
    pub total_points: u32,
    pub total_prob: f64,
    pub starting_points: u32,
    pub starting_prob: f64,
}

impl BestSquad {
    pub fn starters(&self) -> impl Iterator<Item = &SquadSlot> {
        self.slots.iter().filter(|s| s.role.is_starter())
    }

    pub fn bench(&self) -> impl Iterator<Item = &SquadSlot> {
        self.slots.iter().filter(|s| !s.role.is_starter())
    }

    pub fn captain(&self) -> Option<&SquadSlot> {
        self.slots.iter().find(|s| s.captain)
    }
}

/// Picks the best legal XI out of a 15-man squad, orders the bench and
/// names the captain.
///
/// XIs are ranked by predicted points then summed top-class probability;
/// on a full tie the first XI in squad-order enumeration wins. The bench
/// goalkeeper is SubGK and the outfield substitutes are ordered by
/// [`rank_cmp`]. The captain is the starter with the highest `prob_3`; ties
/// go to whoever ranks first under [`rank_cmp`].
pub fn resolve_starting_xi(squad: &TeamCombination, constraint: Constraint) -> Result<BestSquad> {
    let players: Vec<&PlayerPrediction> = squad.players().collect();
    if players.len() != SQUAD_SIZE {
        return Err(SquadError::NoLegalStartingXi(format!(
            "squad has {} players",
            players.len()
        )));
    }

    let mut best: Option<(Vec<usize>, Formation, u32, f64)> = None;
    for subset in IndexCombinations::new(SQUAD_SIZE, STARTERS) {
        let mut counts = [0u8; 4];
        let mut points = 0u32;
        let mut prob = 0.0f64;
        for &i in &subset {
            let p = players[i];
            counts[p.position.index()] += 1;
            points += u32::from(p.predicted_point_range);
            prob += p.prob_3;
        }
        let Some(formation) = Formation::from_counts(counts) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((_, _, best_points, best_prob)) => points
                .cmp(best_points)
                .then_with(|| prob.total_cmp(best_prob))
                == Ordering::Greater,
        };
        if better {
            best = Some((subset, formation, points, prob));
        }
    }

    let Some((starters, formation, starting_points, starting_prob)) = best else {
        let mut counts = [0usize; 4];
        for p in &players {
            counts[p.position.index()] += 1;
        }
        return Err(SquadError::NoLegalStartingXi(format!(
            "position counts GK/DEF/MID/FWD = {counts:?}"
        )));
    };

    let captain_idx = starters
        .iter()
        .copied()
        .min_by(|&a, &b| {
            players[b]
                .prob_3
                .total_cmp(&players[a].prob_3)
                .then_with(|| rank_cmp(players[a], players[b]))
        })
        .unwrap_or_default();

    let mut slots: Vec<SquadSlot> = starters
        .iter()
        .map(|&i| SquadSlot {
            role: SquadRole::Starter(players[i].position),
            player: players[i].clone(),
            captain: i == captain_idx,
        })
        .collect();

    let bench: Vec<&PlayerPrediction> = (0..SQUAD_SIZE)
        .filter(|i| !starters.contains(i))
        .map(|i| players[i])
        .collect();
    let (keepers, mut outfield): (Vec<_>, Vec<_>) = bench
        .into_iter()
        .partition(|p| p.position == Position::Goalkeeper);
    outfield.sort_by(|a, b| rank_cmp(a, b));

    for keeper in keepers {
        slots.push(SquadSlot {
            role: SquadRole::SubGoalkeeper,
            player: keeper.clone(),
            captain: false,
        });
    }
    for (n, player) in outfield.into_iter().enumerate() {
        slots.push(SquadSlot {
            role: SquadRole::Sub(n as u8 + 1),
            player: player.clone(),
            captain: false,
        });
    }

    Ok(BestSquad {
        constraint,
        formation,
        slots,
        total_value: squad.total_value,
        total_points: squad.total_points,
        total_prob: squad.total_prob,
        starting_points,
        starting_prob,
    })
}
