use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SquadError};

/// Highest predicted point class the upstream classifier emits.
pub const MAX_POINT_CLASS: u8 = 3;

const PROB_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    /// Squad order: goalkeepers first, forwards last.
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }

    /// Accepts the upstream tags, including the split defender tags the
    /// scorer emits before they are folded back into DEF.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "GK" | "GKP" => Some(Position::Goalkeeper),
            "DEF" | "ATTDEF" | "DEFDEF" => Some(Position::Defender),
            "MID" => Some(Position::Midfielder),
            "FWD" => Some(Position::Forward),
            _ => None,
        }
    }

    /// Players of this position in a full 15-man squad.
    pub fn squad_quota(&self) -> usize {
        match self {
            Position::Goalkeeper => 2,
            Position::Defender => 5,
            Position::Midfielder => 5,
            Position::Forward => 3,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Position::Goalkeeper => 0,
            Position::Defender => 1,
            Position::Midfielder => 2,
            Position::Forward => 3,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One row of upstream model output for the coming gameweek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPrediction {
    pub name: String,
    pub position: Position,
    pub team: String,
    /// Price in £0.1m units (1000 = £100.0m).
    pub cost: u32,
    pub predicted_point_range: u8,
    pub prob_0: f64,
    pub prob_1: f64,
    pub prob_2: f64,
    pub prob_3: f64,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub opponent: Option<String>,
}

impl PlayerPrediction {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid(&self.name, "empty name"));
        }
        if self.predicted_point_range > MAX_POINT_CLASS {
            return Err(invalid(
                &self.name,
                format!(
                    "predicted_point_range {} above {MAX_POINT_CLASS}",
                    self.predicted_point_range
                ),
            ));
        }
        let probs = self.probs();
        if let Some(p) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(invalid(&self.name, format!("probability {p} outside [0, 1]")));
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(invalid(
                &self.name,
                format!("class probabilities sum to {sum:.4}"),
            ));
        }
        Ok(())
    }

    /// `[prob_0, prob_1, prob_2, prob_3]`
    pub fn probs(&self) -> [f64; 4] {
        [self.prob_0, self.prob_1, self.prob_2, self.prob_3]
    }

    pub fn cost_millions(&self) -> f64 {
        f64::from(self.cost) / 10.0
    }
}

/// Ranking used for pools, bench order and captain ties: higher predicted
/// class first, then more confidence in the top class and successively lower
/// classes. Name then team keep equal predictions in a fixed order.
pub fn rank_cmp(a: &PlayerPrediction, b: &PlayerPrediction) -> Ordering {
    b.predicted_point_range
        .cmp(&a.predicted_point_range)
        .then_with(|| b.prob_3.total_cmp(&a.prob_3))
        .then_with(|| b.prob_2.total_cmp(&a.prob_2))
        .then_with(|| b.prob_1.total_cmp(&a.prob_1))
        .then_with(|| b.prob_0.total_cmp(&a.prob_0))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.team.cmp(&b.team))
}

/// Raw record as written by the scoring stage. Column names follow the
/// upstream table (`value`, `plays_for`, `shift_opponent`).
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRecord {
    pub name: String,
    pub position: String,
    #[serde(alias = "plays_for")]
    pub team: String,
    #[serde(alias = "value")]
    pub cost: i64,
    pub predicted_point_range: i64,
    pub prob_0: f64,
    pub prob_1: f64,
    pub prob_2: f64,
    pub prob_3: f64,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default, alias = "shift_opponent")]
    pub opponent: Option<String>,
}

impl TryFrom<PredictionRecord> for PlayerPrediction {
    type Error = SquadError;

    fn try_from(raw: PredictionRecord) -> Result<Self> {
        let position = Position::from_code(&raw.position).ok_or_else(|| {
            invalid(&raw.name, format!("unknown position tag '{}'", raw.position))
        })?;
        let cost = u32::try_from(raw.cost)
            .map_err(|_| invalid(&raw.name, format!("cost {} is negative", raw.cost)))?;
        let predicted_point_range = u8::try_from(raw.predicted_point_range).map_err(|_| {
            invalid(
                &raw.name,
                format!("predicted_point_range {} out of range", raw.predicted_point_range),
            )
        })?;
        let prediction = PlayerPrediction {
            name: raw.name,
            position,
            team: raw.team,
            cost,
            predicted_point_range,
            prob_0: raw.prob_0,
            prob_1: raw.prob_1,
            prob_2: raw.prob_2,
            prob_3: raw.prob_3,
            round: raw.round,
            opponent: raw.opponent,
        };
        prediction.validate()?;
        Ok(prediction)
    }
}

/// Gameweek the predictions are for: one past the latest round seen.
pub fn next_gameweek(predictions: &[PlayerPrediction]) -> u32 {
    predictions
        .iter()
        .filter_map(|p| p.round)
        .max()
        .map(|r| r + 1)
        .unwrap_or(1)
}

/// A player is keyed by name and team; a batch naming the same pair twice
/// would let the search pick that player twice.
pub fn ensure_unique(predictions: &[PlayerPrediction]) -> Result<()> {
    let mut seen = HashSet::with_capacity(predictions.len());
    for p in predictions {
        if !seen.insert((p.name.as_str(), p.team.as_str())) {
            return Err(invalid(
                &p.name,
                format!("listed more than once for {}", p.team),
            ));
        }
    }
    Ok(())
}

fn invalid(name: &str, reason: impl Into<String>) -> SquadError {
    SquadError::InvalidPrediction {
        name: name.to_string(),
        reason: reason.into(),
    }
}
