use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SquadError;

/// Salary cap in £0.1m units.
pub const BUDGET_CAP: u32 = 1000;
/// Most players a squad may take from one club.
pub const MAX_PER_TEAM: u8 = 3;

/// Which squad rules the evaluator enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    Budget,
    Team,
    All,
    #[serde(rename = "none")]
    Unconstrained,
}

impl Constraint {
    pub const ALL_VARIANTS: [Constraint; 4] = [
        Constraint::Budget,
        Constraint::Team,
        Constraint::All,
        Constraint::Unconstrained,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Constraint::Budget => "budget",
            Constraint::Team => "team",
            Constraint::All => "all",
            Constraint::Unconstrained => "none",
        }
    }

    pub fn checks_budget(&self) -> bool {
        matches!(self, Constraint::Budget | Constraint::All)
    }

    pub fn checks_team(&self) -> bool {
        matches!(self, Constraint::Team | Constraint::All)
    }

    pub fn accepts(&self, total_value: u32, max_team_count: u8) -> bool {
        let budget_ok = !self.checks_budget() || total_value <= BUDGET_CAP;
        let team_ok = !self.checks_team() || max_team_count <= MAX_PER_TEAM;
        budget_ok && team_ok
    }

    /// Parses a comma separated list such as `budget,all`.
    pub fn parse_list(raw: &str) -> Result<Vec<Constraint>, SquadError> {
        let mut out = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let constraint = part.parse::<Constraint>()?;
            if !out.contains(&constraint) {
                out.push(constraint);
            }
        }
        if out.is_empty() {
            return Err(SquadError::InvalidConstraint(raw.to_string()));
        }
        Ok(out)
    }
}

impl FromStr for Constraint {
    type Err = SquadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "budget" => Ok(Constraint::Budget),
            "team" => Ok(Constraint::Team),
            "all" => Ok(Constraint::All),
            "none" => Ok(Constraint::Unconstrained),
            _ => Err(SquadError::InvalidConstraint(s.to_string())),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
