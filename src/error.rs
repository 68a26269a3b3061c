use thiserror::Error;

use crate::constraint::Constraint;

#[derive(Debug, Error)]
pub enum SquadError {
    #[error("constraint '{0}' not within required values: budget, team, all, none")]
    InvalidConstraint(String),

    #[error("search strategy '{0}' not within required values: branch-and-bound, exhaustive")]
    InvalidStrategy(String),

    #[error("invalid prediction for {name}: {reason}")]
    InvalidPrediction { name: String, reason: String },

    #[error("rows to check must be at least 1")]
    InvalidRowCap,

    #[error("{0} has no team combinations within constraint")]
    NoSquadFound(Constraint),

    #[error("no legal starting eleven in the selected squad: {0}")]
    NoLegalStartingXi(String),

    #[error("search budget exhausted after {evaluated} candidates without a feasible squad")]
    SearchExhausted { evaluated: u64 },
}

impl SquadError {
    /// Recoverable outcomes the caller may retry with a relaxed constraint,
    /// a larger row cap or a bigger search budget.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SquadError::NoSquadFound(_) | SquadError::SearchExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SquadError>;
