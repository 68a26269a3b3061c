//! Fantasy Premier League squad selection.
//!
//! Takes per-player point predictions for the next gameweek, picks the best
//! 15-man squad under budget and per-team limits, then works out the starting
//! XI, bench order and captain.

pub mod candidate_pool;
pub mod combinations;
pub mod config;
pub mod constraint;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod lineup;
pub mod persist;
pub mod pipeline;
pub mod prediction;
pub mod selector;
pub mod source;

pub use error::{Result, SquadError};
