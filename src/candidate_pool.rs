use crate::combinations::binomial;
use crate::prediction::{PlayerPrediction, Position, rank_cmp};

/// Candidates considered per position unless configured otherwise.
pub const DEFAULT_ROWS_TO_CHECK: usize = 30;

/// Ranked, truncated candidate lists, one per position.
#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
    pools: [Vec<PlayerPrediction>; 4],
}

impl CandidatePools {
    pub fn get(&self, position: Position) -> &[PlayerPrediction] {
        &self.pools[position.index()]
    }

    pub fn sizes(&self) -> [usize; 4] {
        [
            self.pools[0].len(),
            self.pools[1].len(),
            self.pools[2].len(),
            self.pools[3].len(),
        ]
    }

    /// Positions that cannot fill their squad quota.
    pub fn short_positions(&self) -> Vec<Position> {
        Position::ALL
            .into_iter()
            .filter(|p| self.get(*p).len() < p.squad_quota())
            .collect()
    }

    /// Size of the full cross product C(k,2)·C(k,5)·C(k,5)·C(k,3), saturating.
    pub fn search_space(&self) -> u128 {
        Position::ALL.iter().fold(1u128, |acc, p| {
            acc.saturating_mul(binomial(self.get(*p).len(), p.squad_quota()))
        })
    }
}

/// Splits predictions by position, ranks each list and keeps the best
/// `rows_to_check` of each.
pub fn build_candidate_pools(
    predictions: &[PlayerPrediction],
    rows_to_check: usize,
) -> CandidatePools {
    let mut pools: [Vec<PlayerPrediction>; 4] = Default::default();
    for prediction in predictions {
        pools[prediction.position.index()].push(prediction.clone());
    }
    for pool in &mut pools {
        pool.sort_by(rank_cmp);
        pool.truncate(rows_to_check);
    }
    CandidatePools { pools }
}
