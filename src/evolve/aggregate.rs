use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// How per-trial scores collapse into one fitness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    #[default]
    RankReduce,
    Min,
    Mean,
}

impl Aggregator {
    pub fn reduce(&self, scores: &[f64]) -> f64 {
        match self {
            Aggregator::RankReduce => rank_reduce(scores),
            Aggregator::Min => min_score(scores),
            Aggregator::Mean => mean_score(scores),
        }
    }

    /// Aggregate of `ntrials` perfect scores, used to normalise fitness into [0, 1].
    pub fn max_score(&self, ntrials: usize) -> f64 {
        self.reduce(&vec![1.0; ntrials])
    }
}

/// Sum of the ascending-sorted scores, the i-th divided by i + 1. The worst
/// trial counts fully, later ones less and less.
pub fn rank_reduce(scores: &[f64]) -> f64 {
    scores
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .enumerate()
        .map(|(i, score)| score / (i + 1) as f64)
        .sum()
}

pub fn min_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn mean_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}
