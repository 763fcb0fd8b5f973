pub mod cube;
pub mod line;
pub mod motor;
pub mod report;

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::ctrnn::genome::Genome;
use crate::evolve::{aggregate::Aggregator, population::EvaluationError};

pub use report::{evaluate_genome, EvaluationSummary, TrialReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Where a start position or goal coordinate comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampling {
    Uniform { low: f64, high: f64 },
    /// Picks one value with equal probability. An empty list yields 0.
    Choice(Vec<f64>),
}

impl Sampling {
    pub fn fixed(value: f64) -> Sampling {
        Sampling::Choice(vec![value])
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampling::Uniform { low, high } => low + (high - low) * rng.gen::<f64>(),
            Sampling::Choice(values) => values.choose(rng).copied().unwrap_or_default(),
        }
    }
}

/// A two-agent task whose trials can be drawn from a seeded rng and played
/// out independently.
pub trait Scenario: Sync {
    type Trial: Send + Sync;

    fn ntrials(&self) -> usize;
    fn aggregator(&self) -> Aggregator;
    fn sample_trial<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Trial;
    fn run_trial(&self, genome: &Genome, trial: &Self::Trial) -> Result<TrialReport, EvaluationError>;
}

/// Fitness in [0, 1]: the aggregated trial scores divided by the aggregate of
/// a perfect run. Every trial is drawn from an rng seeded with `seed`, so the
/// same seed always yields the same trials.
pub fn score<S: Scenario>(scenario: &S, genome: &Genome, seed: u64) -> Result<f64, EvaluationError> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let ntrials = scenario.ntrials();
    let mut scores = Vec::with_capacity(ntrials);
    for _ in 0..ntrials {
        let trial = scenario.sample_trial(&mut rng);
        scores.push(scenario.run_trial(genome, &trial)?.fitness);
    }
    let aggregator = scenario.aggregator();
    Ok(aggregator.reduce(&scores) / aggregator.max_score(ntrials))
}

pub(crate) fn require_outputs(genome: &Genome, expected: usize) -> Result<(), EvaluationError> {
    let actual = genome.shape().outputs;
    if actual < expected {
        return Err(EvaluationError::TooFewOutputs { expected, actual });
    }
    Ok(())
}
