use std::fmt;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::Serialize;

use super::Scenario;
use crate::ctrnn::genome::Genome;
use crate::evolve::population::EvaluationError;

/// A trial counts as a success above this fitness.
pub const SUCCESS_FITNESS: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrialReport {
    pub fitness: f64,
    pub receiver_distance: f64,
    pub sender_distance: f64,
    pub touches: usize,
    pub contact_time: usize,
}

impl TrialReport {
    pub fn succeeded(&self) -> bool {
        self.fitness > SUCCESS_FITNESS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std_dev: f64,
}

impl MeanStd {
    /// Mean and sample standard deviation. Fewer than two values give a zero
    /// deviation.
    pub fn of(values: &[f64]) -> MeanStd {
        if values.is_empty() {
            return MeanStd { mean: 0.0, std_dev: 0.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        MeanStd { mean, std_dev }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub trials: usize,
    pub successes: usize,
    pub receiver_distance: MeanStd,
    pub sender_distance: MeanStd,
    pub mean_touches: f64,
    pub mean_contact_time: f64,
}

impl EvaluationSummary {
    pub fn from_reports(reports: &[TrialReport]) -> EvaluationSummary {
        let column = |f: fn(&TrialReport) -> f64| reports.iter().map(f).collect::<Vec<_>>();
        EvaluationSummary {
            trials: reports.len(),
            successes: reports.iter().filter(|r| r.succeeded()).count(),
            receiver_distance: MeanStd::of(&column(|r| r.receiver_distance)),
            sender_distance: MeanStd::of(&column(|r| r.sender_distance)),
            mean_touches: MeanStd::of(&column(|r| r.touches as f64)).mean,
            mean_contact_time: MeanStd::of(&column(|r| r.contact_time as f64)).mean,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.trials == 0 {
            return 0.0;
        }
        self.successes as f64 / self.trials as f64
    }
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} ({:.2}%) successes across {} trials",
            self.successes,
            100.0 * self.success_rate(),
            self.trials
        )?;
        writeln!(
            f,
            "Mean absolute receiver distance from goal: {:.4} (standard deviation {:.4})",
            self.receiver_distance.mean, self.receiver_distance.std_dev
        )?;
        writeln!(
            f,
            "Mean absolute sender distance from goal: {:.4} (standard deviation {:.4})",
            self.sender_distance.mean, self.sender_distance.std_dev
        )?;
        writeln!(f, "Mean touches: {:.2}", self.mean_touches)?;
        write!(f, "Mean contact time: {:.2}", self.mean_contact_time)
    }
}

/// Plays `ntrials` independent trials in parallel. Trials are drawn up front
/// from `seed`, so the summary does not depend on the thread count.
pub fn evaluate_genome<S: Scenario>(scenario: &S, genome: &Genome, ntrials: usize, seed: u64) -> Result<EvaluationSummary, EvaluationError> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let trials: Vec<S::Trial> = (0..ntrials).map(|_| scenario.sample_trial(&mut rng)).collect();
    let reports = trials
        .par_iter()
        .map(|trial| scenario.run_trial(genome, trial))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EvaluationSummary::from_reports(&reports))
}
