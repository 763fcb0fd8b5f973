use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ctrnn::genome::{GenomeError, InitDistribution, InitSettings, MutationBounds, MutationOperator, Shape, TauInit};
use crate::evolve::aggregate::Aggregator;
use crate::task::motor::Motor;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid network shape: {0}")]
    Shape(#[from] GenomeError),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    #[default]
    Sus,
    RankRoulette,
    Truncation,
}

/// Every knob of a run. Read once at start-up and passed by reference from
/// then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub population_size: usize,
    pub elitism: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub mutation_operator: MutationOperator,
    pub selection: SelectionMethod,
    /// Expected offspring of the best ranked citizen under SUS.
    pub max_exp_offspring: f64,
    pub ntrials: usize,
    pub simulation_seconds: f64,
    pub timestep: f64,
    pub motor: Motor,
    pub aggregator: Aggregator,
    pub log_every: usize,
    pub checkpoint_every: usize,
    pub stage_threshold: f64,
    pub stage_generations: usize,
    pub shape: Shape,
    pub init: InitSettings,
    pub bounds: MutationBounds,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::standard(3, 1)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid { field, reason: reason.into() }
}

fn check_range(field: &'static str, low: f64, high: f64) -> Result<(), SettingsError> {
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(invalid(field, format!("range {low}..{high} is empty or not finite")));
    }
    Ok(())
}

impl Settings {
    pub fn standard(n_inputs: usize, n_outputs: usize) -> Settings {
        Settings {
            population_size: 96,
            elitism: 0,
            generations: 1000,
            mutation_rate: 0.447,
            mutation_operator: MutationOperator::Beer,
            selection: SelectionMethod::Sus,
            max_exp_offspring: 1.1,
            ntrials: 20,
            simulation_seconds: 300.0,
            timestep: 1.0,
            motor: Motor::Clipped1,
            aggregator: Aggregator::RankReduce,
            log_every: 1,
            checkpoint_every: 20,
            stage_threshold: 0.9,
            stage_generations: 500,
            shape: Shape::new(n_inputs, n_inputs.max(n_outputs), n_outputs),
            init: InitSettings::default(),
            bounds: MutationBounds::default(),
            seed: None,
            threads: None,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Settings, SettingsError> {
        let text = fs::read_to_string(path)?;
        Settings::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Settings, SettingsError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.shape.validate()?;
        if self.population_size == 0 {
            return Err(invalid("population_size", "must be at least 1"));
        }
        if self.elitism > self.population_size {
            return Err(invalid("elitism", "cannot exceed the population size"));
        }
        if !(self.mutation_rate.is_finite() && self.mutation_rate >= 0.0) {
            return Err(invalid("mutation_rate", "must be finite and non-negative"));
        }
        if !(self.max_exp_offspring.is_finite() && self.max_exp_offspring >= 1.0) {
            return Err(invalid("max_exp_offspring", "must be finite and at least 1"));
        }
        if self.ntrials == 0 {
            return Err(invalid("ntrials", "must be at least 1"));
        }
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(invalid("timestep", "must be finite and positive"));
        }
        if !(self.simulation_seconds.is_finite() && self.simulation_seconds >= 0.0) {
            return Err(invalid("simulation_seconds", "must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&self.stage_threshold) {
            return Err(invalid("stage_threshold", "must lie in [0, 1]"));
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be at least 1 when given"));
        }

        match self.init.distribution {
            InitDistribution::Normal { std_dev } if !(std_dev.is_finite() && std_dev >= 0.0) => {
                return Err(invalid("init.distribution", "std_dev must be finite and non-negative"));
            }
            InitDistribution::Uniform { low, high } => check_range("init.distribution", low, high)?,
            _ => {}
        }
        match self.init.taus {
            TauInit::Constant { value } if !(value.is_finite() && value > 0.0) => {
                return Err(invalid("init.taus", "time constants must be finite and positive"));
            }
            TauInit::Uniform { low, high } => {
                check_range("init.taus", low, high)?;
                if low <= 0.0 {
                    return Err(invalid("init.taus", "time constants must be positive"));
                }
            }
            _ => {}
        }

        let taus = self.bounds.taus;
        if !(taus.min > 0.0 && taus.min <= taus.max && taus.max.is_finite()) {
            return Err(invalid("bounds.taus", "need 0 < min <= max < inf"));
        }
        let groups = [
            ("bounds.input_weights", self.bounds.input_weights),
            ("bounds.output_weights", self.bounds.output_weights),
            ("bounds.weights", self.bounds.weights),
            ("bounds.biases", self.bounds.biases),
            ("bounds.gains", self.bounds.gains),
        ];
        for (field, group) in groups {
            if !group.scale.is_finite() {
                return Err(invalid(field, "scale must be finite"));
            }
            if let (Some(min), Some(max)) = (group.min, group.max) {
                if min > max {
                    return Err(invalid(field, "min is larger than max"));
                }
            }
        }
        Ok(())
    }
}
