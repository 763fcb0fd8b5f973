use itertools::{Itertools, MinMaxResult};
use rand::{distributions::WeightedError, Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{
    citizen::{Citizen, Citizens},
    selection,
    stats::GenerationStats,
};
use crate::common::{SelectionMethod, Settings};
use crate::ctrnn::{
    genome::{Genome, GenomeError},
    network::NetworkError,
};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("network has {actual} outputs but the task drives {expected} motors")]
    TooFewOutputs { expected: usize, actual: usize },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum EvolveError {
    #[error("population is empty")]
    EmptyPopulation,
    #[error("could not build a genome: {0}")]
    Genome(#[from] GenomeError),
    #[error("evaluating citizen {index} failed: {source}")]
    Evaluation {
        index: usize,
        #[source]
        source: EvaluationError,
    },
    #[error("citizen {index} scored a non-finite fitness ({value})")]
    NonFiniteFitness { index: usize, value: f64 },
    #[error("citizen {index} has not been assessed")]
    Unassessed { index: usize },
    #[error("bad selection weights: {0}")]
    Weights(#[from] WeightedError),
}

/// Scores a genome on a task. Must be deterministic in `(genome, seed)` so
/// parent and mutant face the same trials within a generation.
pub trait Evaluator: Sync {
    fn evaluate(&self, genome: &Genome, seed: u64) -> Result<f64, EvaluationError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Population {
    pub citizens: Citizens,
    pub generation: usize,
}

fn score<E: Evaluator>(evaluator: &E, genome: &Genome, seed: u64, index: usize) -> Result<f64, EvolveError> {
    let value = evaluator
        .evaluate(genome, seed)
        .map_err(|source| EvolveError::Evaluation { index, source })?;
    if !value.is_finite() {
        return Err(EvolveError::NonFiniteFitness { index, value });
    }
    Ok(value)
}

fn fitness_of(citizen: &Citizen) -> f64 {
    citizen.fitness.unwrap_or(f64::NEG_INFINITY)
}

impl Population {
    pub fn init<R: RngCore>(rng: &mut R, settings: &Settings) -> Result<Population, EvolveError> {
        let citizens = (0..settings.population_size)
            .map(|_| Citizen::init(rng, settings))
            .collect::<Result<Citizens, GenomeError>>()?;
        Ok(Population { citizens, generation: 0 })
    }

    /// Restart from a saved genome: every citizen starts as a copy of it.
    pub fn from_genome(genome: Genome, size: usize) -> Population {
        let citizens = (0..size).map(|_| Citizen::create(genome.clone())).collect();
        Population { citizens, generation: 0 }
    }

    pub fn len(&self) -> usize {
        self.citizens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citizens.is_empty()
    }

    pub fn best(&self) -> Option<&Citizen> {
        self.citizens.first()
    }

    /// Scores every citizen in parallel, then sorts best first. Nothing is
    /// written back unless every citizen scored a finite fitness.
    pub fn assess<E: Evaluator>(&mut self, evaluator: &E, seed: u64) -> Result<(), EvolveError> {
        if self.citizens.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }
        let fitnesses = self
            .citizens
            .par_iter()
            .enumerate()
            .map(|(index, citizen)| score(evaluator, &citizen.genome, seed, index))
            .collect::<Result<Vec<f64>, EvolveError>>()?;

        for (citizen, fitness) in self.citizens.iter_mut().zip(fitnesses) {
            citizen.fitness = Some(fitness);
        }
        self.sort()
    }

    /// Stable sort by descending fitness. Fails if anyone is unscored.
    pub fn sort(&mut self) -> Result<(), EvolveError> {
        if let Some(index) = self.citizens.iter().position(|c| c.fitness.is_none()) {
            return Err(EvolveError::Unassessed { index });
        }
        self.citizens.sort_by(|a, b| fitness_of(b).total_cmp(&fitness_of(a)));
        Ok(())
    }

    /// Replaces the population with a selected one of the same size. The
    /// best `elitism` citizens pass unchanged; the configured selector fills
    /// the remaining places from the rest.
    pub fn select<R: RngCore>(&mut self, rng: &mut R, settings: &Settings) -> Result<(), EvolveError> {
        if self.citizens.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }
        let elite = settings.elitism.min(self.citizens.len());
        let rest = &mut self.citizens.as_mut_slice()[elite..];
        let chosen = if rest.is_empty() {
            Vec::new()
        } else {
            match settings.selection {
                SelectionMethod::Sus => selection::sus(rng, rest, settings.max_exp_offspring)?,
                SelectionMethod::RankRoulette => selection::rank_roulette(rng, rest)?,
                SelectionMethod::Truncation => selection::truncation(rest)?,
            }
        };
        let mut next = self.citizens.as_slice()[..elite].to_vec();
        next.extend(chosen);
        self.citizens = Citizens::new(next);
        Ok(())
    }

    pub fn sus<R: RngCore>(&mut self, rng: &mut R, max_exp_offspring: f64) -> Result<(), EvolveError> {
        let selected = selection::sus(rng, self.citizens.as_mut_slice(), max_exp_offspring)?;
        self.citizens = Citizens::new(selected);
        Ok(())
    }

    /// One hill-climbing step per citizen: a mutated clone replaces its
    /// parent if it scores at least as well under the same `seed`, otherwise
    /// the parent ages by one. Returns the number of accepted children.
    pub fn mutate<E: Evaluator, R: RngCore>(&mut self, evaluator: &E, seed: u64, rng: &mut R, settings: &Settings) -> Result<usize, EvolveError> {
        if self.citizens.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }
        let seeds: Vec<u64> = (0..self.citizens.len()).map(|_| rng.gen()).collect();

        let children = self
            .citizens
            .par_iter()
            .zip(seeds.par_iter())
            .enumerate()
            .map(|(index, (citizen, &mutation_seed))| -> Result<Option<(Genome, f64)>, EvolveError> {
                let parent_fitness = citizen.fitness.ok_or(EvolveError::Unassessed { index })?;
                let mut local_rng = Xoshiro256PlusPlus::seed_from_u64(mutation_seed);
                let mut child = citizen.genome.clone();
                settings.mutation_operator.apply(&mut child, &mut local_rng, settings.mutation_rate, &settings.bounds);
                let child_fitness = score(evaluator, &child, seed, index)?;
                Ok((child_fitness >= parent_fitness).then_some((child, child_fitness)))
            })
            .collect::<Result<Vec<Option<(Genome, f64)>>, EvolveError>>()?;

        let mut accepted = 0;
        for (citizen, child) in self.citizens.iter_mut().zip(children) {
            match child {
                Some((genome, fitness)) => {
                    *citizen = Citizen { genome, fitness: Some(fitness), age: 0, rank_weight: 0.0 };
                    accepted += 1;
                }
                None => citizen.age += 1,
            }
        }
        debug!(generation = self.generation, accepted, "mutation phase done");
        self.sort()?;
        Ok(accepted)
    }

    pub fn mean_fitness(&self) -> Result<f64, EvolveError> {
        if self.citizens.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }
        let mut total = 0.0;
        for (index, citizen) in self.citizens.iter().enumerate() {
            total += citizen.fitness.ok_or(EvolveError::Unassessed { index })?;
        }
        Ok(total / self.citizens.len() as f64)
    }

    pub fn stats(&self, mutations: usize) -> Result<GenerationStats, EvolveError> {
        let mean_fitness = self.mean_fitness()?;
        let (min_fitness, max_fitness) = match self.citizens.iter().map(fitness_of).minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::NoElements => return Err(EvolveError::EmptyPopulation),
            MinMaxResult::OneElement(f) => (f, f),
            MinMaxResult::MinMax(min, max) => (min, max),
        };
        let ages = self.citizens.iter().map(|c| c.age).sorted().collect_vec();
        let mid = ages.len() / 2;
        let median_age = if ages.len() % 2 == 0 {
            (ages[mid - 1] + ages[mid]) as f64 / 2.0
        } else {
            ages[mid] as f64
        };
        Ok(GenerationStats {
            generation: self.generation,
            max_fitness,
            min_fitness,
            mean_fitness,
            max_age: ages[ages.len() - 1],
            min_age: ages[0],
            median_age,
            mutations,
        })
    }
}
