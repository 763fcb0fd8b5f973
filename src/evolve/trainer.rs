use std::path::{Path, PathBuf};

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    checkpoint::{save_genome, CheckpointError},
    citizen::Citizen,
    population::{EvolveError, Evaluator, Population},
    stats::StatsLog,
};
use crate::common::Settings;
use crate::task::{
    cube::{CubeTask, Point3},
    line::LineTask,
};

/// Threshold of the first cube stage. Later ones follow the population.
const CUBE_FIRST_THRESHOLD: f64 = 0.1;
const CUBE_THRESHOLD_GROWTH: f64 = 1.2;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Evolve(#[from] EvolveError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("could not write the stats log: {0}")]
    Log(#[from] std::io::Error),
    #[error("stage `{stage}` ended with mean fitness {mean_fitness:.4}, needed more than {threshold}")]
    StageFailed { stage: String, mean_fitness: f64, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    /// Generation counter value at which the stage stops.
    pub max_generation: usize,
    /// Mean fitness that ends the stage early.
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageOutcome {
    Passed { mean_fitness: f64 },
    Exhausted,
}

pub struct Trainer<'s> {
    settings: &'s Settings,
    rng: Xoshiro256PlusPlus,
    log: StatsLog,
    checkpoint: Option<PathBuf>,
}

impl<'s> Trainer<'s> {
    pub fn new(settings: &'s Settings, log: StatsLog) -> Trainer<'s> {
        let rng = match settings.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Trainer { settings, rng, log, checkpoint: None }
    }

    /// Write the current best genome here every `checkpoint_every` generations.
    pub fn with_checkpoint<P: Into<PathBuf>>(self, path: P) -> Trainer<'s> {
        Trainer { checkpoint: Some(path.into()), ..self }
    }

    pub fn init_population(&mut self) -> Result<Population, TrainError> {
        Ok(Population::init(&mut self.rng, self.settings)?)
    }

    /// Assess, select and mutate until the population's generation counter
    /// reaches `stage.max_generation` or its mean fitness beats the threshold.
    /// The passing generation is logged and checkpointed, then the stage
    /// returns without selecting, so the next stage starts from it.
    pub fn run_stage<E: Evaluator>(&mut self, population: &mut Population, evaluator: &E, stage: &Stage) -> Result<StageOutcome, TrainError> {
        info!(stage = %stage.name, generation = population.generation, threshold = ?stage.threshold, "starting stage");
        self.log.note(&format!("stage {}", stage.name))?;
        let settings = self.settings;
        let mut mutations = 0;

        while population.generation < stage.max_generation {
            let seed: u64 = self.rng.gen();
            population.assess(evaluator, seed)?;
            let generation = population.generation;
            let mean_fitness = population.mean_fitness()?;
            let passed = stage.threshold.is_some_and(|threshold| mean_fitness > threshold);

            if passed || (settings.checkpoint_every > 0 && generation % settings.checkpoint_every == 0) {
                self.save_checkpoint(population)?;
            }
            if passed || (settings.log_every > 0 && generation % settings.log_every == 0) {
                let stats = population.stats(mutations)?;
                info!(
                    generation,
                    max = stats.max_fitness,
                    mean = stats.mean_fitness,
                    min = stats.min_fitness,
                    mutations,
                    "generation assessed"
                );
                self.log.record(&stats)?;
                mutations = 0;
            }
            if passed {
                info!(stage = %stage.name, generation, mean_fitness, "stage passed");
                return Ok(StageOutcome::Passed { mean_fitness });
            }

            population.generation += 1;
            population.select(&mut self.rng, settings)?;
            mutations += population.mutate(evaluator, seed, &mut self.rng, settings)?;
        }
        Ok(StageOutcome::Exhausted)
    }

    fn save_checkpoint(&self, population: &Population) -> Result<(), TrainError> {
        if let (Some(path), Some(best)) = (&self.checkpoint, population.best()) {
            save_genome(path, &best.genome)?;
            debug!(path = %path.display(), fitness = ?best.fitness, "checkpoint written");
        }
        Ok(())
    }

    /// Writes the best citizen's genome to `path` and returns the citizen.
    pub fn save_best<'p, P: AsRef<Path>>(&self, population: &'p Population, path: P) -> Result<&'p Citizen, TrainError> {
        let best = population.best().ok_or(EvolveError::EmptyPopulation)?;
        save_genome(path.as_ref(), &best.genome)?;
        info!(path = %path.as_ref().display(), fitness = ?best.fitness, "best genome saved");
        Ok(best)
    }

    /// Two goals first, then goals anywhere in [0.5, 1]. Failing the first
    /// stage within `stage_generations` aborts the run.
    pub fn line_curriculum(&mut self, population: &mut Population) -> Result<(), TrainError> {
        let settings = self.settings;
        let first = Stage {
            name: "line-two-goals".to_string(),
            max_generation: settings.stage_generations,
            threshold: Some(settings.stage_threshold),
        };
        if self.run_stage(population, &LineTask::two_goals(settings), &first)? == StageOutcome::Exhausted {
            let mean_fitness = population.mean_fitness()?;
            warn!(stage = %first.name, mean_fitness, "failed to pass stage");
            return Err(TrainError::StageFailed { stage: first.name, mean_fitness, threshold: settings.stage_threshold });
        }

        let second = Stage {
            name: "line-uniform-goals".to_string(),
            max_generation: settings.generations,
            threshold: None,
        };
        self.run_stage(population, &LineTask::uniform_goal(settings), &second)?;
        Ok(())
    }

    /// Random starts and uniform goals for the whole budget.
    pub fn line_single_stage(&mut self, population: &mut Population) -> Result<(), TrainError> {
        let stage = Stage {
            name: "line".to_string(),
            max_generation: self.settings.generations,
            threshold: None,
        };
        let task = LineTask::uniform_goal(self.settings).with_random_starts();
        self.run_stage(population, &task, &stage)?;
        Ok(())
    }

    /// Starts with the +x goal and unlocks another axis goal, in random
    /// order, each time the mean fitness beats the current threshold. Each
    /// threshold is 1.2 times the mean that passed the previous one, capped
    /// at `stage_threshold`. Returns the goals unlocked when the budget ran out.
    pub fn cube_curriculum(&mut self, population: &mut Population) -> Result<Vec<Point3>, TrainError> {
        let settings = self.settings;
        let [first, rest @ ..] = Point3::axis_goals();
        let mut locked = rest.to_vec();
        locked.shuffle(&mut self.rng);
        let mut unlocked = vec![first];
        let mut threshold = CUBE_FIRST_THRESHOLD;

        loop {
            let task = CubeTask::new(settings, unlocked.clone());
            let stage = Stage {
                name: format!("cube-{}-goals", unlocked.len()),
                max_generation: settings.generations,
                threshold: (!locked.is_empty()).then_some(threshold),
            };
            match self.run_stage(population, &task, &stage)? {
                StageOutcome::Passed { mean_fitness } => {
                    threshold = (mean_fitness * CUBE_THRESHOLD_GROWTH).min(settings.stage_threshold);
                    if let Some(goal) = locked.pop() {
                        info!(%goal, next_threshold = threshold, "goal unlocked");
                        unlocked.push(goal);
                    }
                }
                StageOutcome::Exhausted => return Ok(unlocked),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrnn::genome::{Genome, Shape};
    use crate::evolve::population::EvaluationError;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    struct Constant(f64);

    impl Evaluator for Constant {
        fn evaluate(&self, _genome: &Genome, _seed: u64) -> Result<f64, EvaluationError> {
            Ok(self.0)
        }
    }

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn small_settings() -> Settings {
        Settings {
            population_size: 8,
            generations: 3,
            stage_generations: 2,
            ntrials: 2,
            simulation_seconds: 5.0,
            seed: Some(11),
            ..Settings::standard(3, 1)
        }
    }

    fn stage(max_generation: usize, threshold: Option<f64>) -> Stage {
        Stage { name: "test".to_string(), max_generation, threshold }
    }

    #[test]
    fn stage_passes_on_threshold() {
        let settings = small_settings();
        let mut trainer = Trainer::new(&settings, StatsLog::sink());
        let mut population = trainer.init_population().unwrap();
        let outcome = trainer.run_stage(&mut population, &Constant(0.5), &stage(10, Some(0.4))).unwrap();
        assert_eq!(outcome, StageOutcome::Passed { mean_fitness: 0.5 });
        assert_eq!(population.generation, 0);
    }

    #[test]
    fn passing_generation_is_logged_and_checkpointed() {
        let settings = Settings { log_every: 5, checkpoint_every: 0, ..small_settings() };
        let buffer = Shared::default();
        let dir = std::env::temp_dir().join(format!("ctrnn_trainer_pass_{}", std::process::id()));
        let mut trainer = Trainer::new(&settings, StatsLog::from_writer(buffer.clone())).with_checkpoint(dir.join("checkpoint.json"));
        let mut population = trainer.init_population().unwrap();
        population.generation = 3;
        let outcome = trainer.run_stage(&mut population, &Constant(0.5), &stage(10, Some(0.4))).unwrap();
        assert_eq!(outcome, StageOutcome::Passed { mean_fitness: 0.5 });

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 1 + 3);
        assert!(written.lines().nth(1).unwrap().starts_with("   3 - Fitness"));
        assert!(dir.join("checkpoint.json").exists());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn stage_runs_to_budget_and_logs() {
        let settings = small_settings();
        let buffer = Shared::default();
        let mut trainer = Trainer::new(&settings, StatsLog::from_writer(buffer.clone()));
        let mut population = trainer.init_population().unwrap();
        let outcome = trainer.run_stage(&mut population, &Constant(0.5), &stage(3, Some(0.5))).unwrap();
        assert_eq!(outcome, StageOutcome::Exhausted);
        assert_eq!(population.generation, 3);
        assert_eq!(population.len(), 8);
        // equal fitness always accepts the child
        assert!(population.citizens.iter().all(|c| c.age == 0));

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 1 + 3 * 3);
        assert!(written.lines().nth(1).unwrap().starts_with("   0 - Fitness"));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let settings = small_settings();
        let run = || {
            let mut trainer = Trainer::new(&settings, StatsLog::sink());
            let mut population = trainer.init_population().unwrap();
            trainer.line_single_stage(&mut population).unwrap();
            population.best().unwrap().clone()
        };
        let a = run();
        let b = run();
        assert_eq!(a.genome, b.genome);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn unreachable_first_stage_fails_the_line_curriculum() {
        let settings = Settings { stage_threshold: 1.0, ..small_settings() };
        let mut trainer = Trainer::new(&settings, StatsLog::sink());
        let mut population = trainer.init_population().unwrap();
        match trainer.line_curriculum(&mut population) {
            Err(TrainError::StageFailed { stage, threshold, .. }) => {
                assert_eq!(stage, "line-two-goals");
                assert_eq!(threshold, 1.0);
            }
            other => panic!("expected stage failure, got {other:?}"),
        }
        assert_eq!(population.generation, 2);
    }

    #[test]
    fn cube_curriculum_starts_with_positive_x() {
        let settings = Settings { population_size: 6, shape: Shape::new(6, 6, 3), ..small_settings() };
        let mut trainer = Trainer::new(&settings, StatsLog::sink());
        let mut population = trainer.init_population().unwrap();
        let goals = trainer.cube_curriculum(&mut population).unwrap();
        assert_eq!(goals[0], Point3::new(1.0, 0.0, 0.0));
        assert!(goals.len() <= 6);
        assert_eq!(population.generation, 3);
    }

    #[test]
    fn checkpoint_and_best_are_written() {
        let settings = Settings { checkpoint_every: 1, ..small_settings() };
        let dir = std::env::temp_dir().join(format!("ctrnn_trainer_{}", std::process::id()));
        let mut trainer = Trainer::new(&settings, StatsLog::sink()).with_checkpoint(dir.join("checkpoint.json"));
        let mut population = trainer.init_population().unwrap();
        trainer.run_stage(&mut population, &Constant(0.3), &stage(1, None)).unwrap();
        assert!(dir.join("checkpoint.json").exists());

        let best = trainer.save_best(&population, dir.join("best.json")).unwrap();
        let loaded = crate::evolve::checkpoint::load_genome(dir.join("best.json")).unwrap();
        assert_eq!(loaded, best.genome);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
