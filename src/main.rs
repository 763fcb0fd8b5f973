use std::{
    path::{Path, PathBuf},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use ctrnn_experiments::{
    common::Settings,
    ctrnn::{Ctrnn, Genome},
    evolve::{checkpoint::load_genome, Population, StatsLog, Trainer},
    task::{
        cube::{CubeTask, Point3},
        evaluate_genome,
        line::{LineTask, LineTrial},
    },
};

#[derive(Parser)]
#[command(name = "ctrnn_experiments")]
#[command(about = "Evolve CTRNN sender/receiver pairs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evolve a pair for the line task
    Train {
        /// JSON settings file
        config: PathBuf,

        /// Skip the two-goal warm-up stage
        #[arg(long)]
        single_stage: bool,

        /// Start every citizen from this genome
        #[arg(long)]
        resume: Option<PathBuf>,

        #[arg(long, default_value = "models")]
        models: PathBuf,

        #[arg(long, default_value = "logs")]
        logs: PathBuf,
    },

    /// Evolve a pair for the cube task
    Train3d {
        /// JSON settings file
        config: PathBuf,

        #[arg(long)]
        resume: Option<PathBuf>,

        #[arg(long, default_value = "models")]
        models: PathBuf,

        #[arg(long, default_value = "logs")]
        logs: PathBuf,
    },

    /// Play a saved genome on many fresh trials and summarise
    Evaluate {
        config: PathBuf,
        genome: PathBuf,
        trials: usize,

        /// Evaluate on the cube task with all six goals
        #[arg(long)]
        cube: bool,

        /// Start the line agents anywhere in [0, 0.3]
        #[arg(long)]
        random_starts: bool,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print one line trial as text frames
    Replay {
        config: PathBuf,
        genome: PathBuf,

        #[arg(long, default_value_t = 0.75)]
        goal: f64,

        /// Print every n-th step
        #[arg(long, default_value_t = 10)]
        every: usize,
    },

    /// Print the trajectory of Beer's two-neuron oscillator
    Oscillator {
        #[arg(long, default_value_t = 25_000)]
        steps: usize,

        #[arg(long, default_value_t = 0.01)]
        timestep: f64,

        #[arg(long, default_value_t = 100)]
        every: usize,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    match cli.command {
        Commands::Train { config, single_stage, resume, models, logs } => {
            let settings = load_settings(&config)?;
            train(&settings, resume.as_deref(), &models, &logs, |trainer, population| {
                if single_stage {
                    trainer.line_single_stage(population)?;
                } else {
                    trainer.line_curriculum(population)?;
                }
                Ok(())
            })
        }
        Commands::Train3d { config, resume, models, logs } => {
            let settings = load_settings(&config)?;
            train(&settings, resume.as_deref(), &models, &logs, |trainer, population| {
                let goals = trainer.cube_curriculum(population)?;
                info!(unlocked = goals.len(), "cube curriculum finished");
                Ok(())
            })
        }
        Commands::Evaluate { config, genome, trials, cube, random_starts, seed } => {
            let settings = load_settings(&config)?;
            let genome = load_genome(&genome).with_context(|| format!("loading {}", genome.display()))?;
            let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
            let summary = if cube {
                evaluate_genome(&CubeTask::new(&settings, Point3::axis_goals().to_vec()), &genome, trials, seed)?
            } else {
                let task = LineTask::uniform_goal(&settings);
                let task = if random_starts { task.with_random_starts() } else { task };
                evaluate_genome(&task, &genome, trials, seed)?
            };
            println!("{summary}");
            Ok(())
        }
        Commands::Replay { config, genome, goal, every } => {
            let settings = load_settings(&config)?;
            let genome = load_genome(&genome).with_context(|| format!("loading {}", genome.display()))?;
            let task = LineTask::uniform_goal(&settings);
            let trial = LineTrial { sender: 0.0, receiver: 0.0, goal };
            let mut step = 0;
            let report = task.run_observed(&genome, &trial, |sim| {
                if every > 0 && step % every == 0 {
                    println!("{}", sim.ascii_state());
                }
                step += 1;
            })?;
            println!("fitness {:.4}, touches {}, contact time {}", report.fitness, report.touches, report.contact_time);
            Ok(())
        }
        Commands::Oscillator { steps, timestep, every } => oscillator(steps, timestep, every),
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|err| anyhow!("installing the tracing subscriber: {err}"))
}

fn load_settings(path: &Path) -> Result<Settings> {
    let settings = Settings::from_json_file(path).with_context(|| format!("loading settings from {}", path.display()))?;
    if let Some(threads) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring the worker pool")?;
    }
    info!(?settings, "configuration");
    Ok(settings)
}

fn train<F>(settings: &Settings, resume: Option<&Path>, models: &Path, logs: &Path, curriculum: F) -> Result<()>
where
    F: FnOnce(&mut Trainer, &mut Population) -> Result<()>,
{
    let start = Instant::now();
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let log_path = logs.join(format!("{stamp}.txt"));
    let log = StatsLog::create(&log_path).with_context(|| format!("creating {}", log_path.display()))?;
    info!(path = %log_path.display(), "logging generations");

    let mut trainer = Trainer::new(settings, log).with_checkpoint(models.join("checkpoint.json"));
    let mut population = match resume {
        Some(path) => {
            let genome = load_genome(path).with_context(|| format!("loading {}", path.display()))?;
            if genome.shape() != settings.shape {
                bail!("{} has shape {:?} but the settings ask for {:?}", path.display(), genome.shape(), settings.shape);
            }
            Population::from_genome(genome, settings.population_size)
        }
        None => trainer.init_population()?,
    };

    curriculum(&mut trainer, &mut population)?;

    let best = trainer.save_best(&population, models.join("best_genome.json"))?;
    info!(fitness = ?best.fitness, elapsed = ?start.elapsed(), "training finished");
    Ok(())
}

fn oscillator(steps: usize, timestep: f64, every: usize) -> Result<()> {
    let genome: Genome = Genome::two_neuron_oscillator()?;
    let mut network = Ctrnn::new(&genome);
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    network.randomize_states(&mut rng, -0.5, 0.5);
    for step in 0..steps {
        network.euler_step(&[], timestep)?;
        if every > 0 && step % every == 0 {
            let outputs = network.outputs();
            println!("{:.2} {:.6} {:.6}", step as f64 * timestep, outputs[0], outputs[1]);
        }
    }
    Ok(())
}
