pub mod aggregate;
pub mod checkpoint;
pub mod citizen;
pub mod population;
pub mod selection;
pub mod stats;
pub mod trainer;

pub use aggregate::{rank_reduce, Aggregator};
pub use citizen::{Citizen, Citizens};
pub use population::{EvaluationError, Evaluator, EvolveError, Population};
pub use stats::{GenerationStats, StatsLog};
pub use trainer::{Stage, StageOutcome, TrainError, Trainer};
