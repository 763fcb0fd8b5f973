pub mod genome;
pub mod network;

pub use genome::{Genome, GenomeData, GenomeError, InitSettings, MutationBounds, MutationOperator, Shape};
pub use network::{sigmoid, Ctrnn, NetworkError};
