pub mod common;
pub mod ctrnn;
pub mod evolve;
pub mod task;
