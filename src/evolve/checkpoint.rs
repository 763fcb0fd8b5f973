use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use thiserror::Error;

use crate::ctrnn::genome::Genome;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint is not a valid genome: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn save_genome<P: AsRef<Path>>(path: P, genome: &Genome) -> Result<(), CheckpointError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, genome)?;
    writer.flush()?;
    Ok(())
}

/// Loads a genome and re-validates its shape.
pub fn load_genome<P: AsRef<Path>>(path: P) -> Result<Genome, CheckpointError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
