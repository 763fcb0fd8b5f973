use std::{
    fmt,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub max_fitness: f64,
    pub min_fitness: f64,
    pub mean_fitness: f64,
    pub max_age: usize,
    pub min_age: usize,
    pub median_age: f64,
    /// Accepted mutations since the previous report.
    pub mutations: usize,
}

impl fmt::Display for GenerationStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{:4} - Fitness  : max:{:.4}, min:{:.4}, mean:{:.4}",
            self.generation, self.max_fitness, self.min_fitness, self.mean_fitness
        )?;
        writeln!(f, "       Age      : max:{}, min:{}, median:{:.1}", self.max_age, self.min_age, self.median_age)?;
        write!(f, "       Mutations: {}", self.mutations)
    }
}

/// Destination for per-generation summaries, usually one file per run.
pub struct StatsLog {
    writer: Box<dyn Write + Send>,
}

impl StatsLog {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<StatsLog> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(StatsLog::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> StatsLog {
        StatsLog { writer: Box::new(writer) }
    }

    /// Discards everything.
    pub fn sink() -> StatsLog {
        StatsLog::from_writer(io::sink())
    }

    pub fn record(&mut self, stats: &GenerationStats) -> io::Result<()> {
        writeln!(self.writer, "{stats}")?;
        self.writer.flush()
    }

    pub fn note(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}
