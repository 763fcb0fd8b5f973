use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GenomeError {
    #[error("a network needs at least one hidden node")]
    NoHiddenNodes,
    #[error("{count} {kind} nodes cannot be wired to {hidden} hidden nodes")]
    TooManyEndpoints { kind: &'static str, count: usize, hidden: usize },
    #[error("{name} has {actual} values but the shape requires {expected}")]
    LengthMismatch { name: &'static str, expected: usize, actual: usize },
    #[error("time constant {index} is {value}, time constants must be finite and positive")]
    InvalidTau { index: usize, value: f64 },
    #[error("cannot draw {name} from {low}..{high}")]
    InvalidRange { name: &'static str, low: f64, high: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

impl Shape {
    pub fn new(inputs: usize, hidden: usize, outputs: usize) -> Shape {
        Shape { inputs, hidden, outputs }
    }

    pub fn validate(&self) -> Result<(), GenomeError> {
        if self.hidden == 0 {
            return Err(GenomeError::NoHiddenNodes);
        }
        if self.inputs > self.hidden {
            return Err(GenomeError::TooManyEndpoints { kind: "input", count: self.inputs, hidden: self.hidden });
        }
        if self.outputs > self.hidden {
            return Err(GenomeError::TooManyEndpoints { kind: "output", count: self.outputs, hidden: self.hidden });
        }
        Ok(())
    }
}

/// Raw parameter arrays of a genome. This is the persisted form; turning it
/// into a [`Genome`] checks every length against the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenomeData {
    pub shape: Shape,
    pub input_weights: Vec<f64>,
    #[serde(default)]
    pub output_weights: Option<Vec<f64>>,
    /// Row-major `hidden x hidden`, row = source node, column = target node.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    #[serde(default)]
    pub gains: Option<Vec<f64>>,
    pub taus: Vec<f64>,
}

/// The evolvable parameters of a fully recurrent CTRNN. Each input and each
/// output is wired to exactly one hidden node through a single weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GenomeData", into = "GenomeData")]
pub struct Genome {
    shape: Shape,
    input_weights: Vec<f64>,
    output_weights: Option<Vec<f64>>,
    weights: Vec<f64>,
    biases: Vec<f64>,
    gains: Option<Vec<f64>>,
    taus: Vec<f64>,
    r_taus: Vec<f64>,
}

impl TryFrom<GenomeData> for Genome {
    type Error = GenomeError;

    fn try_from(data: GenomeData) -> Result<Self, Self::Error> {
        Genome::create(data)
    }
}

impl From<Genome> for GenomeData {
    fn from(genome: Genome) -> GenomeData {
        GenomeData {
            shape: genome.shape,
            input_weights: genome.input_weights,
            output_weights: genome.output_weights,
            weights: genome.weights,
            biases: genome.biases,
            gains: genome.gains,
            taus: genome.taus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitDistribution {
    Normal { std_dev: f64 },
    Uniform { low: f64, high: f64 },
}

impl InitDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            InitDistribution::Normal { std_dev } => std_dev * rng.sample::<f64, _>(StandardNormal),
            InitDistribution::Uniform { low, high } => rng.gen_range(low..high),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TauInit {
    Constant { value: f64 },
    Uniform { low: f64, high: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitSettings {
    pub distribution: InitDistribution,
    pub center_crossing: bool,
    pub output_weights: bool,
    pub gains: bool,
    pub taus: TauInit,
}

impl Default for InitSettings {
    fn default() -> Self {
        InitSettings {
            distribution: InitDistribution::Normal { std_dev: 2.0 },
            center_crossing: false,
            output_weights: true,
            gains: true,
            taus: TauInit::Constant { value: 1.0 },
        }
    }
}

/// Beer-mutation rescaling factor and optional clip range for one parameter group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamBounds {
    pub scale: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParamBounds {
    pub fn scaled(scale: f64) -> ParamBounds {
        ParamBounds { scale, min: None, max: None }
    }

    fn clip(&self, values: &mut [f64]) {
        for v in values.iter_mut() {
            if let Some(min) = self.min {
                *v = v.max(min);
            }
            if let Some(max) = self.max {
                *v = v.min(max);
            }
        }
    }
}

impl Default for ParamBounds {
    fn default() -> Self {
        ParamBounds::scaled(1.0)
    }
}

/// Time constants are always clipped; `min` must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TauBounds {
    pub scale: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for TauBounds {
    fn default() -> Self {
        TauBounds { scale: 25.0, min: 1.0, max: 100.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationBounds {
    pub input_weights: ParamBounds,
    pub output_weights: ParamBounds,
    pub weights: ParamBounds,
    pub biases: ParamBounds,
    pub gains: ParamBounds,
    pub taus: TauBounds,
}

impl Default for MutationBounds {
    fn default() -> Self {
        MutationBounds {
            input_weights: ParamBounds::scaled(16.0),
            output_weights: ParamBounds::scaled(16.0),
            weights: ParamBounds::scaled(16.0),
            biases: ParamBounds::scaled(16.0),
            gains: ParamBounds::scaled(1.0),
            taus: TauBounds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperator {
    Gaussian,
    #[default]
    Beer,
}

impl MutationOperator {
    pub fn apply<R: Rng + ?Sized>(&self, genome: &mut Genome, rng: &mut R, rate: f64, bounds: &MutationBounds) {
        match self {
            MutationOperator::Gaussian => genome.mutate_gaussian(rng, rate, bounds),
            MutationOperator::Beer => genome.beer_mutate(rng, rate, bounds),
        }
    }
}

fn check_len(name: &'static str, values: &[f64], expected: usize) -> Result<(), GenomeError> {
    if values.len() != expected {
        return Err(GenomeError::LengthMismatch { name, expected, actual: values.len() });
    }
    Ok(())
}

fn check_taus(taus: &[f64]) -> Result<(), GenomeError> {
    if let Some((index, &value)) = taus.iter().enumerate().find(|(_, t)| !(t.is_finite() && **t > 0.0)) {
        return Err(GenomeError::InvalidTau { index, value });
    }
    Ok(())
}

fn check_range(name: &'static str, low: f64, high: f64) -> Result<(), GenomeError> {
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(GenomeError::InvalidRange { name, low, high });
    }
    Ok(())
}

fn add_noise<R: Rng + ?Sized>(rng: &mut R, values: &mut [f64], stddev: f64) {
    for v in values.iter_mut() {
        *v += stddev * rng.sample::<f64, _>(StandardNormal);
    }
}

fn add_slice(values: &mut [f64], delta: &[f64], scale: f64) {
    for (v, d) in values.iter_mut().zip(delta) {
        *v += d * scale;
    }
}

impl Genome {
    pub fn create(data: GenomeData) -> Result<Genome, GenomeError> {
        let shape = data.shape;
        shape.validate()?;
        let h = shape.hidden;
        check_len("input_weights", &data.input_weights, shape.inputs)?;
        if let Some(output_weights) = &data.output_weights {
            check_len("output_weights", output_weights, shape.outputs)?;
        }
        check_len("weights", &data.weights, h * h)?;
        check_len("biases", &data.biases, h)?;
        if let Some(gains) = &data.gains {
            check_len("gains", gains, h)?;
        }
        check_len("taus", &data.taus, h)?;
        check_taus(&data.taus)?;

        let r_taus = data.taus.iter().map(|t| t.recip()).collect();
        Ok(Genome {
            shape,
            input_weights: data.input_weights,
            output_weights: data.output_weights,
            weights: data.weights,
            biases: data.biases,
            gains: data.gains,
            taus: data.taus,
            r_taus,
        })
    }

    /// Random genome drawn from the configured distribution. Fails on an
    /// invalid shape, an empty draw range or a non-positive time constant.
    pub fn init<R: Rng + ?Sized>(rng: &mut R, shape: Shape, init: &InitSettings) -> Result<Genome, GenomeError> {
        shape.validate()?;
        if let InitDistribution::Uniform { low, high } = init.distribution {
            check_range("parameters", low, high)?;
        }
        if let TauInit::Uniform { low, high } = init.taus {
            check_range("taus", low, high)?;
        }
        let h = shape.hidden;
        let dist = init.distribution;
        let draw = |n: usize, rng: &mut R| -> Vec<f64> { (0..n).map(|_| dist.sample(rng)).collect() };

        let input_weights = draw(shape.inputs, rng);
        let output_weights = init.output_weights.then(|| draw(shape.outputs, rng));
        let weights = draw(h * h, rng);
        let biases = if init.center_crossing {
            (0..h).map(|to| -0.5 * (0..h).map(|from| weights[from * h + to]).sum::<f64>()).collect()
        } else {
            draw(h, rng)
        };
        let gains = init.gains.then(|| draw(h, rng));
        let taus: Vec<f64> = match init.taus {
            TauInit::Constant { value } => vec![value; h],
            TauInit::Uniform { low, high } => (0..h).map(|_| rng.gen_range(low..high)).collect(),
        };
        check_taus(&taus)?;
        let r_taus = taus.iter().map(|t| t.recip()).collect();

        Ok(Genome { shape, input_weights, output_weights, weights, biases, gains, taus, r_taus })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn input_weights(&self) -> &[f64] {
        &self.input_weights
    }

    pub fn output_weights(&self) -> Option<&[f64]> {
        self.output_weights.as_deref()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight(&self, from: usize, to: usize) -> f64 {
        self.weights[from * self.shape.hidden + to]
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    pub fn gains(&self) -> Option<&[f64]> {
        self.gains.as_deref()
    }

    pub fn taus(&self) -> &[f64] {
        &self.taus
    }

    pub fn r_taus(&self) -> &[f64] {
        &self.r_taus
    }

    /// Beer's two-neuron limit-cycle oscillator: no inputs or outputs, only
    /// the hidden pair.
    pub fn two_neuron_oscillator() -> Result<Genome, GenomeError> {
        Genome::create(GenomeData {
            shape: Shape::new(0, 2, 0),
            input_weights: vec![],
            output_weights: None,
            weights: vec![4.5, -1.0, 1.0, 4.5],
            biases: vec![-2.75, -1.75],
            gains: None,
            taus: vec![1.0, 1.0],
        })
    }

    /// Number of evolvable parameters, i.e. the dimension of a Beer mutation.
    pub fn param_count(&self) -> usize {
        let h = self.shape.hidden;
        self.input_weights.len()
            + self.output_weights.as_ref().map_or(0, |o| o.len())
            + h * h
            + h
            + self.gains.as_ref().map_or(0, |g| g.len())
            + h
    }

    pub fn mutate_gaussian<R: Rng + ?Sized>(&mut self, rng: &mut R, stddev: f64, bounds: &MutationBounds) {
        add_noise(rng, &mut self.input_weights, stddev);
        if let Some(output_weights) = self.output_weights.as_mut() {
            add_noise(rng, output_weights, stddev);
        }
        add_noise(rng, &mut self.weights, stddev);
        add_noise(rng, &mut self.biases, stddev);
        if let Some(gains) = self.gains.as_mut() {
            add_noise(rng, gains, stddev);
        }
        add_noise(rng, &mut self.taus, stddev);
        self.clip(bounds);
    }

    /// One step of random magnitude in a uniformly random direction of
    /// parameter space, rescaled per parameter group.
    pub fn beer_mutate<R: Rng + ?Sized>(&mut self, rng: &mut R, stddev: f64, bounds: &MutationBounds) {
        let magnitude = stddev * rng.sample::<f64, _>(StandardNormal);
        let mut direction: Vec<f64> = (0..self.param_count()).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            for d in direction.iter_mut() {
                *d *= magnitude / norm;
            }

            let h = self.shape.hidden;
            let n_outputs = self.output_weights.as_ref().map_or(0, |o| o.len());
            let n_gains = self.gains.as_ref().map_or(0, |g| g.len());
            let (inputs, rest) = direction.split_at(self.shape.inputs);
            let (outputs, rest) = rest.split_at(n_outputs);
            let (weights, rest) = rest.split_at(h * h);
            let (biases, rest) = rest.split_at(h);
            let (gains, taus) = rest.split_at(n_gains);

            add_slice(&mut self.input_weights, inputs, bounds.input_weights.scale);
            if let Some(output_weights) = self.output_weights.as_mut() {
                add_slice(output_weights, outputs, bounds.output_weights.scale);
            }
            add_slice(&mut self.weights, weights, bounds.weights.scale);
            add_slice(&mut self.biases, biases, bounds.biases.scale);
            if let Some(own_gains) = self.gains.as_mut() {
                add_slice(own_gains, gains, bounds.gains.scale);
            }
            add_slice(&mut self.taus, taus, bounds.taus.scale);
        }
        self.clip(bounds);
    }

    fn clip(&mut self, bounds: &MutationBounds) {
        bounds.input_weights.clip(&mut self.input_weights);
        if let Some(output_weights) = self.output_weights.as_mut() {
            bounds.output_weights.clip(output_weights);
        }
        bounds.weights.clip(&mut self.weights);
        bounds.biases.clip(&mut self.biases);
        if let Some(gains) = self.gains.as_mut() {
            bounds.gains.clip(gains);
        }
        for (tau, r_tau) in self.taus.iter_mut().zip(self.r_taus.iter_mut()) {
            // NaN noise would survive clamp, so fall back to the lower bound
            *tau = if tau.is_nan() { bounds.taus.min } else { tau.clamp(bounds.taus.min, bounds.taus.max) };
            *r_tau = tau.recip();
        }
    }
}
