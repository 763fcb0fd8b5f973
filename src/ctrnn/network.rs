use rand::Rng;
use thiserror::Error;

use super::genome::Genome;

#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("got {actual} inputs but the network only has {expected} input connections")]
    TooManyInputs { expected: usize, actual: usize },
    #[error("a network built without a timestep can only be advanced with euler_step")]
    MissingTimestep,
}

/// Logistic function, split on the sign of `x` so `exp` never overflows.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Runtime state of one agent's network for one trial.
#[derive(Clone, Debug)]
pub struct Ctrnn {
    n_inputs: usize,
    n_outputs: usize,
    input_weights: Vec<f64>,
    output_weights: Option<Vec<f64>>,
    weights: Vec<f64>,
    biases: Vec<f64>,
    gains: Vec<f64>,
    r_taus: Vec<f64>,
    s_taus: Option<Vec<f64>>,
    padded_inputs: Vec<f64>,
    delta: Vec<f64>,
    states: Vec<f64>,
    outputs: Vec<f64>,
    external: Vec<f64>,
}

impl Ctrnn {
    pub fn new(genome: &Genome) -> Ctrnn {
        let shape = genome.shape();
        let h = shape.hidden;

        let mut input_weights = genome.input_weights().to_vec();
        input_weights.resize(h, 0.0);
        let output_weights = genome.output_weights().map(|o| {
            let mut padded = o.to_vec();
            padded.resize(h, 0.0);
            padded
        });

        let mut network = Ctrnn {
            n_inputs: shape.inputs,
            n_outputs: shape.outputs,
            input_weights,
            output_weights,
            weights: genome.weights().to_vec(),
            biases: genome.biases().to_vec(),
            gains: genome.gains().map_or_else(|| vec![1.0; h], |g| g.to_vec()),
            r_taus: genome.r_taus().to_vec(),
            s_taus: None,
            padded_inputs: vec![0.0; h],
            delta: vec![0.0; h],
            states: vec![0.0; h],
            outputs: vec![0.0; h],
            external: vec![0.0; shape.outputs],
        };
        network.update_outputs();
        network
    }

    /// Network with `r_taus * timestep` precomputed, advanced with [`Ctrnn::step`].
    pub fn with_timestep(genome: &Genome, timestep: f64) -> Ctrnn {
        let mut network = Ctrnn::new(genome);
        network.s_taus = Some(network.r_taus.iter().map(|r| r * timestep).collect());
        network
    }

    pub fn states(&self) -> &[f64] {
        &self.states
    }

    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }

    pub fn reset(&mut self) {
        self.states.iter_mut().for_each(|s| *s = 0.0);
        self.update_outputs();
    }

    pub fn randomize_states<R: Rng + ?Sized>(&mut self, rng: &mut R, low: f64, high: f64) {
        for s in self.states.iter_mut() {
            *s = rng.gen_range(low..=high);
        }
        self.update_outputs();
    }

    /// Advance by `timestep` with `inputs` on the input connections. Missing
    /// inputs are treated as zero.
    pub fn euler_step(&mut self, inputs: &[f64], timestep: f64) -> Result<&[f64], NetworkError> {
        self.load_inputs(inputs)?;
        self.compute_delta();
        for ((state, delta), r_tau) in self.states.iter_mut().zip(&self.delta).zip(&self.r_taus) {
            *state += timestep * r_tau * (delta - *state);
        }
        Ok(self.finish_step())
    }

    pub fn step(&mut self, inputs: &[f64]) -> Result<&[f64], NetworkError> {
        if self.s_taus.is_none() {
            return Err(NetworkError::MissingTimestep);
        }
        self.load_inputs(inputs)?;
        self.compute_delta();
        if let Some(s_taus) = &self.s_taus {
            for ((state, delta), s_tau) in self.states.iter_mut().zip(&self.delta).zip(s_taus) {
                *state += s_tau * (delta - *state);
            }
        }
        Ok(self.finish_step())
    }

    fn load_inputs(&mut self, inputs: &[f64]) -> Result<(), NetworkError> {
        if inputs.len() > self.n_inputs {
            return Err(NetworkError::TooManyInputs { expected: self.n_inputs, actual: inputs.len() });
        }
        self.padded_inputs.iter_mut().for_each(|p| *p = 0.0);
        self.padded_inputs[..inputs.len()].copy_from_slice(inputs);
        Ok(())
    }

    fn compute_delta(&mut self) {
        let h = self.states.len();
        for (to, delta) in self.delta.iter_mut().enumerate() {
            let recurrent: f64 = (0..h).map(|from| self.outputs[from] * self.weights[from * h + to]).sum();
            *delta = self.padded_inputs[to] * self.input_weights[to] + recurrent;
        }
    }

    fn update_outputs(&mut self) {
        for (((output, state), bias), gain) in self.outputs.iter_mut().zip(&self.states).zip(&self.biases).zip(&self.gains) {
            *output = sigmoid(gain * (state + bias));
        }
    }

    fn finish_step(&mut self) -> &[f64] {
        self.update_outputs();
        for (i, value) in self.external.iter_mut().enumerate() {
            *value = match &self.output_weights {
                Some(weights) => weights[i] * self.outputs[i],
                None => self.outputs[i],
            };
        }
        &self.external[..self.n_outputs]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrnn::genome::{GenomeData, InitSettings, Shape};
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn quiet_genome(inputs: usize, hidden: usize, outputs: usize) -> Genome {
        Genome::create(GenomeData {
            shape: Shape::new(inputs, hidden, outputs),
            input_weights: vec![1.0; inputs],
            output_weights: None,
            weights: vec![0.0; hidden * hidden],
            biases: vec![0.0; hidden],
            gains: None,
            taus: vec![1.0; hidden],
        })
        .unwrap()
    }

    #[test]
    fn sigmoid_is_stable_for_large_arguments() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!(sigmoid(-745.0) >= 0.0);
        assert_approx_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0);
    }

    #[test]
    fn step_returns_output_count_values() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        for (inputs, hidden, outputs) in [(0, 1, 0), (1, 1, 1), (3, 3, 1), (3, 6, 3), (2, 8, 0)] {
            let genome = Genome::init(&mut rng, Shape::new(inputs, hidden, outputs), &InitSettings::default()).unwrap();
            let mut network = Ctrnn::new(&genome);
            for _ in 0..5 {
                let out = network.euler_step(&vec![0.3; inputs], 0.1).unwrap();
                assert_eq!(out.len(), outputs);
                assert_eq!(network.states().len(), hidden);
                assert_eq!(network.outputs().len(), hidden);
            }
        }
    }

    #[test]
    fn forward_pass_is_deterministic() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let genome = Genome::init(&mut rng, Shape::new(3, 5, 2), &InitSettings::default()).unwrap();
        let inputs: Vec<Vec<f64>> = (0..100).map(|t| vec![(t as f64 * 0.1).sin(), 0.5, -1.0]).collect();
        let run = || -> Vec<Vec<f64>> {
            let mut network = Ctrnn::new(&genome);
            inputs.iter().map(|i| network.euler_step(i, 0.05).unwrap().to_vec()).collect()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn cached_timestep_matches_explicit_timestep() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let genome = Genome::init(&mut rng, Shape::new(2, 4, 2), &InitSettings::default()).unwrap();
        let mut explicit = Ctrnn::new(&genome);
        let mut cached = Ctrnn::with_timestep(&genome, 0.01);
        for _ in 0..50 {
            let a = explicit.euler_step(&[0.2, -0.4], 0.01).unwrap().to_vec();
            let b = cached.step(&[0.2, -0.4]).unwrap().to_vec();
            for (x, y) in a.iter().zip(&b) {
                assert_approx_eq!(*x, *y, 1e-12);
            }
        }
        assert_eq!(Ctrnn::new(&genome).step(&[]), Err(NetworkError::MissingTimestep));
    }

    #[test]
    fn zero_network_stays_at_rest() {
        let genome = quiet_genome(2, 3, 1);
        let mut network = Ctrnn::new(&genome);
        for _ in 0..1000 {
            let out = network.euler_step(&[0.0, 0.0], 0.1).unwrap().to_vec();
            assert_eq!(out, vec![0.5]);
        }
        // recurrent input with zero weights still feeds 0
        assert!(network.states().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn accumulates_towards_input() {
        // one node, weight 1 on the input, no recurrence: ds/dt = x - s
        let genome = quiet_genome(1, 1, 1);
        let mut network = Ctrnn::new(&genome);
        network.euler_step(&[1.0], 0.5).unwrap();
        assert_approx_eq!(network.states()[0], 0.5);
        network.euler_step(&[1.0], 0.5).unwrap();
        assert_approx_eq!(network.states()[0], 0.75);
    }

    #[test]
    fn short_inputs_are_zero_padded() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let genome = Genome::init(&mut rng, Shape::new(3, 4, 1), &InitSettings::default()).unwrap();
        let mut short = Ctrnn::new(&genome);
        let mut padded = Ctrnn::new(&genome);
        let a = short.euler_step(&[0.7], 0.1).unwrap().to_vec();
        let b = padded.euler_step(&[0.7, 0.0, 0.0], 0.1).unwrap().to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn too_many_inputs_fail() {
        let genome = quiet_genome(2, 3, 1);
        let mut network = Ctrnn::new(&genome);
        assert_eq!(
            network.euler_step(&[1.0, 2.0, 3.0], 0.1),
            Err(NetworkError::TooManyInputs { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn output_weights_scale_hidden_outputs() {
        let genome = Genome::create(GenomeData {
            shape: Shape::new(0, 2, 2),
            input_weights: vec![],
            output_weights: Some(vec![2.0, -3.0]),
            weights: vec![0.0; 4],
            biases: vec![0.0, 1.0],
            gains: Some(vec![1.0, 2.0]),
            taus: vec![1.0, 1.0],
        })
        .unwrap();
        let mut network = Ctrnn::new(&genome);
        let out = network.euler_step(&[], 0.1).unwrap().to_vec();
        assert_approx_eq!(out[0], 2.0 * 0.5);
        assert_approx_eq!(out[1], -3.0 * sigmoid(2.0));
    }

    #[test]
    fn reset_and_randomize() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(10);
        let genome = quiet_genome(1, 4, 1);
        let mut network = Ctrnn::new(&genome);
        network.randomize_states(&mut rng, -0.5, 0.5);
        assert!(network.states().iter().all(|s| (-0.5..=0.5).contains(s)));
        assert!(network.states().iter().any(|s| *s != 0.0));
        network.reset();
        assert!(network.states().iter().all(|s| *s == 0.0));
        assert!(network.outputs().iter().all(|o| *o == 0.5));
    }
}
