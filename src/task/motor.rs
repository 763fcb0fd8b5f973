use serde::{Deserialize, Serialize};

use crate::ctrnn::sigmoid;

/// Maps a raw network output onto a per-step displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motor {
    /// -0.01 below 0.25, +0.01 above 0.75, otherwise still.
    Discrete,
    #[default]
    Clipped1,
    Clipped2,
    Clipped3,
    Sigmoid,
    Tanh,
    /// Proportional to the timestep.
    Campos,
}

const MAX_SPEED: f64 = 0.01;

impl Motor {
    pub fn apply(&self, value: f64, timestep: f64) -> f64 {
        match self {
            Motor::Discrete => {
                if value < 0.25 {
                    -MAX_SPEED
                } else if value > 0.75 {
                    MAX_SPEED
                } else {
                    0.0
                }
            }
            Motor::Clipped1 => ((value - 0.5) / 50.0).clamp(-MAX_SPEED, MAX_SPEED),
            Motor::Clipped2 => ((value - 1.0) / 50.0).clamp(-MAX_SPEED, MAX_SPEED),
            Motor::Clipped3 => (value - 0.59).clamp(-MAX_SPEED, MAX_SPEED),
            Motor::Sigmoid => (sigmoid(value) - 0.5) / 50.0,
            Motor::Tanh => (value.tanh() - 0.5) / 50.0,
            Motor::Campos => 2.0 * (value - 0.5) * MAX_SPEED * timestep,
        }
    }
}
