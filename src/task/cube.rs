use std::{
    fmt,
    ops::{Add, Sub},
};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use super::{motor::Motor, report::TrialReport, require_outputs, Role, Scenario};
use crate::common::Settings;
use crate::ctrnn::{genome::Genome, network::Ctrnn};
use crate::evolve::{
    aggregate::Aggregator,
    population::{EvaluationError, Evaluator},
};

/// The sender lives in the cube `[-SENDER_REACH, SENDER_REACH]³`.
pub const SENDER_REACH: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Point3 {
        Point3 { x, y, z }
    }

    pub fn from_slice(values: &[f64]) -> Point3 {
        let at = |i: usize| values.get(i).copied().unwrap_or_default();
        Point3::new(at(0), at(1), at(2))
    }

    pub fn dist(&self, other: &Point3) -> f64 {
        let d = *self - *other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    /// Component-wise vector from `self` to `other`.
    pub fn offset_to(&self, other: &Point3) -> Point3 {
        *other - *self
    }

    pub fn clip(&self, reach: f64) -> Point3 {
        Point3::new(self.x.clamp(-reach, reach), self.y.clamp(-reach, reach), self.z.clamp(-reach, reach))
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// The six unit points on the axes.
    pub fn axis_goals() -> [Point3; 6] {
        [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ]
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, other: Point3) -> Point3 {
        Point3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, other: Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone)]
pub struct CubeLocation {
    pub goal: Point3,
    pub sender: Point3,
    pub receiver: Point3,
    pub t: f64,
    timestep: f64,
    motor: Motor,
}

impl CubeLocation {
    pub fn create(sender: Point3, receiver: Point3, goal: Point3, timestep: f64, motor: Motor) -> CubeLocation {
        CubeLocation { goal, sender: sender.clip(SENDER_REACH), receiver, t: 0.0, timestep, motor }
    }

    /// Offset to the other agent followed by the offset to the goal, which
    /// only the sender can see.
    pub fn sense(&self, role: Role) -> [f64; 6] {
        let (me, other) = match role {
            Role::Sender => (self.sender, self.receiver),
            Role::Receiver => (self.receiver, self.sender),
        };
        let [ox, oy, oz] = me.offset_to(&other).to_array();
        let [gx, gy, gz] = match role {
            Role::Sender => me.offset_to(&self.goal).to_array(),
            Role::Receiver => [-1.0; 3],
        };
        [ox, oy, oz, gx, gy, gz]
    }

    fn motion(&self, outputs: &[f64]) -> Point3 {
        let m = |v: f64| self.motor.apply(v, self.timestep);
        let p = Point3::from_slice(outputs);
        Point3::new(m(p.x), m(p.y), m(p.z))
    }

    pub fn step(&mut self, sender_outputs: &[f64], receiver_outputs: &[f64]) {
        self.t += self.timestep;
        self.sender = (self.sender + self.motion(sender_outputs)).clip(SENDER_REACH);
        self.receiver = self.receiver + self.motion(receiver_outputs);
    }

    pub fn fitness(&self) -> f64 {
        (1.0 - self.receiver.dist(&self.goal)).max(0.0)
    }

    pub fn report(&self) -> TrialReport {
        TrialReport {
            fitness: self.fitness(),
            receiver_distance: self.receiver.dist(&self.goal),
            sender_distance: self.sender.dist(&self.goal),
            touches: 0,
            contact_time: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeTrial {
    pub sender: Point3,
    pub receiver: Point3,
    pub goal: Point3,
}

/// Three-dimensional task. Agents start at the origin; the goal is drawn
/// from the currently unlocked `goals`.
#[derive(Debug, Clone)]
pub struct CubeTask {
    pub goals: Vec<Point3>,
    pub ntrials: usize,
    pub simulation_seconds: f64,
    pub timestep: f64,
    pub motor: Motor,
    pub aggregator: Aggregator,
}

impl CubeTask {
    pub fn new(settings: &Settings, goals: Vec<Point3>) -> CubeTask {
        CubeTask {
            goals,
            ntrials: settings.ntrials,
            simulation_seconds: settings.simulation_seconds,
            timestep: settings.timestep,
            motor: settings.motor,
            aggregator: settings.aggregator,
        }
    }

    pub fn run_observed<F: FnMut(&CubeLocation)>(&self, genome: &Genome, trial: &CubeTrial, mut observe: F) -> Result<TrialReport, EvaluationError> {
        require_outputs(genome, 3)?;
        let mut sim = CubeLocation::create(trial.sender, trial.receiver, trial.goal, self.timestep, self.motor);
        let mut sender = Ctrnn::with_timestep(genome, self.timestep);
        let mut receiver = Ctrnn::with_timestep(genome, self.timestep);

        while sim.t < self.simulation_seconds {
            let sender_sensors = sim.sense(Role::Sender);
            let receiver_sensors = sim.sense(Role::Receiver);
            let sender_out = sender.step(&sender_sensors)?;
            let receiver_out = receiver.step(&receiver_sensors)?;
            sim.step(sender_out, receiver_out);
            observe(&sim);
        }
        Ok(sim.report())
    }
}

impl Scenario for CubeTask {
    type Trial = CubeTrial;

    fn ntrials(&self) -> usize {
        self.ntrials
    }

    fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    fn sample_trial<R: Rng + ?Sized>(&self, rng: &mut R) -> CubeTrial {
        CubeTrial {
            sender: Point3::ORIGIN,
            receiver: Point3::ORIGIN,
            goal: self.goals.choose(rng).copied().unwrap_or_default(),
        }
    }

    fn run_trial(&self, genome: &Genome, trial: &CubeTrial) -> Result<TrialReport, EvaluationError> {
        self.run_observed(genome, trial, |_| {})
    }
}

impl Evaluator for CubeTask {
    fn evaluate(&self, genome: &Genome, seed: u64) -> Result<f64, EvaluationError> {
        if self.goals.is_empty() {
            return Err(EvaluationError::Other("cube task has no unlocked goals".to_string()));
        }
        super::score(self, genome, seed)
    }
}
