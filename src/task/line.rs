use rand::Rng;

use super::{motor::Motor, report::TrialReport, require_outputs, Role, Sampling, Scenario};
use crate::common::Settings;
use crate::ctrnn::{genome::Genome, network::Ctrnn};
use crate::evolve::{
    aggregate::Aggregator,
    population::{EvaluationError, Evaluator},
};

pub const SENDER_RANGE: (f64, f64) = (0.0, 0.3);
pub const CONTACT_RANGE: f64 = 0.4;
/// Contact only counts towards contact time after this many seconds.
pub const CONTACT_GRACE: f64 = 150.0;

/// One-dimensional world: the sender knows how far the goal is, the receiver
/// has to get there. Only the sender is confined.
#[derive(Debug, Clone)]
pub struct LineLocation {
    pub goal: f64,
    pub sender: f64,
    pub receiver: f64,
    pub t: f64,
    pub touches: usize,
    pub contact_time: usize,
    previous_contact: bool,
    timestep: f64,
    motor: Motor,
}

impl LineLocation {
    pub fn create(sender: f64, receiver: f64, goal: f64, timestep: f64, motor: Motor) -> LineLocation {
        LineLocation {
            goal,
            sender: sender.clamp(SENDER_RANGE.0, SENDER_RANGE.1),
            receiver,
            t: 0.0,
            touches: 0,
            contact_time: 0,
            previous_contact: true,
            timestep,
            motor,
        }
    }

    pub fn in_contact(&self) -> bool {
        (self.sender - self.receiver).abs() <= CONTACT_RANGE
    }

    /// Sensor vector for one agent. Also updates the touch and contact-time
    /// counters, so contact time is counted once per sensing agent.
    pub fn sense(&mut self, role: Role) -> [f64; 3] {
        let contact = self.in_contact();
        if contact != self.previous_contact {
            self.previous_contact = contact;
            if contact {
                self.touches += 1;
            }
        }
        if contact && self.t > CONTACT_GRACE {
            self.contact_time += 1;
        }
        let contact = if contact { 1.0 } else { 0.0 };
        match role {
            Role::Sender => [contact, self.sender, (self.sender - self.goal).abs()],
            Role::Receiver => [contact, self.receiver, -1.0],
        }
    }

    pub fn step(&mut self, sender_output: f64, receiver_output: f64) {
        self.t += self.timestep;
        self.sender = (self.sender + self.motor.apply(sender_output, self.timestep)).clamp(SENDER_RANGE.0, SENDER_RANGE.1);
        self.receiver += self.motor.apply(receiver_output, self.timestep);
    }

    pub fn fitness(&self) -> f64 {
        (1.0 - (self.receiver - self.goal).abs()).max(0.0)
    }

    pub fn report(&self) -> TrialReport {
        TrialReport {
            fitness: self.fitness(),
            receiver_distance: (self.goal - self.receiver).abs(),
            sender_distance: (self.goal - self.sender).abs(),
            touches: self.touches,
            contact_time: self.contact_time,
        }
    }

    /// Text picture of the unit interval at 1% resolution: `S` sender,
    /// `R` receiver, `#` goal.
    pub fn ascii_state(&self) -> String {
        let mut cells = vec!['-'; 101];
        let cell = |x: f64| (x * 100.0).floor() as usize;
        if 0.0 < self.sender && self.sender < 1.0 {
            cells[cell(self.sender)] = 'S';
        }
        if 0.0 < self.receiver && self.receiver < 1.0 {
            cells[cell(self.receiver)] = 'R';
        }
        if (0.0..=1.0).contains(&self.goal) {
            cells[cell(self.goal)] = '#';
        }
        format!("t = {:.2}\n{}", self.t, cells.into_iter().collect::<String>())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineTrial {
    pub sender: f64,
    pub receiver: f64,
    pub goal: f64,
}

/// The line task as an [`Evaluator`]: fresh sender and receiver networks,
/// built from the same genome, play every trial.
#[derive(Debug, Clone)]
pub struct LineTask {
    pub sender_start: Sampling,
    pub receiver_start: Sampling,
    pub goal: Sampling,
    pub ntrials: usize,
    pub simulation_seconds: f64,
    pub timestep: f64,
    pub motor: Motor,
    pub aggregator: Aggregator,
}

impl LineTask {
    /// Both agents start at the origin.
    pub fn new(settings: &Settings, goal: Sampling) -> LineTask {
        LineTask {
            sender_start: Sampling::fixed(0.0),
            receiver_start: Sampling::fixed(0.0),
            goal,
            ntrials: settings.ntrials,
            simulation_seconds: settings.simulation_seconds,
            timestep: settings.timestep,
            motor: settings.motor,
            aggregator: settings.aggregator,
        }
    }

    /// First curriculum stage: goal at 0.5 or, twice as often, at 1.
    pub fn two_goals(settings: &Settings) -> LineTask {
        LineTask::new(settings, Sampling::Choice(vec![0.5, 1.0, 1.0]))
    }

    pub fn uniform_goal(settings: &Settings) -> LineTask {
        LineTask::new(settings, Sampling::Uniform { low: 0.5, high: 1.0 })
    }

    /// Start both agents somewhere in the sender's zone.
    pub fn with_random_starts(self) -> LineTask {
        let zone = Sampling::Uniform { low: SENDER_RANGE.0, high: SENDER_RANGE.1 };
        LineTask { sender_start: zone.clone(), receiver_start: zone, ..self }
    }

    /// Plays one trial, calling `observe` after every step.
    pub fn run_observed<F: FnMut(&LineLocation)>(&self, genome: &Genome, trial: &LineTrial, mut observe: F) -> Result<TrialReport, EvaluationError> {
        require_outputs(genome, 1)?;
        let mut sim = LineLocation::create(trial.sender, trial.receiver, trial.goal, self.timestep, self.motor);
        let mut sender = Ctrnn::with_timestep(genome, self.timestep);
        let mut receiver = Ctrnn::with_timestep(genome, self.timestep);

        while sim.t < self.simulation_seconds {
            let sender_out = sender.step(&sim.sense(Role::Sender))?[0];
            let receiver_out = receiver.step(&sim.sense(Role::Receiver))?[0];
            sim.step(sender_out, receiver_out);
            observe(&sim);
        }
        Ok(sim.report())
    }
}

impl Scenario for LineTask {
    type Trial = LineTrial;

    fn ntrials(&self) -> usize {
        self.ntrials
    }

    fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    fn sample_trial<R: Rng + ?Sized>(&self, rng: &mut R) -> LineTrial {
        LineTrial {
            sender: self.sender_start.sample(rng),
            receiver: self.receiver_start.sample(rng),
            goal: self.goal.sample(rng),
        }
    }

    fn run_trial(&self, genome: &Genome, trial: &LineTrial) -> Result<TrialReport, EvaluationError> {
        self.run_observed(genome, trial, |_| {})
    }
}

impl Evaluator for LineTask {
    fn evaluate(&self, genome: &Genome, seed: u64) -> Result<f64, EvaluationError> {
        super::score(self, genome, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrnn::genome::{GenomeData, InitSettings, Shape};
    use crate::ctrnn::network::NetworkError;
    use crate::task::report::evaluate_genome;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn settings() -> Settings {
        Settings { ntrials: 5, simulation_seconds: 40.0, ..Settings::standard(3, 1) }
    }

    /// Output node saturated high so both agents always drive right at full speed.
    fn full_speed() -> Genome {
        Genome::create(GenomeData {
            shape: Shape::new(3, 3, 1),
            input_weights: vec![0.0; 3],
            output_weights: None,
            weights: vec![0.0; 9],
            biases: vec![20.0, 0.0, 0.0],
            gains: None,
            taus: vec![1.0; 3],
        })
        .unwrap()
    }

    #[test]
    fn sensors_and_fitness() {
        let mut sim = LineLocation::create(0.1, 0.9, 0.75, 1.0, Motor::Clipped1);
        let sender = sim.sense(Role::Sender);
        assert_eq!(sender[..2], [0.0, 0.1]);
        assert_approx_eq!(sender[2], 0.65);
        assert_eq!(sim.sense(Role::Receiver), [0.0, 0.9, -1.0]);
        assert_approx_eq!(sim.fitness(), 0.85);

        let far = LineLocation::create(0.0, 3.0, 0.5, 1.0, Motor::Clipped1);
        assert_eq!(far.fitness(), 0.0);
    }

    #[test]
    fn sender_is_confined() {
        let mut sim = LineLocation::create(0.29, 0.0, 1.0, 1.0, Motor::Discrete);
        for _ in 0..10 {
            sim.step(1.0, 1.0);
        }
        assert_eq!(sim.sender, 0.3);
        assert_approx_eq!(sim.receiver, 0.1);
        for _ in 0..100 {
            sim.step(0.0, 0.5);
        }
        assert_eq!(sim.sender, 0.0);
        assert_eq!(sim.t, 110.0);
    }

    #[test]
    fn touches_count_new_contacts() {
        let mut sim = LineLocation::create(0.0, 0.0, 1.0, 1.0, Motor::Discrete);
        sim.sense(Role::Sender);
        assert_eq!(sim.touches, 0);
        sim.receiver = 0.5;
        sim.sense(Role::Sender);
        sim.receiver = 0.2;
        sim.sense(Role::Sender);
        sim.sense(Role::Receiver);
        assert_eq!(sim.touches, 1);
        assert_eq!(sim.contact_time, 0);
        sim.t = 151.0;
        sim.sense(Role::Sender);
        sim.sense(Role::Receiver);
        assert_eq!(sim.contact_time, 2);
    }

    #[test]
    fn ascii_marks_agents_and_goal() {
        let sim = LineLocation::create(0.1, 0.42, 0.75, 1.0, Motor::Clipped1);
        let picture = sim.ascii_state();
        let row: Vec<char> = picture.lines().nth(1).unwrap().chars().collect();
        assert_eq!(row.len(), 101);
        assert_eq!(row[10], 'S');
        assert_eq!(row[42], 'R');
        assert_eq!(row[75], '#');
        assert!(picture.starts_with("t = 0.00"));
    }

    #[test]
    fn trial_runs_for_simulation_seconds() {
        let settings = settings();
        let task = LineTask::uniform_goal(&settings);
        let trial = LineTrial { sender: 0.0, receiver: 0.0, goal: 0.5 };
        let mut steps = 0;
        let report = task.run_observed(&full_speed(), &trial, |_| steps += 1).unwrap();
        assert_eq!(steps, 40);
        // clipped1 of sigmoid(20) is just under 0.01 per step
        assert!(report.receiver_distance < 0.11 && report.receiver_distance > 0.09);
        assert_approx_eq!(report.sender_distance, 0.2);
    }

    #[test]
    fn evaluation_is_deterministic_per_seed() {
        let settings = settings();
        let task = LineTask::uniform_goal(&settings).with_random_starts();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let genome = Genome::init(&mut rng, settings.shape, &InitSettings::default()).unwrap();
        let a = task.evaluate(&genome, 99).unwrap();
        let b = task.evaluate(&genome, 99).unwrap();
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let settings = settings();
        let task = LineTask::two_goals(&settings);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let small = Genome::init(&mut rng, Shape::new(2, 2, 1), &InitSettings::default()).unwrap();
        assert!(matches!(
            task.evaluate(&small, 1),
            Err(EvaluationError::Network(NetworkError::TooManyInputs { expected: 2, actual: 3 }))
        ));
        let silent = Genome::init(&mut rng, Shape::new(3, 3, 0), &InitSettings::default()).unwrap();
        assert!(matches!(task.evaluate(&silent, 1), Err(EvaluationError::TooFewOutputs { expected: 1, actual: 0 })));
    }

    #[test]
    fn summary_over_many_trials() {
        let settings = settings();
        let task = LineTask::uniform_goal(&settings);
        let summary = evaluate_genome(&task, &full_speed(), 30, 5).unwrap();
        assert_eq!(summary.trials, 30);
        assert!(summary.receiver_distance.mean < 0.6);
        assert_eq!(summary, evaluate_genome(&task, &full_speed(), 30, 5).unwrap());
    }
}
