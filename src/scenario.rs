//! Clock-synchronized stimulus and checking.
//!
//! A [`Scenario`] drives one input port of the device under test and checks
//! one output port against an expected-value [`Model`], one clock cycle at a
//! time. All timing is taken from falling clock edges: the checker syncs to a
//! falling edge, then for every cycle drives the input, awaits the next
//! falling edge (one full period later) and samples the output there.

use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::shared::Shared;
use crate::signal::Signal;
use crate::testbench::{clock_cycles, ClockSpec};
use crate::time::{SimTime, TimeUnit};
use crate::trigger::{await_edge, EdgeKind};
use crate::value::Value;
use crate::TbResult;

/// Where the per-cycle input values come from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stimulus {
    /// Uniform draws over the legal values of the driven port. Without a
    /// seed one is drawn from the OS and recorded in the outcome.
    Random { seed: Option<u64> },
    /// Literal values, one per cycle.
    Directed(Vec<u64>),
}

impl Stimulus {
    pub fn random(seed: u64) -> Self {
        Stimulus::Random { seed: Some(seed) }
    }

    pub fn directed(values: &[u64]) -> Self {
        Stimulus::Directed(values.to_vec())
    }
}

enum Source {
    Random { rng: StdRng, width: usize },
    Directed { values: Vec<u64>, width: usize },
}

impl Source {
    fn next(&mut self, cycle: usize) -> Value {
        match self {
            Source::Random { rng, width } => {
                let v = if *width >= 64 {
                    rng.gen::<u64>()
                } else {
                    rng.gen_range(0..(1u64 << *width))
                };
                Value::from_u64(*width, v)
            }
            Source::Directed { values, width } => Value::from_u64(*width, values[cycle]),
        }
    }
}

/// Behavioral model of the device under test, giving the expected output
/// sample for each driven value.
pub trait Model {
    fn expect(&mut self, cycle: usize, driven: &Value) -> Value;

    /// A fresh model in its reset state.
    fn boxed_clone(&self) -> Box<dyn Model>;

    fn describe(&self) -> String;
}

/// Output follows the input `cycles` clock cycles later, counted at the
/// sampling edge. Before that the output holds the reset value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Latency {
    cycles: usize,
    reset: u64,
    // at most `cycles` values, oldest first
    pipeline: VecDeque<Value>,
}

impl Latency {
    pub fn new(cycles: usize, reset: u64) -> Self {
        Self {
            cycles,
            reset,
            pipeline: VecDeque::with_capacity(cycles + 1),
        }
    }
}

impl Model for Latency {
    fn expect(&mut self, _cycle: usize, driven: &Value) -> Value {
        self.pipeline.push_back(driven.clone());
        if self.pipeline.len() > self.cycles {
            self.pipeline
                .pop_front()
                .unwrap_or_else(|| Value::from_u64(driven.width(), self.reset))
        } else {
            Value::from_u64(driven.width(), self.reset)
        }
    }

    fn boxed_clone(&self) -> Box<dyn Model> {
        Box::new(Latency::new(self.cycles, self.reset))
    }

    fn describe(&self) -> String {
        format!("latency={} reset={}", self.cycles, self.reset)
    }
}

/// Output equals the value driven one period earlier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Identity;

impl Model for Identity {
    fn expect(&mut self, _cycle: usize, driven: &Value) -> Value {
        driven.clone()
    }

    fn boxed_clone(&self) -> Box<dyn Model> {
        Box::new(Identity)
    }

    fn describe(&self) -> String {
        "identity".to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first mismatch.
    #[default]
    FailFast,
    /// Record every mismatch and report the first one at the end.
    Continue,
}

/// One stimulus/check cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleRecord {
    pub cycle: usize,
    pub driven: Value,
    pub sampled: Value,
    pub expected: Value,
    pub passed: bool,
    pub drive_time: SimTime,
    pub sample_time: SimTime,
}

/// The first mismatch of a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleFailure {
    pub cycle: usize,
    pub signal: String,
    pub expected: Value,
    pub observed: Value,
    pub time: SimTime,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "output {} was incorrect on cycle {}: expected {}, observed {}",
            self.signal, self.cycle, self.expected, self.observed
        )
    }
}

/// Append-only record of a checker run. Written only by the checker task.
#[derive(Debug, Default)]
pub struct CycleLog {
    pub records: Vec<CycleRecord>,
    pub seed: Option<u64>,
}

/// One configured stimulus/check sequence.
pub struct Scenario {
    pub name: String,
    pub clock: String,
    pub clock_spec: ClockSpec,
    pub input: String,
    pub output: String,
    pub cycles: usize,
    /// Extra clock cycles to wait after the first falling edge before driving.
    pub settle_cycles: usize,
    pub stimulus: Stimulus,
    pub policy: FailurePolicy,
    model: Box<dyn Model>,
}

impl Clone for Scenario {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            clock: self.clock.clone(),
            clock_spec: self.clock_spec,
            input: self.input.clone(),
            output: self.output.clone(),
            cycles: self.cycles,
            settle_cycles: self.settle_cycles,
            stimulus: self.stimulus.clone(),
            policy: self.policy,
            model: self.model.boxed_clone(),
        }
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("cycles", &self.cycles)
            .field("stimulus", &self.stimulus)
            .field("policy", &self.policy)
            .field("model", &self.model.describe())
            .finish()
    }
}

impl Scenario {
    /// A scenario with the conventional `clk`/`d`/`q` ports, a 10us clock,
    /// ten random cycles and the [`Identity`] model.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            clock: "clk".to_string(),
            clock_spec: ClockSpec::new(5, TimeUnit::Us),
            input: "d".to_string(),
            output: "q".to_string(),
            cycles: 10,
            settle_cycles: 0,
            stimulus: Stimulus::Random { seed: None },
            policy: FailurePolicy::FailFast,
            model: Box::new(Identity),
        }
    }

    pub fn cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn clock(mut self, port: &str, spec: ClockSpec) -> Self {
        self.clock = port.to_string();
        self.clock_spec = spec;
        self
    }

    pub fn ports(mut self, input: &str, output: &str) -> Self {
        self.input = input.to_string();
        self.output = output.to_string();
        self
    }

    pub fn settle_cycles(mut self, cycles: usize) -> Self {
        self.settle_cycles = cycles;
        self
    }

    pub fn stimulus(mut self, stimulus: Stimulus) -> Self {
        self.stimulus = stimulus;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(mut self, model: impl Model + 'static) -> Self {
        self.model = Box::new(model);
        self
    }

    /// Cycles that will actually run; a directed sequence may be shorter.
    pub fn effective_cycles(&self) -> usize {
        match &self.stimulus {
            Stimulus::Directed(values) => self.cycles.min(values.len()),
            Stimulus::Random { .. } => self.cycles,
        }
    }

    /// Resolves the stimulus seed, drawing one if none was configured.
    pub fn resolve_seed(&self) -> Option<u64> {
        match self.stimulus {
            Stimulus::Random { seed } => Some(seed.unwrap_or_else(rand::random::<u64>)),
            Stimulus::Directed(_) => None,
        }
    }

    /// Fails if a directed value does not fit the driven port.
    fn source(&self, seed: Option<u64>, port: &Signal) -> TbResult<Source> {
        let width = port.width();
        match &self.stimulus {
            Stimulus::Random { .. } => Ok(Source::Random {
                rng: StdRng::seed_from_u64(seed.unwrap_or_default()),
                width,
            }),
            Stimulus::Directed(values) => {
                if let Some(v) = values.iter().find(|v| width < 64 && **v >> width != 0) {
                    return Err(HarnessError::InvalidValue {
                        value: format!("{} does not fit the {} bit port {}", v, width, port.name()),
                    });
                }
                Ok(Source::Directed {
                    values: values.clone(),
                    width,
                })
            }
        }
    }
}

/// Ports a checker works on.
pub struct CheckerPorts {
    pub clk: Signal,
    pub input: Signal,
    pub output: Signal,
}

/// The stimulus/checker task.
///
/// Every record is appended to `log` as soon as its cycle completes, so a
/// torn down run still reports the cycles it finished.
pub async fn run_checker(
    scenario: Scenario,
    ports: CheckerPorts,
    seed: Option<u64>,
    log: Shared<CycleLog>,
) -> TbResult<()> {
    let CheckerPorts { clk, input, output } = ports;
    let sim = clk.sim().clone();
    let mut source = scenario.source(seed, &input)?;
    let mut model = scenario.model.boxed_clone();
    log.with_mut(|l| l.seed = seed);

    // Synchronize with the clock
    clock_cycles(&clk, EdgeKind::Falling, 1 + scenario.settle_cycles).await;

    let mut first_failure: Option<CycleFailure> = None;
    for cycle in 0..scenario.effective_cycles() {
        let driven = source.next(cycle);
        input.set(driven.clone())?;
        let drive_time = sim.now();

        let sample = await_edge(&clk, EdgeKind::Falling).await;
        let sampled = output.get();
        let expected = model.expect(cycle, &driven);
        let passed = sampled == expected;
        log.with_mut(|l| {
            l.records.push(CycleRecord {
                cycle,
                driven,
                sampled: sampled.clone(),
                expected: expected.clone(),
                passed,
                drive_time,
                sample_time: sample.time,
            })
        });

        if !passed {
            let failure = CycleFailure {
                cycle,
                signal: output.name(),
                expected,
                observed: sampled,
                time: sample.time,
            };
            sim.error(&failure.to_string());
            match scenario.policy {
                FailurePolicy::FailFast => return Err(HarnessError::Assertion(failure)),
                FailurePolicy::Continue => {
                    first_failure.get_or_insert(failure);
                }
            }
        }
    }

    match first_failure {
        Some(failure) => Err(HarnessError::Assertion(failure)),
        None => Ok(()),
    }
}
