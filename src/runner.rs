//! Entry point: build the device under test, run scenarios against it and
//! report one [`TestOutcome`] per scenario.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::backend::{Backend, BuildRequest, ModelBackend};
use crate::config::RunnerConfig;
use crate::device::{instantiate, Device};
use crate::error::HarnessError;
use crate::junit;
use crate::report;
use crate::scenario::{run_checker, CheckerPorts, CycleFailure, CycleLog, CycleRecord, Scenario};
use crate::shared::Shared;
use crate::sim::Sim;
use crate::testbench::Clock;
use crate::time::{SimTime, TimeUnit};
use crate::TbResult;

/// Lifecycle of a single run. The last four states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Configured,
    Running,
    Passed,
    Failed,
    SetupError,
    Deadlock,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Configured => "configured",
            RunState::Running => "running",
            RunState::Passed => "passed",
            RunState::Failed => "failed",
            RunState::SetupError => "setup error",
            RunState::Deadlock => "deadlock",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(CycleFailure),
    SetupError { status: Option<i32>, diagnostic: String },
    Deadlock { reason: String },
}

impl Verdict {
    fn from_error(e: HarnessError) -> Self {
        match e {
            HarnessError::Assertion(failure) => Verdict::Failed(failure),
            HarnessError::Deadlock { reason } => Verdict::Deadlock { reason },
            HarnessError::Setup { status, diagnostic } => Verdict::SetupError { status, diagnostic },
            // bad port names, widths or clock specs: the run never got going
            other => Verdict::SetupError {
                status: None,
                diagnostic: other.to_string(),
            },
        }
    }

    pub fn state(&self) -> RunState {
        match self {
            Verdict::Passed => RunState::Passed,
            Verdict::Failed(_) => RunState::Failed,
            Verdict::SetupError { .. } => RunState::SetupError,
            Verdict::Deadlock { .. } => RunState::Deadlock,
        }
    }

    fn to_error(&self) -> Option<HarnessError> {
        match self {
            Verdict::Passed => None,
            Verdict::Failed(failure) => Some(HarnessError::Assertion(failure.clone())),
            Verdict::SetupError { status, diagnostic } => Some(HarnessError::Setup {
                status: *status,
                diagnostic: diagnostic.clone(),
            }),
            Verdict::Deadlock { reason } => Some(HarnessError::Deadlock {
                reason: reason.clone(),
            }),
        }
    }
}

/// Result of one scenario run.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    pub name: String,
    pub verdict: Verdict,
    pub total_cycles: usize,
    pub records: Vec<CycleRecord>,
    /// Stimulus seed; `None` for directed stimulus.
    pub seed: Option<u64>,
    pub sim_time_ns: f64,
    pub wall_time: Duration,
    /// Files written for this run (waveforms).
    pub artifacts: Vec<PathBuf>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn state(&self) -> RunState {
        self.verdict.state()
    }

    pub fn first_failing_cycle(&self) -> Option<usize> {
        match &self.verdict {
            Verdict::Failed(failure) => Some(failure.cycle),
            _ => None,
        }
    }

    /// Human readable verdict. A failure names the cycle, expected and
    /// observed values.
    pub fn message(&self) -> String {
        match self.verdict.to_error() {
            None => format!("passed after {} cycles", self.total_cycles),
            Some(e) => e.to_string(),
        }
    }

    pub fn into_result(self) -> TbResult<()> {
        match self.verdict.to_error() {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

pub struct Runner {
    config: RunnerConfig,
    backend: Box<dyn Backend>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_backend(config, ModelBackend::default())
    }

    pub fn with_backend(config: RunnerConfig, backend: impl Backend + 'static) -> Self {
        Self {
            config,
            backend: Box::new(backend),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs a single scenario and writes the reports.
    pub fn run(&self, scenario: &Scenario) -> TestOutcome {
        let outcome = self.run_one(scenario);
        self.report(std::slice::from_ref(&outcome));
        outcome
    }

    /// Runs every scenario on a fresh simulator, in order, and writes one
    /// combined report.
    pub fn run_all(&self, scenarios: &[Scenario]) -> Vec<TestOutcome> {
        let outcomes: Vec<TestOutcome> = scenarios.iter().map(|s| self.run_one(s)).collect();
        self.report(&outcomes);
        outcomes
    }

    fn run_one(&self, scenario: &Scenario) -> TestOutcome {
        let started = Instant::now();
        let mut state = RunState::Configured;
        log::info!("Scenario {}: {}", scenario.name, state);

        let seed = scenario.resolve_seed();
        if let Some(seed) = seed {
            log::info!("Scenario {}: stimulus seed {}", scenario.name, seed);
        }
        let log = Shared::new(CycleLog::default());
        let mut artifacts = Vec::new();
        let mut sim_time_ns = 0.0;

        let request = BuildRequest {
            sources: &self.config.sources,
            toplevel: &self.config.toplevel,
            build_dir: &self.config.build_dir,
            toolchain: &self.config.toolchain,
        };
        let result = match self.backend.build(&request) {
            Err(e) => Err(e),
            Ok(device) => {
                state = RunState::Running;
                log::info!("Scenario {}: {}", scenario.name, state);
                let sim = Sim::with_precision(self.config.precision());
                let result = self.simulate(&sim, device.as_ref(), scenario, seed, &log, &mut artifacts);
                sim.tear_down();
                if let Err(e) = sim.finish_trace() {
                    sim.warn(&format!("Failed to finish waveform: {}", e));
                }
                sim_time_ns = sim.time_in(TimeUnit::Ns);
                result
            }
        };

        let verdict = match result {
            Ok(()) => Verdict::Passed,
            Err(e) => Verdict::from_error(e),
        };
        state = verdict.state();
        let records = std::mem::take(&mut log.get_mut().records);
        let outcome = TestOutcome {
            name: scenario.name.clone(),
            verdict,
            total_cycles: records.len(),
            records,
            seed,
            sim_time_ns,
            wall_time: started.elapsed(),
            artifacts,
        };
        match state {
            RunState::Passed => log::info!("Scenario {}: {}", outcome.name, outcome.message()),
            _ => log::error!("Scenario {}: {}: {}", outcome.name, state, outcome.message()),
        }
        outcome
    }

    fn simulate(
        &self,
        sim: &Sim,
        device: &dyn Device,
        scenario: &Scenario,
        seed: Option<u64>,
        log: &Shared<CycleLog>,
        artifacts: &mut Vec<PathBuf>,
    ) -> TbResult<()> {
        let top = sim.root(&self.config.toplevel);
        instantiate(device, &top)?;
        let ports = CheckerPorts {
            clk: top.c(&scenario.clock)?,
            input: top.c(&scenario.input)?,
            output: top.c(&scenario.output)?,
        };

        if self.config.trace {
            let path = self.config.build_dir.join(format!("{}.vcd", scenario.name));
            sim.trace_to(&path)?;
            artifacts.push(path);
        }

        let clock = Clock::new(ports.clk.clone(), scenario.clock_spec)?;
        let limit = self.sim_time_limit(sim, scenario, clock.period_steps())?;
        clock.start()?;

        let name = format!("checker:{}", scenario.name);
        let mut checker = sim.spawn(&name, run_checker(scenario.clone(), ports, seed, log.clone()));
        let mut joined = None;
        sim.run_until(limit, self.config.watchdog.max_wall_time(), || {
            joined = checker.try_join();
            joined.is_some()
        })?;
        match joined {
            Some(result) => result?,
            None => Err(HarnessError::TaskCancelled),
        }
    }

    fn sim_time_limit(&self, sim: &Sim, scenario: &Scenario, period: u64) -> TbResult<SimTime> {
        let steps = match self.config.watchdog.max_sim_time {
            Some(span) => sim.steps(span.value, span.unit)?,
            None => {
                let cycles = (scenario.effective_cycles() + scenario.settle_cycles + 2) as u64;
                period.saturating_mul(cycles).saturating_mul(4)
            }
        };
        Ok(SimTime(steps))
    }

    fn report(&self, outcomes: &[TestOutcome]) {
        report::log_summary(outcomes);
        if self.config.junit {
            let suite = self.config.toplevel.as_str();
            match junit::write_results(&self.config.build_dir, suite, outcomes) {
                Ok(path) => log::info!("JUnit results written to {}", path.display()),
                Err(e) => log::warn!("Failed to write JUnit results: {}", e),
            }
        }
    }
}
