use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::executor::JoinHandle;
use crate::signal::Signal;
use crate::time::{Precision, TimeUnit};
use crate::trigger::{await_edge, EdgeEvent, EdgeKind};
use crate::value::Logic;
use crate::TbResult;

/*
 * CLOCK
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSpec {
    pub half_period: u64,
    pub unit: TimeUnit,
}

impl ClockSpec {
    pub fn new(half_period: u64, unit: TimeUnit) -> Self {
        Self { half_period, unit }
    }

    /// Full clock period in simulator steps.
    pub fn period_steps(&self, precision: Precision) -> TbResult<u64> {
        precision
            .to_steps(self.half_period, self.unit)?
            .checked_mul(2)
            .ok_or_else(|| period_overflow(self.half_period, self.unit))
    }
}

fn period_overflow(half_period: u64, unit: TimeUnit) -> HarnessError {
    HarnessError::Config {
        reason: format!("clock half period {half_period}{unit} overflows the simulation time range"),
    }
}

/// Periodic driver of a single clock signal.
pub struct Clock {
    signal: Signal,
    high_steps: u64,
    low_steps: u64,
}

impl Clock {
    pub fn new(signal: Signal, spec: ClockSpec) -> TbResult<Self> {
        let half = signal.sim().steps(spec.half_period, spec.unit)?;
        if half == 0 {
            return Err(HarnessError::Config {
                reason: format!("clock on {} needs a non-zero half period", signal.name()),
            });
        }
        if half.checked_mul(2).is_none() {
            return Err(period_overflow(spec.half_period, spec.unit));
        }
        Ok(Self {
            signal,
            high_steps: half,
            low_steps: half,
        })
    }

    /// Builds a clock from its full period. An odd period gets the longer low phase.
    pub fn from_period(signal: Signal, period: u64, unit: TimeUnit) -> TbResult<Self> {
        if period < 2 {
            return Err(HarnessError::Config {
                reason: format!("clock period {period}{unit} on {} is too short", signal.name()),
            });
        }
        let high_t = period / 2;
        let low_t = period - high_t;
        if period % 2 != 0 {
            signal.sim().warn(&format!(
                "Clock period {period}{unit} not dividable by 2. High time will be {high_t}{unit}; low time will be {low_t}{unit}."
            ));
        }
        let sim = signal.sim().clone();
        let high_steps = sim.steps(high_t, unit)?;
        let low_steps = sim.steps(low_t, unit)?;
        if high_steps.checked_add(low_steps).is_none() {
            return Err(period_overflow(high_t, unit));
        }
        Ok(Self {
            high_steps,
            low_steps,
            signal,
        })
    }

    /// Never overflows, the constructors reject such periods.
    pub fn period_steps(&self) -> u64 {
        self.high_steps + self.low_steps
    }

    /// Drives the clock low now and toggles it forever after.
    ///
    /// Fails if the signal already has a clock. The generator task ends
    /// quietly when the signal can no longer be written or the simulation is
    /// torn down.
    pub fn start(self) -> TbResult<JoinHandle<()>> {
        let sim = self.signal.sim().clone();
        sim.claim_clock(self.signal.id())?;
        sim.log(&format!(
            "Starting clock on {} (period {} steps)",
            self.signal.name(),
            self.period_steps()
        ));
        let name = format!("clock:{}", self.signal.name());
        Ok(sim.clone().spawn(&name, async move {
            loop {
                if self.signal.set_bit(Logic::Zero).is_err() {
                    break;
                }
                sim.timer_steps(self.low_steps).await;
                if self.signal.set_bit(Logic::One).is_err() {
                    break;
                }
                sim.timer_steps(self.high_steps).await;
            }
        }))
    }
}

/// Awaits `n_cycles` edges of `kind` on `signal`, returning the last one.
pub async fn clock_cycles(signal: &Signal, kind: EdgeKind, n_cycles: usize) -> Option<EdgeEvent> {
    let mut last = None;
    for _ in 0..n_cycles {
        last = Some(await_edge(signal, kind).await);
    }
    last
}
