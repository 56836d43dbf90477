pub use crate::backend::{Backend, BuildRequest, ModelBackend, Toolchain};
pub use crate::config::{RunnerConfig, TimeSpan, Watchdog};
pub use crate::device::{instantiate, Device, DeviceRegistry, Port, Register};
pub use crate::runner::{RunState, Runner, TestOutcome, Verdict};
pub use crate::scenario::{
    CycleFailure, CycleRecord, FailurePolicy, Identity, Latency, Model, Scenario, Stimulus,
};
pub use crate::signal::{Scope, Signal};
pub use crate::sim::Sim;
pub use crate::testbench::{clock_cycles, Clock, ClockSpec};
pub use crate::time::{Precision, SimTime, TimeUnit};
pub use crate::trigger::{await_edge, EdgeEvent, EdgeKind};
pub use crate::value::{Logic, Value};
pub use crate::{HarnessError, JoinHandle, Shared, TbResult};
pub use futures::future::FutureExt;
