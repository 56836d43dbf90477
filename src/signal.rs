use std::fmt;

use crate::sim::Sim;
use crate::trigger::{EdgeKind, EdgeTrigger};
use crate::value::{Logic, Value};
use crate::TbResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub(crate) fn key(self) -> u64 {
        self.0 as u64
    }
}

/// Handle to a wire owned by the simulator.
///
/// Cheap to clone; every clone refers to the same wire. Reads never block,
/// writes take effect at the current simulated instant.
#[derive(Clone)]
pub struct Signal {
    id: SignalId,
    sim: Sim,
}

impl Signal {
    pub(crate) fn new(id: SignalId, sim: Sim) -> Self {
        Self { id, sim }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    pub fn name(&self) -> String {
        self.sim.signal_name(self.id)
    }

    pub fn width(&self) -> usize {
        self.sim.signal_width(self.id)
    }

    pub fn get(&self) -> Value {
        self.sim.read(self.id)
    }

    /// Integer value, `None` while any bit is X or Z.
    pub fn u64(&self) -> Option<u64> {
        self.get().to_u64()
    }

    pub fn bin(&self) -> String {
        self.get().bin()
    }

    pub fn set(&self, value: Value) -> TbResult<()> {
        self.sim.write(self.id, value)
    }

    pub fn set_u64(&self, value: u64) -> TbResult<()> {
        self.set(Value::from_u64(self.width(), value))
    }

    pub fn set_bit(&self, bit: Logic) -> TbResult<()> {
        self.set(Value::filled(self.width(), bit))
    }

    pub fn set_bin(&self, value: &str) -> TbResult<()> {
        self.set(Value::from_bin(value)?)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(&self) -> EdgeTrigger {
        EdgeTrigger::new(self.clone(), EdgeKind::Rising)
    }
    pub fn falling_edge(&self) -> EdgeTrigger {
        EdgeTrigger::new(self.clone(), EdgeKind::Falling)
    }
    pub fn edge(&self) -> EdgeTrigger {
        EdgeTrigger::new(self.clone(), EdgeKind::Any)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name())
            .field("value", &self.get())
            .finish()
    }
}

/// A level of the design hierarchy, e.g. the top-level of the device under test.
#[derive(Clone)]
pub struct Scope {
    name: String,
    sim: Sim,
}

impl Scope {
    pub(crate) fn new(name: &str, sim: Sim) -> Self {
        Self {
            name: name.to_string(),
            sim,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    fn child_name(&self, name: &str) -> String {
        format!("{}.{}", self.name, name)
    }

    /// Child signal by its local name.
    pub fn c(&self, name: &str) -> TbResult<Signal> {
        self.sim.signal(&self.child_name(name))
    }

    /// Declares a port of this scope.
    pub fn add_signal(&self, name: &str, width: usize, init: Option<Value>) -> TbResult<Signal> {
        self.sim.add_signal(&self.child_name(name), width, init)
    }
}
