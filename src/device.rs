//! Behavioral stand-ins for the device under test.
//!
//! The harness only sees a device through its ports. A [`Device`] declares
//! them and spawns whatever processes drive its outputs.

use std::collections::BTreeMap;

use crate::signal::Scope;
use crate::value::{Logic, Value};
use crate::TbResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub width: usize,
    pub init: Option<Value>,
}

impl Port {
    pub fn new(name: &str, width: usize, init: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            width,
            init,
        }
    }
}

pub trait Device {
    fn ports(&self) -> Vec<Port>;

    /// Spawns the device processes. Ports are already declared in `top`.
    fn elaborate(&self, top: &Scope) -> TbResult<()>;
}

/// Chain of `stages` rising-edge flip-flops from `d` to `q`.
///
/// One stage is a plain D flip-flop. Every stage starts at `reset`; `d` does
/// too, so nothing undefined is clocked in before the first drive.
#[derive(Clone, Debug)]
pub struct Register {
    stages: usize,
    width: usize,
    reset: u64,
}

impl Register {
    pub fn new(stages: usize, width: usize, reset: u64) -> Self {
        Self {
            stages: stages.max(1),
            width,
            reset,
        }
    }

    pub fn dff() -> Self {
        Self::new(1, 1, 0)
    }

    fn reset_value(&self) -> Value {
        Value::from_u64(self.width, self.reset)
    }
}

impl Device for Register {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new("clk", 1, Some(Value::bit(Logic::Zero))),
            Port::new("d", self.width, Some(self.reset_value())),
            Port::new("q", self.width, Some(self.reset_value())),
        ]
    }

    fn elaborate(&self, top: &Scope) -> TbResult<()> {
        let clk = top.c("clk")?;
        let d = top.c("d")?;
        let q = top.c("q")?;
        let mut stages = vec![self.reset_value(); self.stages];
        let name = format!("{}:register", top.name());
        top.sim().spawn(&name, async move {
            loop {
                clk.rising_edge().await;
                stages.rotate_right(1);
                stages[0] = d.get();
                if let Some(last) = stages.last() {
                    if q.set(last.clone()).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(())
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Device>>;

/// Maps top-level names to device factories.
pub struct DeviceRegistry {
    factories: BTreeMap<String, Factory>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("dff", || Box::new(Register::dff()));
        registry.register("dff_pipe", || Box::new(Register::new(2, 1, 0)));
        registry
    }
}

impl DeviceRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, toplevel: &str, factory: impl Fn() -> Box<dyn Device> + 'static) {
        self.factories.insert(toplevel.to_string(), Box::new(factory));
    }

    pub fn create(&self, toplevel: &str) -> Option<Box<dyn Device>> {
        self.factories.get(toplevel).map(|f| f())
    }

    pub fn toplevels(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Declares the ports of `device` under `top` and elaborates it.
pub fn instantiate(device: &dyn Device, top: &Scope) -> TbResult<()> {
    for port in device.ports() {
        top.add_signal(&port.name, port.width, port.init)?;
    }
    device.elaborate(top)
}
