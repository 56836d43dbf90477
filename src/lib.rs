//! Clock-synchronized stimulus and checking for simple synchronous devices.
//!
//! A [`Runner`](runner::Runner) builds the device under test, starts a
//! [`Clock`](testbench::Clock) and a checker task on a fresh [`Sim`](sim::Sim),
//! and reports one [`TestOutcome`](runner::TestOutcome) per
//! [`Scenario`](scenario::Scenario). All tasks share one cooperative event
//! queue, so a run with the same seed always produces the same records.
//!
//! ```no_run
//! use synctb::prelude::*;
//!
//! let config = RunnerConfig::new(vec!["rtl/dff_pipe.vhd".into()], "dff_pipe");
//! let scenario = Scenario::new("directed")
//!     .stimulus(Stimulus::directed(&[1, 0, 1, 1, 0, 0, 1, 0, 1, 1]))
//!     .model(Latency::new(1, 0));
//! Runner::new(config).run(&scenario).into_result().unwrap();
//! ```

pub mod backend;
pub mod config;
pub mod device;
mod error;
mod executor;
mod junit;
pub mod prelude;
mod report;
pub mod runner;
pub mod scenario;
mod shared;
pub mod signal;
pub mod sim;
pub mod testbench;
pub mod time;
pub mod trigger;
pub mod value;
mod waveform;

pub use error::HarnessError;
pub use executor::JoinHandle;
pub use report::summary_table;
pub use shared::Shared;

pub type TbResult<T> = Result<T, HarnessError>;
