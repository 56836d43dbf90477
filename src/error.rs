//! Error types for the harness.
//!
//! Setup and deadlock errors end a run; assertion failures end a scenario.
//! Everything else is a misuse of the testbench API.

use std::io;

use crate::scenario::CycleFailure;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The device under test could not be built or elaborated.
    #[error("setup failed{}: {diagnostic}", .status.map(|s| format!(" (exit status {s})")).unwrap_or_default())]
    Setup {
        /// Exit status of the backend, if it ran as an external process.
        status: Option<i32>,
        diagnostic: String,
    },

    /// A sampled value did not match the expected one.
    #[error("{0}")]
    Assertion(CycleFailure),

    /// A wait could not be resolved within the watchdog budget.
    #[error("deadlock: {reason}")]
    Deadlock { reason: String },

    #[error("unknown signal '{name}'")]
    UnknownSignal { name: String },

    #[error("signal '{name}' already exists")]
    DuplicateSignal { name: String },

    #[error("width mismatch on '{name}': signal is {expected} bits, value is {actual} bits")]
    WidthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid value '{value}'")]
    InvalidValue { value: String },

    #[error("signal '{name}' is already driven by a clock")]
    MultipleDrivers { name: String },

    #[error("unknown time unit '{unit}'")]
    TimeUnit { unit: String },

    #[error("can't convert {time} {unit} to simulation steps without rounding (precision: {precision})")]
    TimePrecision {
        time: u64,
        unit: String,
        precision: String,
    },

    #[error("task was cancelled")]
    TaskCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl HarnessError {
    pub fn setup(diagnostic: impl Into<String>) -> Self {
        HarnessError::Setup {
            status: None,
            diagnostic: diagnostic.into(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(e: toml::de::Error) -> Self {
        HarnessError::Config {
            reason: e.to_string(),
        }
    }
}
