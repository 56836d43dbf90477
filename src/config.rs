//! Runner configuration, loadable from TOML.
//!
//! ```toml
//! sources = ["rtl/dff.vhd"]
//! toplevel = "dff"
//! build_dir = "sim_build"
//! precision = "ps"
//! trace = true
//!
//! [toolchain]
//! kind = "command"
//! program = "ghdl"
//! args = ["-a", "--std=08"]
//!
//! [watchdog]
//! max_sim_time = { value = 2, unit = "ms" }
//! max_wall_ms = 5000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Toolchain;
use crate::time::{Precision, TimeUnit};
use crate::TbResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub value: u64,
    pub unit: TimeUnit,
}

/// Bounds on a single run. Exceeding either is reported as a deadlock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Watchdog {
    /// Simulated time budget. Derived from the scenario when unset.
    pub max_sim_time: Option<TimeSpan>,
    /// Real time budget in milliseconds.
    pub max_wall_ms: Option<u64>,
}

impl Watchdog {
    pub fn max_wall_time(&self) -> Option<Duration> {
        self.max_wall_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub sources: Vec<PathBuf>,
    pub toplevel: String,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default)]
    pub toolchain: Toolchain,
    #[serde(default = "default_precision")]
    pub precision: TimeUnit,
    #[serde(default)]
    pub watchdog: Watchdog,
    /// Write a VCD waveform per scenario.
    #[serde(default)]
    pub trace: bool,
    /// Write `results.xml` in JUnit format.
    #[serde(default = "default_junit")]
    pub junit: bool,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("sim_build")
}

fn default_precision() -> TimeUnit {
    TimeUnit::Ps
}

fn default_junit() -> bool {
    true
}

impl RunnerConfig {
    pub fn new(sources: Vec<PathBuf>, toplevel: &str) -> Self {
        Self {
            sources,
            toplevel: toplevel.to_string(),
            build_dir: default_build_dir(),
            toolchain: Toolchain::default(),
            precision: default_precision(),
            watchdog: Watchdog::default(),
            trace: false,
            junit: default_junit(),
        }
    }

    pub fn build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn watchdog(mut self, watchdog: Watchdog) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn junit(mut self, junit: bool) -> Self {
        self.junit = junit;
        self
    }

    pub fn precision(&self) -> Precision {
        Precision(self.precision)
    }

    pub fn from_toml_str(text: &str) -> TbResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a config file. Relative source and build paths are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> TbResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.sources = config.sources.iter().map(|p| base.join(p)).collect();
            config.build_dir = base.join(&config.build_dir);
        }
        Ok(config)
    }
}
