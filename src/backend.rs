//! Turning device-under-test sources into a simulatable device.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceRegistry};
use crate::error::HarnessError;
use crate::TbResult;

/// How sources are checked before the behavioral model is elaborated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Toolchain {
    /// Sources must exist and declare the top-level.
    #[default]
    Model,
    /// Additionally runs `program args.. sources..` in the build directory,
    /// e.g. `ghdl -a --std=08`. A non-zero exit fails the setup.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// What a backend needs to build a device.
#[derive(Clone, Debug)]
pub struct BuildRequest<'a> {
    pub sources: &'a [PathBuf],
    pub toplevel: &'a str,
    pub build_dir: &'a Path,
    pub toolchain: &'a Toolchain,
}

pub trait Backend {
    fn build(&self, request: &BuildRequest<'_>) -> TbResult<Box<dyn Device>>;
}

/// Builds devices from the [`DeviceRegistry`].
#[derive(Default)]
pub struct ModelBackend {
    registry: DeviceRegistry,
}

impl ModelBackend {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }
}

impl Backend for ModelBackend {
    fn build(&self, request: &BuildRequest<'_>) -> TbResult<Box<dyn Device>> {
        if request.sources.is_empty() {
            return Err(HarnessError::setup("no device-under-test sources given"));
        }
        let mut declared = false;
        for path in request.sources {
            let text = fs::read_to_string(path).map_err(|e| {
                HarnessError::setup(format!("cannot read source '{}': {}", path.display(), e))
            })?;
            declared |= declares_unit(&text, request.toplevel);
        }
        if !declared {
            return Err(HarnessError::setup(format!(
                "top-level '{}' is not declared in any source",
                request.toplevel
            )));
        }

        fs::create_dir_all(request.build_dir)?;
        if let Toolchain::Command { program, args } = request.toolchain {
            run_analysis(program, args, request)?;
        }

        self.registry.create(request.toplevel).ok_or_else(|| {
            HarnessError::setup(format!(
                "no behavioral model for top-level '{}' (known: {})",
                request.toplevel,
                self.registry.toplevels().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

/// True if `text` contains `entity <name>` or `module <name>`, ignoring case.
fn declares_unit(text: &str, name: &str) -> bool {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    words.windows(2).any(|pair| {
        let keyword = pair[0].to_ascii_lowercase();
        (keyword == "entity" || keyword == "module") && pair[1].eq_ignore_ascii_case(name)
    })
}

fn run_analysis(program: &str, args: &[String], request: &BuildRequest<'_>) -> TbResult<()> {
    let sources: Vec<PathBuf> = request
        .sources
        .iter()
        .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .collect();
    log::info!("Running {} {} on {} source(s)", program, args.join(" "), sources.len());
    let output = Command::new(program)
        .args(args)
        .args(&sources)
        .current_dir(request.build_dir)
        .output()
        .map_err(|e| HarnessError::setup(format!("failed to launch '{}': {}", program, e)))?;
    if output.status.success() {
        Ok(())
    } else {
        let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(HarnessError::Setup {
            status: output.status.code(),
            diagnostic,
        })
    }
}
