//! Engine invocation boundary.
//!
//! The solver itself is external. [`ScriptEngine`] renders a Python driver for
//! the selected backend and runs it to completion; there is no timeout.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::backend::BackendKind;
use crate::codegen::render_driver;
use crate::error::{Error, Result};
use crate::params::JobDescriptor;

/// How the gate decided the engine should treat an existing artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Fresh,
    ReuseExisting,
}

/// Everything an engine needs to run one job
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    pub job: &'a JobDescriptor,
    pub backend: BackendKind,
    pub mode: RunMode,
    /// Native result file the engine writes (or reloads)
    pub artifact_path: &'a Path,
    /// JSON spectrum export read back by the spectrum readers
    pub export_path: &'a Path,
    pub driver_path: &'a Path,
    pub driver_template: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub artifact_path: PathBuf,
    pub export_path: PathBuf,
    pub driver_path: Option<PathBuf>,
}

pub trait Engine {
    fn run(&mut self, request: &EngineRequest<'_>) -> Result<Option<EngineOutput>>;
}

/// Runs generated driver scripts with a Python interpreter
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    pub python: PathBuf,
    /// Directory holding the project's solver helpers, added to `sys.path`
    pub project_root: PathBuf,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python"),
            project_root: PathBuf::from("."),
        }
    }
}

impl ScriptEngine {
    /// Render and save the driver without running it
    pub fn write_driver(&self, request: &EngineRequest<'_>) -> Result<PathBuf> {
        let script = render_driver(request, &self.project_root)?;
        if let Some(dir) = request.driver_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(request.driver_path, script)?;
        info!("Driver script written to {:?}", request.driver_path);
        Ok(request.driver_path.to_path_buf())
    }
}

impl Engine for ScriptEngine {
    fn run(&mut self, request: &EngineRequest<'_>) -> Result<Option<EngineOutput>> {
        let driver = self.write_driver(request)?;

        info!("Running {:?} {:?}", self.python, driver);
        let status = Command::new(&self.python)
            .arg(&driver)
            .status()
            .map_err(|e| Error::Engine(format!("failed to start {:?}: {e}", self.python)))?;
        if !status.success() {
            return Err(Error::Engine(format!("driver {driver:?} exited with {status}")));
        }

        if !request.artifact_path.exists() {
            return Err(Error::Engine(format!(
                "driver finished without producing {:?}",
                request.artifact_path
            )));
        }

        Ok(Some(EngineOutput {
            artifact_path: request.artifact_path.to_path_buf(),
            export_path: request.export_path.to_path_buf(),
            driver_path: Some(driver),
        }))
    }
}
