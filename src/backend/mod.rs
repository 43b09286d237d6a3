//! Simulation backends.
//!
//! Both backends share one job flow ([`Backend::submit_job`]); they differ in
//! file naming, extra required parameters, driver script and result format.

mod lumerical;
mod tidy3d;

pub use lumerical::Lumerical;
pub use tidy3d::Tidy3d;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::engine::{Engine, EngineOutput, EngineRequest, RunMode};
use crate::error::{Error, Result};
use crate::gate::{ArtifactGate, Decision};
use crate::geometry::copy_geometry;
use crate::params::{keys, DefaultValue, JobDescriptor, LUMERICAL_DEFAULTS, TIDY3D_DEFAULTS};
use crate::spectrum::{CanonicalSpectrum, SpectrumReader};

/// Explicit backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Lumerical,
    Tidy3d,
}

impl BackendKind {
    pub fn defaults(&self) -> &'static [(&'static str, DefaultValue)] {
        match self {
            BackendKind::Lumerical => LUMERICAL_DEFAULTS,
            BackendKind::Tidy3d => TIDY3D_DEFAULTS,
        }
    }

    pub fn adapter(&self) -> Box<dyn Backend> {
        match self {
            BackendKind::Lumerical => Box::new(Lumerical),
            BackendKind::Tidy3d => Box::new(Tidy3d),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Lumerical => f.write_str("lumerical"),
            BackendKind::Tidy3d => f.write_str("tidy3d"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lumerical" | "fdtd" => Ok(BackendKind::Lumerical),
            "tidy3d" => Ok(BackendKind::Tidy3d),
            _ => Err(format!("unknown backend: {s}. Use: lumerical or tidy3d")),
        }
    }
}

pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Suffix of the engine's native result file, e.g. `_FDTD.fsp`
    fn artifact_suffix(&self) -> &'static str;

    /// Suffix of the JSON spectrum export written by the driver
    fn export_suffix(&self) -> &'static str;

    fn driver_suffix(&self) -> &'static str;

    /// Backend-specific parameters on top of [`keys::COMMON_REQUIRED`]
    fn extra_required(&self) -> &'static [&'static str];

    /// Monitor or port read when the caller names none
    fn default_monitor(&self) -> &'static str;

    fn driver_template(&self) -> &'static str;

    fn spectrum_reader(&self, mode: usize) -> Box<dyn SpectrumReader>;

    fn required_keys(&self) -> Vec<&'static str> {
        keys::COMMON_REQUIRED
            .iter()
            .chain(self.extra_required())
            .copied()
            .collect()
    }

    fn artifact_path(&self, job: &JobDescriptor) -> Result<PathBuf> {
        job.derived_path(self.artifact_suffix())
    }

    fn export_path(&self, job: &JobDescriptor) -> Result<PathBuf> {
        job.derived_path(self.export_suffix())
    }

    fn driver_path(&self, job: &JobDescriptor) -> Result<PathBuf> {
        job.derived_path(self.driver_suffix())
    }

    /// Fail on missing keys before anything is written
    fn check_job(&self, job: &JobDescriptor) -> Result<()> {
        let missing = job.missing_keys(&self.required_keys());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingParameters(missing))
        }
    }

    /// Copy the source geometry to the job's output geometry path
    fn prepare_geometry(&self, job: &JobDescriptor) -> Result<PathBuf> {
        let destination = job.output_geometry()?;
        copy_geometry(&job.source_geometry()?, &destination)?;
        Ok(destination)
    }

    /// Run the whole job flow; `Ok(None)` when the engine was not invoked
    fn submit_job(
        &self,
        job: &JobDescriptor,
        gate: &mut ArtifactGate,
        engine: &mut dyn Engine,
    ) -> Result<Option<EngineOutput>> {
        self.check_job(job)?;
        let run_requested = job.flag(keys::FLAG_RUN_SIMULATION)?;
        let artifact = self.artifact_path(job)?;
        let export = self.export_path(job)?;
        let driver = self.driver_path(job)?;

        self.prepare_geometry(job)?;

        let mode = match gate.check_and_confirm(&artifact) {
            Decision::Aborted => return Ok(None),
            Decision::RunFresh => RunMode::Fresh,
            Decision::ReuseExisting => RunMode::ReuseExisting,
        };

        if !run_requested {
            info!(
                "{} is disabled, {} job prepared without running",
                keys::FLAG_RUN_SIMULATION,
                self.kind()
            );
            return Ok(None);
        }

        info!("Submitting {} job {:?}", self.kind(), job.output_base()?);
        engine.run(&EngineRequest {
            job,
            backend: self.kind(),
            mode,
            artifact_path: &artifact,
            export_path: &export,
            driver_path: &driver,
            driver_template: self.driver_template(),
        })
    }

    /// Read the exported spectrum of a finished job
    fn collect_results(
        &self,
        job: &JobDescriptor,
        monitor: Option<&str>,
        mode: usize,
    ) -> Result<CanonicalSpectrum> {
        let monitor = monitor.unwrap_or(self.default_monitor());
        self.spectrum_reader(mode)
            .read(&self.export_path(job)?, monitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gate::PromptReply;
    use crate::params::{materialize_defaults, ParamValue};
    use std::fs;
    use std::path::Path;

    const HEADER_V600: [u8; 6] = [0x00, 0x06, 0x00, 0x02, 0x02, 0x58];

    /// Records each request and writes the artifact like a real engine would
    #[derive(Default)]
    struct FakeEngine {
        requests: Vec<(RunMode, PathBuf)>,
    }

    impl Engine for FakeEngine {
        fn run(&mut self, request: &EngineRequest<'_>) -> Result<Option<EngineOutput>> {
            fs::write(request.artifact_path, b"artifact")?;
            self.requests
                .push((request.mode, request.artifact_path.to_path_buf()));
            Ok(Some(EngineOutput {
                artifact_path: request.artifact_path.to_path_buf(),
                export_path: request.export_path.to_path_buf(),
                driver_path: None,
            }))
        }
    }

    fn job(kind: BackendKind, dir: &Path, run: i64) -> JobDescriptor {
        let gds = dir.join("mmi.gds");
        fs::write(&gds, HEADER_V600).unwrap();
        let base = dir.join("res6").to_string_lossy().into_owned();

        let mut map = materialize_defaults(kind.defaults());
        map.insert(keys::PREDEFINED_GDS.into(), gds.to_string_lossy().into_owned().into());
        map.insert(keys::FILE_NAME.into(), base.clone().into());
        map.insert(keys::GDS_FILE.into(), format!("{base}.gds").into());
        map.insert(keys::FLAG_RUN_SIMULATION.into(), ParamValue::Int(run));
        JobDescriptor::from_map(map)
    }

    fn never_asked() -> ArtifactGate {
        ArtifactGate::new(|_: &str| -> PromptReply { panic!("prompt must not be shown") })
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("Tidy3D".parse::<BackendKind>().unwrap(), BackendKind::Tidy3d);
        assert_eq!("lumerical".parse::<BackendKind>().unwrap(), BackendKind::Lumerical);
        assert!("meep".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_artifact_paths_differ_by_backend() {
        let dir = tempfile::tempdir().unwrap();
        let lum = job(BackendKind::Lumerical, dir.path(), 0);
        let tidy = job(BackendKind::Tidy3d, dir.path(), 0);

        let a = Lumerical.artifact_path(&lum).unwrap();
        let b = Tidy3d.artifact_path(&tidy).unwrap();
        assert!(a.to_string_lossy().ends_with("res6_FDTD.fsp"));
        assert!(b.to_string_lossy().ends_with("res6_results.hdf5"));
    }

    #[test]
    fn test_run_flag_off_copies_geometry_only() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(BackendKind::Lumerical, dir.path(), 0);
        let mut engine = FakeEngine::default();

        let out = Lumerical
            .submit_job(&job, &mut never_asked(), &mut engine)
            .unwrap();

        assert!(out.is_none());
        assert!(engine.requests.is_empty());
        assert!(job.output_geometry().unwrap().exists());
        assert!(!Lumerical.artifact_path(&job).unwrap().exists());
    }

    #[test]
    fn test_fresh_run_invokes_engine() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(BackendKind::Tidy3d, dir.path(), 1);
        let mut engine = FakeEngine::default();

        let out = Tidy3d
            .submit_job(&job, &mut never_asked(), &mut engine)
            .unwrap()
            .unwrap();

        assert_eq!(engine.requests.len(), 1);
        assert_eq!(engine.requests[0].0, RunMode::Fresh);
        assert!(out.artifact_path.exists());
    }

    #[test]
    fn test_existing_artifact_reuse_and_abort() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(BackendKind::Lumerical, dir.path(), 1);
        fs::write(Lumerical.artifact_path(&job).unwrap(), b"old").unwrap();

        let mut engine = FakeEngine::default();
        let mut abort = ArtifactGate::new(|_: &str| PromptReply::Answer("n".into()));
        assert!(Lumerical.submit_job(&job, &mut abort, &mut engine).unwrap().is_none());
        assert!(engine.requests.is_empty());

        let mut reuse = ArtifactGate::new(|_: &str| PromptReply::Answer("y".into()));
        Lumerical.submit_job(&job, &mut reuse, &mut engine).unwrap();
        assert_eq!(engine.requests.len(), 1);
        assert_eq!(engine.requests[0].0, RunMode::ReuseExisting);
    }

    #[test]
    fn test_missing_keys_fail_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let full = job(BackendKind::Tidy3d, dir.path(), 1);
        let mut map = full.as_map().clone();
        map.remove(keys::TASK_NAME);
        map.remove(keys::MODE_NUM);
        let job = JobDescriptor::from_map(map);

        let mut engine = FakeEngine::default();
        let err = Tidy3d
            .submit_job(&job, &mut never_asked(), &mut engine)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("task_name"));
        assert!(err.to_string().contains("mode_num"));
        assert!(!job.output_geometry().unwrap().exists());
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn test_lumerical_requires_api_path() {
        let dir = tempfile::tempdir().unwrap();
        let tidy_job = job(BackendKind::Tidy3d, dir.path(), 0);
        let err = Lumerical.check_job(&tidy_job).unwrap_err();
        assert!(err.to_string().contains("lumapi_path"));
        assert!(err.to_string().contains("wav_step"));
    }

    #[test]
    fn test_bad_geometry_is_geometry_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(BackendKind::Lumerical, dir.path(), 1);
        fs::write(job.source_geometry().unwrap(), b"not gds").unwrap();

        let mut engine = FakeEngine::default();
        let err = Lumerical
            .submit_job(&job, &mut never_asked(), &mut engine)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GeometryProcessing);
        assert!(engine.requests.is_empty());
    }
}
