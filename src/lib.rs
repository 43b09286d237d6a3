//! waveguide-fdtd: run FDTD simulations of photonic waveguide devices and
//! characterize their resonances
//!
//! This crate provides:
//! - Layered parameter resolution with a JSON sidecar per job
//! - An overwrite gate for expensive simulation artifacts
//! - Lumerical and Tidy3D backends behind one [`Backend`] interface
//! - Readers normalizing both result formats into a [`CanonicalSpectrum`]
//! - FWHM, resonance wavelength and Q-factor extraction
//!
//! Wavelengths are in µm throughout; solver outputs in meters or Hz are
//! converted on read.

pub mod backend;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod params;
pub mod resolver;
pub mod resonance;
pub mod spectrum;
pub mod spline;

pub use backend::{Backend, BackendKind, Lumerical, Tidy3d};
pub use engine::{Engine, EngineOutput, EngineRequest, RunMode, ScriptEngine};
pub use error::{Error, ErrorKind, Result};
pub use gate::{ArtifactGate, Decision, Prompt, PromptReply, StdinPrompt};
pub use params::{ComplexValue, JobDescriptor, ParamMap, ParamValue};
pub use resolver::ParameterResolver;
pub use resonance::{EdgeMargin, ResonanceAnalyzer, ResonanceConfig, ResonanceResult};
pub use spectrum::{CanonicalSpectrum, ModeMonitorReader, PortTableReader, SpectrumReader};

/// Resolve, gate and run one job in a single call
pub fn simulate(
    resolver: &ParameterResolver,
    overrides: &ParamMap,
    gate: &mut ArtifactGate,
    engine: &mut dyn Engine,
) -> Result<(JobDescriptor, Option<EngineOutput>)> {
    let job = resolver.resolve(overrides)?;
    let output = resolver.backend().adapter().submit_job(&job, gate, engine)?;
    Ok((job, output))
}
