//! Transmission spectra: canonical form and backend-specific readers

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, Scalar};
use num_complex::Complex64;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::params::ComplexValue;

/// Speed of light in µm/s, so that `C_0 / f[Hz]` is a wavelength in µm
pub const C_0: f64 = 299_792_458e6;

pub const METERS_TO_MICROMETERS: f64 = 1e6;
pub const MICROMETERS_TO_NANOMETERS: f64 = 1e3;

/// Wavelengths (µm, strictly ascending) paired with power normalized to max 1
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSpectrum {
    wavelengths: Vec<f64>,
    power: Vec<f64>,
}

impl CanonicalSpectrum {
    /// Build from samples in any order.
    ///
    /// Descending input is flipped, anything else unordered is sorted.
    /// Repeated wavelengths and a non-positive peak are rejected.
    pub fn from_samples(mut wavelengths: Vec<f64>, mut power: Vec<f64>) -> Result<Self> {
        if wavelengths.len() != power.len() {
            return Err(Error::InvalidSpectrum(format!(
                "{} wavelengths but {} power samples",
                wavelengths.len(),
                power.len()
            )));
        }
        if wavelengths.is_empty() {
            return Err(Error::InvalidSpectrum("no samples".into()));
        }
        if wavelengths.iter().chain(&power).any(|v| !v.is_finite()) {
            return Err(Error::InvalidSpectrum("non-finite sample".into()));
        }

        if wavelengths.windows(2).all(|w| w[0] > w[1]) {
            wavelengths.reverse();
            power.reverse();
        } else if !is_strictly_ascending(&wavelengths) {
            let mut pairs: Vec<(f64, f64)> = wavelengths.into_iter().zip(power).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            (wavelengths, power) = pairs.into_iter().unzip();
            if !is_strictly_ascending(&wavelengths) {
                return Err(Error::InvalidSpectrum("repeated wavelength samples".into()));
            }
        }

        let max = power.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max <= 0.0 {
            return Err(Error::InvalidSpectrum(format!(
                "peak power must be positive, got {max}"
            )));
        }
        power.iter_mut().for_each(|p| *p /= max);

        Ok(Self { wavelengths, power })
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn power(&self) -> &[f64] {
        &self.power
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// Sample wavelength closest to `target`, with its index
    pub fn nearest(&self, target: f64) -> (f64, usize) {
        let idx = self
            .wavelengths
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0);
        (self.wavelengths[idx], idx)
    }
}

fn is_strictly_ascending(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] < w[1])
}

/// Reads one monitor (or port) of a result export into a canonical spectrum
pub trait SpectrumReader {
    fn read(&self, path: &Path, monitor: &str) -> Result<CanonicalSpectrum>;
}

fn read_export(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            what: "result",
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}

fn parse_export<'de, T: Deserialize<'de>>(path: &Path, text: &'de str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::MalformedArtifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn lookup<'a, T>(entries: &'a BTreeMap<String, T>, name: &str) -> Result<&'a T> {
    entries.get(name).ok_or_else(|| Error::MonitorNotFound {
        requested: name.to_string(),
        available: entries.keys().cloned().collect(),
    })
}

/// Rows-of-columns JSON into a dense matrix with `expected_rows` rows
fn table<T: Scalar>(path: &Path, rows: &[Vec<T>], expected_rows: usize) -> Result<DMatrix<T>> {
    let malformed = |reason: String| Error::MalformedArtifact {
        path: path.to_path_buf(),
        reason,
    };
    if rows.len() != expected_rows {
        return Err(malformed(format!(
            "{} table rows for {} spectral points",
            rows.len(),
            expected_rows
        )));
    }
    let cols = rows.first().map(Vec::len).unwrap_or(0);
    if cols == 0 || rows.iter().any(|r| r.len() != cols) {
        return Err(malformed("ragged or empty coefficient table".into()));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        cols,
        rows.iter().flatten().cloned(),
    ))
}

fn check_mode(mode: usize, available: usize) -> Result<()> {
    if mode < available {
        Ok(())
    } else {
        Err(Error::validation(
            "mode",
            format!("mode column {mode} out of range, table has {available}"),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct PortTableExport {
    ports: BTreeMap<String, PortTable>,
}

#[derive(Debug, Deserialize)]
struct PortTable {
    /// Wavelengths in meters, in solver order
    lambda: Vec<f64>,
    /// Net transmission, one row per wavelength, one column per mode
    #[serde(rename = "T_net")]
    t_net: Vec<Vec<f64>>,
}

/// Port expansion table exported from a Lumerical project
#[derive(Debug, Clone, Copy, Default)]
pub struct PortTableReader {
    /// Column of the coefficient table to read
    pub mode: usize,
}

impl SpectrumReader for PortTableReader {
    fn read(&self, path: &Path, port: &str) -> Result<CanonicalSpectrum> {
        let text = read_export(path)?;
        let export: PortTableExport = parse_export(path, &text)?;
        let data = lookup(&export.ports, port)?;

        let t_net = table(path, &data.t_net, data.lambda.len())?;
        check_mode(self.mode, t_net.ncols())?;

        let wavelengths = data.lambda.iter().map(|l| l * METERS_TO_MICROMETERS).collect();
        let power = t_net.column(self.mode).iter().copied().collect();

        info!("Read port {} ({} points) from {:?}", port, data.lambda.len(), path);
        CanonicalSpectrum::from_samples(wavelengths, power)
    }
}

/// Amplitude key of the forward-propagating mode
const FORWARD: &str = "+";

#[derive(Debug, Deserialize)]
struct MonitorExport {
    monitors: BTreeMap<String, ModeMonitor>,
}

#[derive(Debug, Deserialize)]
struct ModeMonitor {
    /// Frequencies in Hz
    f: Vec<f64>,
    /// Direction key to amplitudes, one row per frequency, one column per mode
    amps: BTreeMap<String, Vec<Vec<ComplexValue>>>,
}

/// Mode monitor amplitudes exported from Tidy3D simulation data
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeMonitorReader {
    pub mode: usize,
}

impl SpectrumReader for ModeMonitorReader {
    fn read(&self, path: &Path, monitor: &str) -> Result<CanonicalSpectrum> {
        let text = read_export(path)?;
        let export: MonitorExport = parse_export(path, &text)?;
        let data = lookup(&export.monitors, monitor)?;

        let rows = data
            .amps
            .get(FORWARD)
            .ok_or_else(|| Error::MalformedArtifact {
                path: path.to_path_buf(),
                reason: format!("no `{FORWARD}` amplitudes for {monitor}"),
            })?;
        let rows: Vec<Vec<Complex64>> = rows
            .iter()
            .map(|r| r.iter().map(|&c| c.into()).collect())
            .collect();
        let amps = table(path, &rows, data.f.len())?;
        check_mode(self.mode, amps.ncols())?;

        if data.f.iter().any(|f| *f <= 0.0) {
            return Err(Error::MalformedArtifact {
                path: path.to_path_buf(),
                reason: "non-positive frequency".into(),
            });
        }
        let wavelengths = data.f.iter().map(|f| C_0 / f).collect();
        let power = amps.column(self.mode).iter().map(|a| a.norm_sqr()).collect();

        info!("Read monitor {} ({} points) from {:?}", monitor, data.f.len(), path);
        CanonicalSpectrum::from_samples(wavelengths, power)
    }
}
