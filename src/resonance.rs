//! Resonance characterization: FWHM, dip wavelength and Q-factor.
//!
//! The spectrum is resampled through a natural cubic spline onto a uniform
//! grid. The half level sits halfway between the curve minimum and its
//! normalized maximum of 1, so the baseline of the dip is the curve minimum
//! rather than zero. The falling and rising half-level crossings bound the
//! resonance; only the first dip in the sweep is characterized.

use crate::error::{Error, Result};
use crate::spectrum::CanonicalSpectrum;
use crate::spline::CubicSpline;

/// Uniform resample size
pub const GRID_POINTS: usize = 1000;

/// Cubic interpolation needs at least this many samples
pub const MIN_SAMPLES: usize = 4;

/// Dynamic range below which a curve counts as flat
const FLAT_TOLERANCE: f64 = 1e-9;

/// Fractions of the wavelength span excluded at each end of a crossing scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeMargin {
    pub lower: f64,
    pub upper: f64,
}

impl EdgeMargin {
    pub const fn symmetric(fraction: f64) -> Self {
        Self {
            lower: fraction,
            upper: fraction,
        }
    }

    fn contains(&self, x: f64, start: f64, end: f64) -> bool {
        let span = end - start;
        x > start + self.lower * span && x < end - self.upper * span
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonanceConfig {
    pub grid_points: usize,
    /// Margin for the above-to-below crossing
    pub falling: EdgeMargin,
    /// Margin for the below-to-above crossing
    pub rising: EdgeMargin,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            grid_points: GRID_POINTS,
            falling: EdgeMargin::symmetric(0.005),
            rising: EdgeMargin::symmetric(0.005),
        }
    }
}

impl ResonanceConfig {
    /// Tighter lower edge on the falling scan, upper edges unchanged
    pub fn reference() -> Self {
        Self {
            falling: EdgeMargin {
                lower: 0.001,
                upper: 0.005,
            },
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.grid_points < MIN_SAMPLES {
            return Err(Error::validation(
                "grid_points",
                format!("must be at least {MIN_SAMPLES}"),
            ));
        }
        for (name, m) in [("falling", self.falling), ("rising", self.rising)] {
            if m.lower < 0.0 || m.upper < 0.0 || m.lower + m.upper >= 1.0 {
                return Err(Error::validation(
                    name,
                    "margins must be non-negative and leave part of the span",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonanceResult {
    /// Wavelength midway between the two crossings (µm)
    pub peak_wavelength: f64,
    pub fwhm: f64,
    pub q_factor: f64,
}

/// Intermediate curves behind a [`ResonanceResult`]
#[derive(Debug, Clone)]
pub struct ResonanceTrace {
    pub grid: Vec<f64>,
    pub curve: Vec<f64>,
    pub half_level: f64,
    pub falling_index: usize,
    pub rising_index: usize,
    pub peak_index: usize,
    pub result: ResonanceResult,
}

#[derive(Debug, Clone, Default)]
pub struct ResonanceAnalyzer {
    pub config: ResonanceConfig,
}

impl ResonanceAnalyzer {
    pub fn new(config: ResonanceConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, spectrum: &CanonicalSpectrum) -> Result<ResonanceResult> {
        self.trace(spectrum).map(|t| t.result)
    }

    pub fn trace(&self, spectrum: &CanonicalSpectrum) -> Result<ResonanceTrace> {
        self.config.validate()?;
        if spectrum.len() < MIN_SAMPLES {
            return Err(Error::InvalidSpectrum(format!(
                "{} samples, cubic interpolation needs at least {MIN_SAMPLES}",
                spectrum.len()
            )));
        }

        let spline = CubicSpline::new(spectrum.wavelengths().to_vec(), spectrum.power().to_vec())?;
        let (grid, curve) = spline.resample(self.config.grid_points);

        let minimum = curve.iter().copied().fold(f64::INFINITY, f64::min);
        let maximum = curve.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if maximum - minimum < FLAT_TOLERANCE {
            return Err(Error::ResonanceNotFound("transmission curve is flat".into()));
        }
        let half_level = 0.5 + 0.5 * minimum;

        let start = grid[0];
        let end = grid[grid.len() - 1];
        let n = grid.len();

        let falling_index = (1..n)
            .find(|&i| {
                curve[i] < half_level
                    && curve[i - 1] > half_level
                    && self.config.falling.contains(grid[i], start, end)
            })
            .ok_or_else(|| {
                Error::ResonanceNotFound(format!(
                    "curve never falls below half level {half_level:.4} inside the margins"
                ))
            })?;

        let rising_index = (0..n - 1)
            .find(|&i| {
                curve[i] < half_level
                    && curve[i + 1] > half_level
                    && self.config.rising.contains(grid[i], start, end)
            })
            .ok_or_else(|| {
                Error::ResonanceNotFound(format!(
                    "curve never rises back above half level {half_level:.4} inside the margins"
                ))
            })?;

        let fwhm = grid[rising_index] - grid[falling_index];
        if fwhm <= 0.0 {
            return Err(Error::ResonanceNotFound(format!(
                "rising crossing at {:.6} precedes falling crossing at {:.6}",
                grid[rising_index], grid[falling_index]
            )));
        }

        let peak_index = midpoint_index(falling_index, rising_index);
        let peak_wavelength = grid[peak_index];

        Ok(ResonanceTrace {
            half_level,
            falling_index,
            rising_index,
            peak_index,
            result: ResonanceResult {
                peak_wavelength,
                fwhm,
                q_factor: peak_wavelength / fwhm,
            },
            grid,
            curve,
        })
    }
}

/// Mean of two indices, ties rounded to even
fn midpoint_index(a: usize, b: usize) -> usize {
    let sum = a + b;
    let half = sum / 2;
    if sum % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}
