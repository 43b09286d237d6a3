//! Natural cubic spline interpolation for sparse transmission curves.

use crate::error::{Error, Result};

/// Piecewise cubic with continuous first and second derivatives and zero
/// curvature at both ends.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Fit through `(xs[i], ys[i])`; `xs` must be strictly increasing.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(Error::InvalidSpectrum(
                "spline knots and values differ in length".into(),
            ));
        }
        if xs.len() < 2 {
            return Err(Error::InvalidSpectrum("spline needs at least 2 knots".into()));
        }
        if let Some(i) = (1..xs.len()).find(|&i| xs[i] <= xs[i - 1]) {
            return Err(Error::InvalidSpectrum(format!(
                "spline knots must be strictly increasing at index {i}"
            )));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep of the tridiagonal system
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self { xs, ys, y2s })
    }

    /// Evaluate at `x`; outside the knots the end polynomials are extended.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();

        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }

    /// Evaluate on `points` evenly spaced samples spanning the knots
    pub fn resample(&self, points: usize) -> (Vec<f64>, Vec<f64>) {
        let (start, end) = (self.xs[0], self.xs[self.xs.len() - 1]);
        let grid = linspace(start, end, points);
        let values = grid.iter().map(|&x| self.evaluate(x)).collect();
        (grid, values)
    }
}

/// `points` evenly spaced values from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            let mut grid: Vec<f64> = (0..points).map(|i| start + step * i as f64).collect();
            grid[points - 1] = end;
            grid
        }
    }
}
