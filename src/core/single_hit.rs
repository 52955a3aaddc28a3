//! Single-hit dose spectrum f1 as handed over by the upstream builder.
//!
//! `f1` is a density (per Gy) sampled at bin doses `d_gy` with bin widths
//! `dd_gy`; the physical models producing it live outside this crate.

use crate::core::density::{density_to_mass, first_moment, second_moment};
use crate::core::log2space::Log2Space;
use crate::core::{ConvolutionError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct SingleHitSpectrum {
    pub d_gy: Vec<f64>,
    pub dd_gy: Vec<f64>,
    pub f1: Vec<f64>,
}

impl SingleHitSpectrum {
    /// Validate and wrap the three parallel arrays.
    pub fn new(d_gy: Vec<f64>, dd_gy: Vec<f64>, f1: Vec<f64>) -> Result<Self> {
        if d_gy.is_empty() {
            return Err(ConvolutionError::invalid("single-hit spectrum has no bins"));
        }
        if d_gy.len() != dd_gy.len() || d_gy.len() != f1.len() {
            return Err(ConvolutionError::invalid(format!(
                "array lengths differ: d_gy={}, dd_gy={}, f1={}",
                d_gy.len(),
                dd_gy.len(),
                f1.len()
            )));
        }
        if d_gy.iter().any(|&d| !d.is_finite() || d <= 0.0) {
            return Err(ConvolutionError::invalid("bin doses must be positive and finite"));
        }
        if d_gy.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConvolutionError::invalid("bin doses must be strictly increasing"));
        }
        if dd_gy.iter().any(|&dd| !dd.is_finite() || dd <= 0.0) {
            return Err(ConvolutionError::invalid("bin widths must be positive and finite"));
        }
        if f1.iter().any(|&f| !f.is_finite() || f < 0.0) {
            return Err(ConvolutionError::invalid("f1 must be non-negative and finite"));
        }
        Ok(Self { d_gy, dd_gy, f1 })
    }

    /// Sample a density on the first `n_bins` points of a log2 grid.
    pub fn on_grid(space: &Log2Space, n_bins: usize, density: impl Fn(f64) -> f64) -> Result<Self> {
        let d_gy = space.doses(n_bins);
        let dd_gy = space.widths(n_bins);
        let f1 = d_gy.iter().map(|&d| density(d).max(0.0)).collect();
        Self::new(d_gy, dd_gy, f1)
    }

    /// A single bin carrying all the mass at `d_gy`.
    pub fn delta(d_gy: f64, n2: u32) -> Result<Self> {
        if n2 == 0 {
            return Err(ConvolutionError::invalid("n2 must be at least 1"));
        }
        if !d_gy.is_finite() || d_gy <= 0.0 {
            return Err(ConvolutionError::invalid("delta dose must be positive and finite"));
        }
        let dd = Log2Space::new(d_gy, n2).width_at(0);
        Self::new(vec![d_gy], vec![dd], vec![1.0 / dd])
    }

    /// Parse a whitespace/comma separated table with columns `d_gy dd_gy f1`.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_table_str(text: &str) -> Result<Self> {
        let mut d_gy = Vec::new();
        let mut dd_gy = Vec::new();
        let mut f1 = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<f64> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|e| ConvolutionError::invalid(format!("line {}: {e}", lineno + 1)))?;
            if cols.len() != 3 {
                return Err(ConvolutionError::invalid(format!(
                    "line {}: expected 3 columns, found {}",
                    lineno + 1,
                    cols.len()
                )));
            }
            d_gy.push(cols[0]);
            dd_gy.push(cols[1]);
            f1.push(cols[2]);
        }
        Self::new(d_gy, dd_gy, f1)
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.d_gy.len()
    }

    /// Integral of f1 over dose (the normalized fluence).
    pub fn total_mass(&self) -> f64 {
        density_to_mass(&self.f1, &self.dd_gy)
    }

    /// Per-bin masses `f1 * dd`.
    pub fn masses(&self) -> Vec<f64> {
        self.f1.iter().zip(&self.dd_gy).map(|(f, dd)| f * dd).collect()
    }

    /// Mean single-hit dose.
    pub fn mean_dose_gy(&self) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 {
            return 0.0;
        }
        first_moment(&self.masses(), &self.d_gy) / total
    }

    /// Dose-weighted mean single-hit dose.
    pub fn dose_weighted_mean_gy(&self) -> f64 {
        let masses = self.masses();
        let m1 = first_moment(&masses, &self.d_gy);
        if m1 <= 0.0 {
            return 0.0;
        }
        second_moment(&masses, &self.d_gy) / m1
    }

    #[inline]
    pub fn max_dose_gy(&self) -> f64 {
        self.d_gy[self.d_gy.len() - 1]
    }
}
