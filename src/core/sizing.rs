//! Multi-hit sizing: how many doublings, how many bins, and the seed histogram.

use crate::core::density::occupied_range;
use crate::core::log2space::Log2Space;
use crate::core::single_hit::SingleHitSpectrum;
use crate::core::{ConvolutionError, Result};

/// Largest seed hit count for which "at most one hit" is an accurate
/// description of the Poisson start distribution.
pub const U_START_LIMIT: f64 = 0.002;

/// Result of [`get_f_array_size`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FArraySize {
    /// Bins the working arrays need after the last doubling.
    pub n_bins_f: usize,
    /// Seed hit count, `u_effective / 2^n_convolutions`.
    pub u_start: f64,
    pub n_convolutions: u32,
    /// Requested hit count times the fluence factor.
    pub u_effective: f64,
}

/// Halve `u` until it is at most `limit`; returns the number of halvings
/// and the remainder. Halving is exact in binary floating point.
pub fn doubling_plan(u: f64, limit: f64) -> (u32, f64) {
    let mut n = 0;
    let mut seed = u;
    while seed > limit * (1.0 + 1e-12) {
        seed *= 0.5;
        n += 1;
    }
    (n, seed)
}

fn check_n2(n2: u32) -> Result<()> {
    if n2 == 0 {
        return Err(ConvolutionError::invalid("n2 must be at least 1"));
    }
    Ok(())
}

fn check_fluence(f1: &SingleHitSpectrum) -> Result<f64> {
    let total = f1.total_mass();
    if !(total > 0.0) || !total.is_finite() {
        return Err(ConvolutionError::invalid("single-hit spectrum has zero total fluence"));
    }
    Ok(total)
}

/// Number of doublings and working-array size needed to reach `u` hits.
pub fn get_f_array_size(
    u: f64,
    fluence_factor: f64,
    n2: u32,
    f1: &SingleHitSpectrum,
) -> Result<FArraySize> {
    if !u.is_finite() || u <= 0.0 {
        return Err(ConvolutionError::invalid(format!("u must be positive, got {u}")));
    }
    if !fluence_factor.is_finite() || fluence_factor <= 0.0 {
        return Err(ConvolutionError::invalid(format!(
            "fluence_factor must be positive, got {fluence_factor}"
        )));
    }
    check_n2(n2)?;
    check_fluence(f1)?;

    let u_effective = u * fluence_factor;
    let (n_convolutions, u_start) = doubling_plan(u_effective, U_START_LIMIT);

    let space = Log2Space::new(f1.d_gy[0], n2);
    let top = space
        .ceil_bin(f1.max_dose_gy())
        .ok_or_else(|| ConvolutionError::invalid("maximum single-hit dose is off the grid"))?;
    // Every fold moves the upper edge of the support up by exactly n2 bins.
    let n_bins_f = top + n_convolutions as usize * n2 as usize + 1;

    Ok(FArraySize {
        n_bins_f,
        u_start,
        n_convolutions,
        u_effective,
    })
}

/// Seed histogram for the doubling loop.
///
/// `f_start` holds probability mass per bin; the spike `f0` is the
/// probability of no hit at all.
#[derive(Clone, Debug, PartialEq)]
pub struct StartSpectrum {
    pub space: Log2Space,
    pub d_gy: Vec<f64>,
    pub dd_gy: Vec<f64>,
    pub f_start: Vec<f64>,
    pub f0: f64,
    pub u_start: f64,
    pub mif: usize,
    pub lef: usize,
}

impl StartSpectrum {
    #[inline]
    pub fn array_size(&self) -> usize {
        self.f_start.len()
    }

    pub fn continuous_mass(&self) -> f64 {
        self.f_start[self.mif..=self.lef].iter().sum()
    }

    /// The same single-hit shape seeded with `u_seed` expected hits.
    pub fn with_hit_count(&self, u_seed: f64) -> Result<Self> {
        if !u_seed.is_finite() || u_seed <= 0.0 || u_seed > 1.0 {
            return Err(ConvolutionError::invalid(format!(
                "seed hit count must lie in (0, 1], got {u_seed}"
            )));
        }
        let scale = u_seed / self.u_start;
        let mut out = self.clone();
        for v in &mut out.f_start[self.mif..=self.lef] {
            *v *= scale;
        }
        out.f0 = 1.0 - u_seed;
        out.u_start = u_seed;
        Ok(out)
    }
}

/// Rebin `f1` onto the working grid and seed it with `u_start` hits.
pub fn get_f_start(
    u_start: f64,
    f1: &SingleHitSpectrum,
    n2: u32,
    n_bins_f: usize,
) -> Result<StartSpectrum> {
    if !u_start.is_finite() || u_start <= 0.0 || u_start > 1.0 {
        return Err(ConvolutionError::invalid(format!(
            "u_start must lie in (0, 1], got {u_start}"
        )));
    }
    if n_bins_f == 0 {
        return Err(ConvolutionError::invalid("n_bins_f must be at least 1"));
    }
    check_n2(n2)?;
    let total = check_fluence(f1)?;

    let space = Log2Space::new(f1.d_gy[0], n2);
    let mut f_start = vec![0.0f64; n_bins_f];
    for (&d, m) in f1.d_gy.iter().zip(f1.masses()) {
        if m == 0.0 {
            continue;
        }
        let (lo, frac) = space
            .bracket(d)
            .ok_or_else(|| ConvolutionError::invalid(format!("dose {d} Gy is off the grid")))?;
        let hi = if frac > 0.0 { lo + 1 } else { lo };
        if hi >= n_bins_f {
            return Err(ConvolutionError::CapacityExceeded {
                required: hi + 1,
                capacity: n_bins_f,
            });
        }
        let w = u_start * m / total;
        f_start[lo] += w * (1.0 - frac);
        if frac > 0.0 {
            f_start[hi] += w * frac;
        }
    }

    let (mif, lef) = occupied_range(&f_start, 0, n_bins_f - 1)
        .ok_or(ConvolutionError::NumericalDegeneracy("seed histogram is empty"))?;

    Ok(StartSpectrum {
        space,
        d_gy: space.doses(n_bins_f),
        dd_gy: space.widths(n_bins_f),
        f_start,
        f0: 1.0 - u_start,
        u_start,
        mif,
        lef,
    })
}
