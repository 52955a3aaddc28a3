//! Log2 dose space (bins per doubling).
//!
//! Provides the geometric dose grid shared by sizing and every convolution
//! operator: `d(i) = d0 * 2^(i / bins_per_doubling)`.
//! Example: d0 = 1 Gy, 10 bins per doubling → bin 10 is 2 Gy, bin 20 is 4 Gy.

/// Coordinates closer than this to an integer are treated as that integer.
const SNAP_EPS: f64 = 1e-9;

/// Uniform log2(dose) grid anchored at `d0_gy`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Log2Space {
    pub d0_gy: f64,
    pub bins_per_doubling: u32,
    pub step_log2: f64,
}

impl Log2Space {
    /// Create a grid whose bin 0 sits at `d0_gy`.
    pub fn new(d0_gy: f64, bins_per_doubling: u32) -> Self {
        assert!(d0_gy > 0.0 && d0_gy.is_finite());
        assert!(bins_per_doubling > 0);

        Self {
            d0_gy,
            bins_per_doubling,
            step_log2: 1.0 / bins_per_doubling as f64,
        }
    }

    /// Same anchor, different resolution.
    #[inline]
    pub fn with_bins_per_doubling(&self, bins_per_doubling: u32) -> Self {
        Self::new(self.d0_gy, bins_per_doubling)
    }

    #[inline]
    pub fn n2(&self) -> u32 {
        self.bins_per_doubling
    }

    /// Convert dose → fractional bin coordinate.
    #[inline]
    pub fn bin_of(&self, dose_gy: f64) -> f64 {
        (dose_gy / self.d0_gy).log2() / self.step_log2
    }

    /// Convert fractional bin coordinate → dose.
    #[inline]
    pub fn dose_at_pos(&self, pos: f64) -> f64 {
        self.d0_gy * (pos * self.step_log2).exp2()
    }

    /// Grid dose of bin `i`.
    #[inline]
    pub fn dose_at(&self, i: usize) -> f64 {
        self.dose_at_pos(i as f64)
    }

    /// Width of bin `i`: `d(i + 1) - d(i)`.
    #[inline]
    pub fn width_at(&self, i: usize) -> f64 {
        self.dose_at(i) * (self.step_log2.exp2() - 1.0)
    }

    /// Dose ratio between neighbouring bins.
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.step_log2.exp2()
    }

    /// Grid doses for bins `0..n`.
    pub fn doses(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.dose_at(i)).collect()
    }

    /// Bin widths for bins `0..n`.
    pub fn widths(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.width_at(i)).collect()
    }

    /// Smallest integer bin at or above `dose_gy`.
    pub fn ceil_bin(&self, dose_gy: f64) -> Option<usize> {
        let pos = snap(self.bin_of(dose_gy));
        if !pos.is_finite() || pos < 0.0 {
            return None;
        }
        Some(pos.ceil() as usize)
    }

    /// Locate `dose_gy` between two grid points.
    ///
    /// Returns the lower bin and the share of a point mass at `dose_gy`
    /// that belongs to the upper bin. The split is linear in dose, so
    /// distributing a mass this way keeps its first moment unchanged.
    pub fn bracket(&self, dose_gy: f64) -> Option<(usize, f64)> {
        if !dose_gy.is_finite() || dose_gy <= 0.0 {
            return None;
        }
        let pos = snap(self.bin_of(dose_gy));
        if pos < 0.0 {
            return None;
        }
        let lo = pos.floor() as usize;
        if pos == pos.floor() {
            return Some((lo, 0.0));
        }
        let frac = (dose_gy - self.dose_at(lo)) / self.width_at(lo);
        Some((lo, frac.clamp(0.0, 1.0)))
    }
}

/// Round coordinates that sit on an integer up to floating-point noise.
#[inline]
pub(crate) fn snap(pos: f64) -> f64 {
    let r = pos.round();
    if (pos - r).abs() < SNAP_EPS { r } else { pos }
}
