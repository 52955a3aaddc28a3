//! Working state of the successive-convolution loop.
//!
//! One `ConvolutionState` is owned by a single driver call. All arrays are
//! allocated once with `array_size` entries and reused in place; operators
//! are `&mut self` methods (FOLD lives in `fold.rs`, INTERP and SHRINK in
//! `rebin.rs`).

use crate::core::density::{first_moment, occupied_range};
use crate::core::diagnostics::{DiagnosticSink, HistogramDump};
use crate::core::fold::FoldTable;
use crate::core::log2space::Log2Space;
use crate::core::sizing::StartSpectrum;
use crate::core::{ConvolutionError, Result};

/// Policy switches of one driver run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvolutionOptions {
    /// Dump the histogram to the diagnostic sink after every step.
    pub write_output: bool,
    /// Cut negligible tail bins after each fold.
    pub shrink_tails: bool,
    /// Tail mass (relative to the total) that SHRINK may drop.
    pub shrink_tails_under: f64,
    /// Allow halving N2 when the arrays would overflow.
    pub adjust_n2: bool,
}

impl Default for ConvolutionOptions {
    fn default() -> Self {
        Self {
            write_output: false,
            shrink_tails: true,
            shrink_tails_under: 1e-30,
            adjust_n2: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvolutionState {
    pub(crate) array_size: usize,
    pub(crate) space: Log2Space,
    pub(crate) u: f64,
    pub(crate) u_final: f64,
    pub(crate) n_folds: u32,

    pub(crate) f0: f64,
    pub(crate) f: Vec<f64>,
    pub(crate) mif: usize,
    pub(crate) lef: usize,

    pub(crate) h0: f64,
    pub(crate) h: Vec<f64>,
    pub(crate) mih: usize,
    pub(crate) leh: usize,

    /// Re-binning buffer for INTERP.
    pub(crate) e: Vec<f64>,
    pub(crate) table: FoldTable,

    pub(crate) start: StartSpectrum,
    pub(crate) options: ConvolutionOptions,
}

impl ConvolutionState {
    /// Allocate the arrays and load the seed (RESET).
    pub fn new(start: StartSpectrum, options: ConvolutionOptions) -> Self {
        let array_size = start.array_size();
        let mut state = Self {
            array_size,
            space: start.space,
            u: start.u_start,
            u_final: start.u_start,
            n_folds: 0,
            f0: start.f0,
            f: vec![0.0; array_size],
            mif: 0,
            lef: 0,
            h0: 0.0,
            h: vec![0.0; array_size],
            mih: 0,
            leh: 0,
            e: vec![0.0; array_size],
            table: FoldTable::default(),
            start,
            options,
        };
        state.reset();
        state
    }

    /// Build a state directly from per-bin masses on `space`.
    ///
    /// `u` is the hit count the histogram stands for.
    pub fn from_histogram(
        space: Log2Space,
        array_size: usize,
        f0: f64,
        masses: &[f64],
        u: f64,
        options: ConvolutionOptions,
    ) -> Result<Self> {
        if masses.len() > array_size || array_size == 0 {
            return Err(ConvolutionError::CapacityExceeded {
                required: masses.len().max(1),
                capacity: array_size,
            });
        }
        if !f0.is_finite() || f0 < 0.0 || masses.iter().any(|&m| !m.is_finite() || m < 0.0) {
            return Err(ConvolutionError::invalid("masses must be non-negative and finite"));
        }
        if !u.is_finite() || u <= 0.0 {
            return Err(ConvolutionError::invalid(format!("u must be positive, got {u}")));
        }
        let mut f_start = vec![0.0; array_size];
        f_start[..masses.len()].copy_from_slice(masses);
        let (mif, lef) = occupied_range(&f_start, 0, array_size - 1).unwrap_or((0, 0));
        let start = StartSpectrum {
            space,
            d_gy: space.doses(array_size),
            dd_gy: space.widths(array_size),
            f_start,
            f0,
            u_start: u,
            mif,
            lef,
        };
        Ok(Self::new(start, options))
    }

    #[inline]
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    #[inline]
    pub fn space(&self) -> &Log2Space {
        &self.space
    }

    #[inline]
    pub fn n2(&self) -> u32 {
        self.space.n2()
    }

    /// Mean hit count the working histogram represents.
    #[inline]
    pub fn u(&self) -> f64 {
        self.u
    }

    #[inline]
    pub fn u_final(&self) -> f64 {
        self.u_final
    }

    pub fn set_target(&mut self, u_final: f64) {
        self.u_final = u_final;
    }

    #[inline]
    pub fn n_folds(&self) -> u32 {
        self.n_folds
    }

    #[inline]
    pub fn f0(&self) -> f64 {
        self.f0
    }

    #[inline]
    pub fn f(&self) -> &[f64] {
        &self.f
    }

    /// `(mif, lef)`.
    #[inline]
    pub fn occupied(&self) -> (usize, usize) {
        (self.mif, self.lef)
    }

    #[inline]
    pub fn h0(&self) -> f64 {
        self.h0
    }

    #[inline]
    pub fn h(&self) -> &[f64] {
        &self.h
    }

    /// `(mih, leh)`.
    #[inline]
    pub fn h_occupied(&self) -> (usize, usize) {
        (self.mih, self.leh)
    }

    #[inline]
    pub fn options(&self) -> &ConvolutionOptions {
        &self.options
    }

    /// Spike plus continuous mass.
    pub fn total_mass(&self) -> f64 {
        self.f0 + self.f[self.mif..=self.lef].iter().sum::<f64>()
    }

    /// Mean dose of the working histogram (the spike contributes zero).
    pub fn mean_dose_gy(&self) -> f64 {
        let d: Vec<f64> = (self.mif..=self.lef).map(|i| self.space.dose_at(i)).collect();
        first_moment(&self.f[self.mif..=self.lef], &d)
    }

    /// ZERO: clear the fold result, the re-binning buffer and the fold table.
    pub fn zero(&mut self) {
        self.h.fill(0.0);
        self.h0 = 0.0;
        self.mih = 0;
        self.leh = 0;
        self.e.fill(0.0);
        self.table.clear();
    }

    /// RESET: reload the seed histogram and forget all progress.
    pub fn reset(&mut self) {
        self.space = self.start.space;
        self.f.copy_from_slice(&self.start.f_start);
        self.f0 = self.start.f0;
        self.mif = self.start.mif;
        self.lef = self.start.lef;
        self.u = self.start.u_start;
        self.n_folds = 0;
        self.zero();
    }

    /// NORMAL: scale spike and histogram to unit total mass.
    pub fn normalize(&mut self) -> Result<()> {
        let total = self.total_mass();
        if !(total > 0.0) || !total.is_finite() {
            return Err(ConvolutionError::NumericalDegeneracy(
                "cannot normalize an all-zero histogram",
            ));
        }
        let scale = 1.0 / total;
        self.f0 *= scale;
        for v in &mut self.f[self.mif..=self.lef] {
            *v *= scale;
        }
        Ok(())
    }

    /// Copy the fold result `H` into `F` and double the hit count.
    pub fn merge(&mut self) {
        self.f[self.mif..=self.lef].fill(0.0);
        self.f[self.mih..=self.leh].copy_from_slice(&self.h[self.mih..=self.leh]);
        self.f0 = self.h0;
        self.mif = self.mih;
        self.lef = self.leh;
        self.u *= 2.0;
        self.n_folds += 1;
    }

    /// OUTPUT: hand the occupied part of `F` to a diagnostic sink.
    pub fn output(&self, label: &str, sink: &mut dyn DiagnosticSink) {
        let d: Vec<f64> = (self.mif..=self.lef).map(|i| self.space.dose_at(i)).collect();
        sink.record(&HistogramDump {
            label,
            step: self.n_folds,
            u: self.u,
            n2: self.n2(),
            f0: self.f0,
            d_gy: &d,
            mass: &self.f[self.mif..=self.lef],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::MemorySink;
    use approx::assert_relative_eq;

    fn state(f0: f64, masses: &[f64]) -> ConvolutionState {
        let space = Log2Space::new(1.0, 10);
        ConvolutionState::from_histogram(space, 64, f0, masses, 1.0, ConvolutionOptions::default())
            .unwrap()
    }

    #[test]
    fn normal_restores_unit_mass() {
        let mut s = state(0.3, &[0.0, 0.2, 0.9, 0.1]);
        s.normalize().unwrap();
        assert_relative_eq!(s.total_mass(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.f0(), 0.2, epsilon = 1e-12);
        assert_eq!(s.occupied(), (1, 3));
    }

    #[test]
    fn normal_rejects_all_zero() {
        let mut s = state(0.0, &[0.0, 0.0]);
        assert_eq!(
            s.normalize(),
            Err(ConvolutionError::NumericalDegeneracy(
                "cannot normalize an all-zero histogram"
            ))
        );
    }

    #[test]
    fn reset_restores_seed() {
        let mut s = state(0.5, &[0.5]);
        s.zero();
        s.fold().unwrap();
        s.merge();
        assert_eq!(s.n_folds(), 1);
        assert_eq!(s.u(), 2.0);

        s.reset();
        assert_eq!(s.n_folds(), 0);
        assert_eq!(s.u(), 1.0);
        assert_eq!(s.f0(), 0.5);
        assert_eq!(s.occupied(), (0, 0));
        assert_eq!(s.f()[10], 0.0);
    }

    #[test]
    fn zero_clears_fold_result() {
        let mut s = state(0.5, &[0.5]);
        s.zero();
        s.fold().unwrap();
        assert!(s.h0() > 0.0);
        s.zero();
        assert_eq!(s.h0(), 0.0);
        assert!(s.h().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn from_histogram_checks_capacity() {
        let space = Log2Space::new(1.0, 10);
        let err = ConvolutionState::from_histogram(
            space,
            2,
            0.0,
            &[0.1, 0.2, 0.3],
            1.0,
            ConvolutionOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.shortfall(), 1);
    }

    #[test]
    fn output_dumps_occupied_range() {
        let s = state(0.25, &[0.0, 0.5, 0.25]);
        let mut sink = MemorySink::default();
        s.output("start", &mut sink);
        let dump = &sink.dumps[0];
        assert_eq!(dump.mass, vec![0.5, 0.25]);
        assert_relative_eq!(dump.d_gy[0], s.space().dose_at(1));
        assert_eq!(dump.n2, 10);
        assert_eq!(dump.f0, 0.25);
    }
}
