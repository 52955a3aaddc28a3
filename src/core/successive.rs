//! Successive-convolution driver.
//!
//! Starting from a low-fluence Poisson seed (at most one hit), each FOLD
//! doubles the represented mean hit count until the requested `u` is
//! reached:
//!
//! seed → NORMAL → n × (ZERO → FOLD → merge → NORMAL → SHRINK) → extract
//!
//! INTERP steps in only when the arrays would overflow and `adjust_n2`
//! is allowed.

use tracing::{debug, info, warn};

use crate::core::convolution_state::{ConvolutionOptions, ConvolutionState};
use crate::core::density::{first_moment, mass_to_density, second_moment};
use crate::core::diagnostics::DiagnosticSink;
use crate::core::sizing::{StartSpectrum, doubling_plan};
use crate::core::{ConvolutionError, Result};

/// Final multi-hit distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiHitSpectrum {
    /// Bins per doubling actually used (may be lower than requested).
    pub n2: u32,
    pub n_bins_f_used: usize,
    /// Mean hit count represented.
    pub u: f64,
    /// Number of FOLD steps performed.
    pub n_convolutions: u32,
    /// Probability of exactly zero dose.
    pub f0: f64,
    pub d_gy: Vec<f64>,
    /// Bin widths (dfdd).
    pub dd_gy: Vec<f64>,
    /// Probability mass per bin.
    pub fdd: Vec<f64>,
}

impl MultiHitSpectrum {
    /// Probability density per Gy.
    pub fn density(&self) -> Vec<f64> {
        mass_to_density(&self.fdd, &self.dd_gy)
    }

    pub fn total_mass(&self) -> f64 {
        self.f0 + self.fdd.iter().sum::<f64>()
    }

    /// Mean dose over all outcomes, zero dose included.
    pub fn mean_dose_gy(&self) -> f64 {
        first_moment(&self.fdd, &self.d_gy)
    }

    /// Dose-weighted mean dose.
    pub fn dose_weighted_mean_gy(&self) -> f64 {
        let m1 = first_moment(&self.fdd, &self.d_gy);
        if m1 <= 0.0 {
            return 0.0;
        }
        second_moment(&self.fdd, &self.d_gy) / m1
    }
}

/// Last occupied bin of `start` once moved to `n2` bins per doubling.
fn start_lef_at(start: &StartSpectrum, n2: u32) -> usize {
    if n2 == start.space.n2() {
        return start.lef;
    }
    start
        .space
        .with_bins_per_doubling(n2)
        .ceil_bin(start.space.dose_at(start.lef))
        .unwrap_or(start.lef)
}

/// Highest resolution (halving from the seed's N2) that fits `n_folds`
/// doublings into the arrays.
fn plan_resolution(start: &StartSpectrum, n_folds: u32, adjust_n2: bool) -> Result<u32> {
    let capacity = start.array_size();
    let mut n2 = start.space.n2();
    loop {
        let required = start_lef_at(start, n2) + n_folds as usize * n2 as usize + 1;
        if required <= capacity {
            return Ok(n2);
        }
        if !adjust_n2 || n2 == 1 {
            return Err(ConvolutionError::CapacityExceeded { required, capacity });
        }
        n2 /= 2;
    }
}

/// Make room for one more FOLD, coarsening if allowed.
fn ensure_fold_capacity(state: &mut ConvolutionState) -> Result<()> {
    loop {
        let n2 = state.n2();
        let required = state.lef + n2 as usize + 1;
        if required <= state.array_size {
            return Ok(());
        }
        if !state.options.adjust_n2 || n2 == 1 {
            return Err(ConvolutionError::CapacityExceeded {
                required,
                capacity: state.array_size,
            });
        }
        warn!("fold {} needs {required} bins: n2 {n2} -> {}", state.n_folds + 1, n2 / 2);
        state.interp(n2 / 2)?;
    }
}

fn emit(state: &ConvolutionState, label: &str, sink: &mut Option<&mut dyn DiagnosticSink>) {
    if !state.options.write_output {
        return;
    }
    if let Some(sink) = sink.as_deref_mut() {
        state.output(label, sink);
    }
}

/// Convolve `start` up to `u` expected hits.
///
/// If `u` is not `start.u_start` times a power of two, the seed is first
/// rescaled to `u / 2^n` hits, `n` being the smallest doubling count that
/// keeps the seed at or below `start.u_start`. A `u` below
/// `start.u_start` therefore needs no FOLD at all.
pub fn successive_convolutions(
    u: f64,
    start: &StartSpectrum,
    options: &ConvolutionOptions,
    mut sink: Option<&mut dyn DiagnosticSink>,
) -> Result<MultiHitSpectrum> {
    if !u.is_finite() || u <= 0.0 {
        return Err(ConvolutionError::invalid(format!("u must be positive, got {u}")));
    }
    if !options.shrink_tails_under.is_finite() || options.shrink_tails_under < 0.0 {
        return Err(ConvolutionError::invalid(format!(
            "shrink_tails_under must be non-negative, got {}",
            options.shrink_tails_under
        )));
    }
    if !(start.continuous_mass() > 0.0) {
        return Err(ConvolutionError::invalid("start spectrum carries no hits"));
    }

    let (n_folds, u_seed) = doubling_plan(u, start.u_start);
    let seed = if (u_seed - start.u_start).abs() > 1e-12 * start.u_start {
        debug!(target: "sc", u_seed, u_start = start.u_start, "rescaling seed");
        start.with_hit_count(u_seed)?
    } else {
        start.clone()
    };
    let n2 = plan_resolution(&seed, n_folds, options.adjust_n2)?;

    let mut state = ConvolutionState::new(seed, *options);
    state.set_target(u);
    if n2 != state.n2() {
        warn!("{} bins cannot hold {n_folds} folds at n2={}; using n2={n2}", state.array_size, state.n2());
        state.interp(n2)?;
    }
    info!(
        target: "sc",
        u,
        u_seed,
        n_folds,
        n2,
        array_size = state.array_size,
        "successive convolutions"
    );

    state.normalize()?;
    emit(&state, "start", &mut sink);

    while state.n_folds < n_folds {
        state.zero();
        ensure_fold_capacity(&mut state)?;
        state.fold()?;
        state.merge();
        state.normalize()?;
        state.shrink()?;
        debug!(
            target: "sc",
            fold = state.n_folds,
            u = state.u,
            f0 = state.f0,
            mif = state.mif,
            lef = state.lef,
            "folded"
        );
        emit(&state, "fold", &mut sink);
    }

    Ok(extract(&state))
}

/// OUTPUT extraction: arrays cover bins `0..=lef`.
fn extract(state: &ConvolutionState) -> MultiHitSpectrum {
    let n = state.lef + 1;
    MultiHitSpectrum {
        n2: state.n2(),
        n_bins_f_used: n,
        u: state.u,
        n_convolutions: state.n_folds,
        f0: state.f0,
        d_gy: state.space.doses(n),
        dd_gy: state.space.widths(n),
        fdd: state.f[..n].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::MemorySink;
    use crate::core::single_hit::SingleHitSpectrum;
    use crate::core::sizing::{get_f_array_size, get_f_start};
    use approx::assert_relative_eq;

    fn delta_start(u: f64) -> (StartSpectrum, u32) {
        let f1 = SingleHitSpectrum::delta(1.0, 10).unwrap();
        let size = get_f_array_size(u, 1.0, 10, &f1).unwrap();
        let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();
        (start, size.n_convolutions)
    }

    #[test]
    fn reaches_requested_hit_count() {
        let (start, n) = delta_start(4.0);
        let out = successive_convolutions(4.0, &start, &ConvolutionOptions::default(), None).unwrap();
        assert_eq!(out.n_convolutions, n);
        assert_relative_eq!(out.u, 4.0, max_relative = 1e-12);
        assert_relative_eq!(out.total_mass(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.mean_dose_gy(), 4.0, max_relative = 1e-9);
        assert_relative_eq!(out.f0, (-4.0f64).exp(), max_relative = 1e-2);
        assert_eq!(out.n2, 10);
        assert_eq!(out.d_gy.len(), out.n_bins_f_used);
    }

    #[test]
    fn sub_threshold_u_skips_fold() {
        let (start, n) = delta_start(0.001);
        assert_eq!(n, 0);
        let out = successive_convolutions(0.001, &start, &ConvolutionOptions::default(), None).unwrap();
        assert_eq!(out.n_convolutions, 0);
        assert!(out.f0 < 1.0 && out.f0 > 0.99);
        assert_relative_eq!(out.f0, 0.999, max_relative = 1e-12);
    }

    #[test]
    fn fractional_seed_for_smaller_u() {
        let (start, _) = delta_start(1.0);
        let out = successive_convolutions(0.0005, &start, &ConvolutionOptions::default(), None).unwrap();
        assert_eq!(out.n_convolutions, 0);
        assert_relative_eq!(out.f0, 0.9995, max_relative = 1e-12);
        assert_relative_eq!(out.mean_dose_gy(), 0.0005, max_relative = 1e-9);
    }

    #[test]
    fn capacity_exceeded_without_adjust() {
        let f1 = SingleHitSpectrum::delta(1.0, 10).unwrap();
        let size = get_f_array_size(8.0, 1.0, 10, &f1).unwrap();
        let start = get_f_start(size.u_start, &f1, 10, 30).unwrap();
        let options = ConvolutionOptions {
            adjust_n2: false,
            ..ConvolutionOptions::default()
        };
        let err = successive_convolutions(8.0, &start, &options, None).unwrap_err();
        assert!(matches!(err, ConvolutionError::CapacityExceeded { capacity: 30, .. }));
        assert!(err.shortfall() > 0);
    }

    #[test]
    fn adjust_n2_coarsens_to_fit() {
        let f1 = SingleHitSpectrum::delta(1.0, 10).unwrap();
        let size = get_f_array_size(8.0, 1.0, 10, &f1).unwrap();
        let start = get_f_start(size.u_start, &f1, 10, 30).unwrap();
        let out = successive_convolutions(8.0, &start, &ConvolutionOptions::default(), None).unwrap();
        assert!(out.n2 < 10);
        assert!(out.n_bins_f_used <= 30);
        assert_relative_eq!(out.mean_dose_gy(), 8.0, max_relative = 1e-9);
    }

    #[test]
    fn writes_diagnostics_when_enabled() {
        let (start, n) = delta_start(0.01);
        let options = ConvolutionOptions {
            write_output: true,
            ..ConvolutionOptions::default()
        };
        let mut sink = MemorySink::default();
        successive_convolutions(0.01, &start, &options, Some(&mut sink)).unwrap();
        assert_eq!(sink.dumps.len(), n as usize + 1);
        assert_eq!(sink.dumps[0].label, "start");
        assert_eq!(sink.dumps.last().unwrap().step, n);

        let mut quiet = MemorySink::default();
        successive_convolutions(0.01, &start, &ConvolutionOptions::default(), Some(&mut quiet)).unwrap();
        assert!(quiet.dumps.is_empty());
    }

    #[test]
    fn rejects_non_positive_u() {
        let (start, _) = delta_start(1.0);
        for u in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                successive_convolutions(u, &start, &ConvolutionOptions::default(), None),
                Err(ConvolutionError::InvalidInput(_))
            ));
        }
    }
}
