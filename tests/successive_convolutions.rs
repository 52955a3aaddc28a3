use approx::assert_relative_eq;
use hitfold::core::diagnostics::MemorySink;
use hitfold::core::log2space::Log2Space;
use hitfold::{
    ConvolutionError, ConvolutionOptions, ConvolutionState, SingleHitSpectrum, get_f_array_size,
    get_f_start, successive_convolutions,
};

fn gamma_like() -> SingleHitSpectrum {
    let space = Log2Space::new(1e-3, 10);
    SingleHitSpectrum::on_grid(&space, 120, |d| d.powf(-1.5) * (-d / 2.0).exp()).unwrap()
}

#[test]
fn spike_and_single_bin_scenario() {
    // F0 = 0.5, one bin at 1 Gy with weight 0.5, N2 = 10, two hits.
    let space = Log2Space::new(1.0, 10);
    let mut state =
        ConvolutionState::from_histogram(space, 32, 0.5, &[0.5], 1.0, ConvolutionOptions::default())
            .unwrap();
    state.zero();
    state.fold().unwrap();

    assert_eq!(state.h0(), 0.25);
    let two_gy = space.bin_of(2.0).round() as usize;
    assert_relative_eq!(state.h()[two_gy], 0.25, epsilon = 1e-12);
    let near_one: f64 = state.h()[..2].iter().sum();
    assert_relative_eq!(near_one, 0.5, epsilon = 1e-12);

    state.merge();
    state.normalize().unwrap();
    assert_eq!(state.u(), 2.0);
    assert_relative_eq!(state.total_mass(), 1.0, epsilon = 1e-12);
}

#[test]
fn mass_is_conserved_after_every_normal() {
    let f1 = gamma_like();
    let size = get_f_array_size(3.0, 1.0, 10, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();
    let options = ConvolutionOptions {
        write_output: true,
        ..ConvolutionOptions::default()
    };
    let mut sink = MemorySink::default();
    successive_convolutions(3.0, &start, &options, Some(&mut sink)).unwrap();

    assert_eq!(sink.dumps.len(), size.n_convolutions as usize + 1);
    for dump in &sink.dumps {
        let total = dump.f0 + dump.mass.iter().sum::<f64>();
        assert!((total - 1.0).abs() < 1e-5, "step {}: mass {total}", dump.step);
    }
    // Hit count doubles with every dump.
    for w in sink.dumps.windows(2) {
        assert_relative_eq!(w[1].u, 2.0 * w[0].u, max_relative = 1e-12);
    }
}

#[test]
fn poisson_compound_of_a_delta() {
    let f1 = SingleHitSpectrum::delta(2.0, 16).unwrap();
    let size = get_f_array_size(6.0, 1.0, 16, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 16, size.n_bins_f).unwrap();
    let out = successive_convolutions(6.0, &start, &ConvolutionOptions::default(), None).unwrap();

    assert_relative_eq!(out.f0, (-6.0f64).exp(), max_relative = 1e-2);
    assert_relative_eq!(out.mean_dose_gy(), 12.0, max_relative = 1e-9);
    // No dose below a single hit except the spike.
    assert!(out.d_gy[0] >= 2.0 - 1e-12);
}

#[test]
fn mean_dose_scales_with_hit_count() {
    let f1 = gamma_like();
    let m1 = f1.mean_dose_gy();
    for &u in &[0.01, 0.3, 1.0, 5.0] {
        let size = get_f_array_size(u, 1.0, 10, &f1).unwrap();
        let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();
        let out = successive_convolutions(u, &start, &ConvolutionOptions::default(), None).unwrap();
        assert_relative_eq!(out.mean_dose_gy(), u * m1, max_relative = 1e-6);
        assert!(out.f0 < 1.0);
    }
}

#[test]
fn shrink_bounds_occupied_range() {
    let f1 = gamma_like();
    let size = get_f_array_size(4.0, 1.0, 10, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();

    let keep = ConvolutionOptions {
        shrink_tails: false,
        ..ConvolutionOptions::default()
    };
    let cut = ConvolutionOptions {
        shrink_tails: true,
        shrink_tails_under: 1e-10,
        ..ConvolutionOptions::default()
    };
    let full = successive_convolutions(4.0, &start, &keep, None).unwrap();
    let shrunk = successive_convolutions(4.0, &start, &cut, None).unwrap();

    assert!(shrunk.n_bins_f_used <= full.n_bins_f_used);
    assert_relative_eq!(shrunk.total_mass(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(shrunk.mean_dose_gy(), full.mean_dose_gy(), max_relative = 1e-6);
}

#[test]
fn sub_single_hit_request_needs_no_fold() {
    let f1 = gamma_like();
    let size = get_f_array_size(0.001, 1.0, 10, &f1).unwrap();
    assert_eq!(size.n_convolutions, 0);
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();

    let options = ConvolutionOptions {
        write_output: true,
        ..ConvolutionOptions::default()
    };
    let mut sink = MemorySink::default();
    let out = successive_convolutions(0.001, &start, &options, Some(&mut sink)).unwrap();

    assert_eq!(out.n_convolutions, 0);
    assert_eq!(sink.dumps.len(), 1);
    assert!(out.f0 < 1.0);
    assert_relative_eq!(out.f0, 0.999, max_relative = 1e-12);
}

#[test]
fn capacity_failure_without_adjust() {
    let f1 = gamma_like();
    let size = get_f_array_size(10.0, 1.0, 10, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f - 5).unwrap();
    let options = ConvolutionOptions {
        adjust_n2: false,
        ..ConvolutionOptions::default()
    };

    match successive_convolutions(10.0, &start, &options, None) {
        Err(err @ ConvolutionError::CapacityExceeded { .. }) => assert_eq!(err.shortfall(), 5),
        other => panic!("expected CapacityExceeded, got {other:?}"),
    }
}

#[test]
fn adjust_n2_rescues_small_arrays() {
    let f1 = gamma_like();
    let size = get_f_array_size(10.0, 1.0, 10, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f - 5).unwrap();
    let out = successive_convolutions(10.0, &start, &ConvolutionOptions::default(), None).unwrap();

    assert_eq!(out.n2, 5);
    assert_relative_eq!(out.mean_dose_gy(), 10.0 * f1.mean_dose_gy(), max_relative = 1e-6);
}
