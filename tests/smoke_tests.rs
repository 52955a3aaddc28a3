use hitfold::core::log2space::Log2Space;
use hitfold::{
    ConvolutionOptions, SingleHitSpectrum, get_f_array_size, get_f_start, successive_convolutions,
};

#[test]
fn smoke_table_to_multi_hit_spectrum() {
    let table = "\
# d_gy dd_gy f1
0.10 0.02 4.0
0.12 0.03 6.0
0.15 0.04 5.0
0.19 0.05 2.0
";
    let f1 = SingleHitSpectrum::from_table_str(table).unwrap();
    let size = get_f_array_size(2.5, 1.0, 10, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 10, size.n_bins_f).unwrap();
    let out =
        successive_convolutions(size.u_effective, &start, &ConvolutionOptions::default(), None)
            .unwrap();

    assert_eq!(out.n_convolutions, size.n_convolutions);
    assert!(out.n_bins_f_used <= size.n_bins_f);
    assert!((out.total_mass() - 1.0).abs() < 1e-9);
    let expected = 2.5 * f1.mean_dose_gy();
    assert!((out.mean_dose_gy() - expected).abs() / expected < 1e-6);
    assert!(out.dose_weighted_mean_gy() > out.mean_dose_gy());
}

#[test]
fn smoke_density_output_integrates_to_continuous_mass() {
    let space = Log2Space::new(0.05, 8);
    let f1 = SingleHitSpectrum::on_grid(&space, 30, |d| (-d / 0.3).exp()).unwrap();
    let size = get_f_array_size(0.7, 1.0, 8, &f1).unwrap();
    let start = get_f_start(size.u_start, &f1, 8, size.n_bins_f).unwrap();
    let out = successive_convolutions(0.7, &start, &ConvolutionOptions::default(), None).unwrap();

    let density = out.density();
    let integral: f64 = density.iter().zip(&out.dd_gy).map(|(f, dd)| f * dd).sum();
    assert!((integral + out.f0 - 1.0).abs() < 1e-9);
}
