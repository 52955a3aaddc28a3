// Entry point: convolves a single-hit spectrum table up to the requested hit count.
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hitfold::cli::Args;
use hitfold::config::AppConfig;
use hitfold::core::diagnostics::{DiagnosticSink, TextSink};
use hitfold::{SingleHitSpectrum, get_f_array_size, get_f_start, successive_convolutions};

fn init_logging(level: &str) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut cfg = AppConfig::load_or_default(&args.config);
    if let Some(n2) = args.n2 {
        cfg.convolution.n2 = n2;
    }
    init_logging(&cfg.logging.level);

    let text = fs::read_to_string(&args.spectrum_path)?;
    let f1 = SingleHitSpectrum::from_table_str(&text)?;
    info!(
        bins = f1.n_bins(),
        mean_dose_gy = f1.mean_dose_gy(),
        "loaded single-hit spectrum from {}",
        args.spectrum_path
    );

    let conv = &cfg.convolution;
    let size = get_f_array_size(args.u, conv.fluence_factor, conv.n2, &f1)?;
    info!(
        n_bins_f = size.n_bins_f,
        u_start = size.u_start,
        n_convolutions = size.n_convolutions,
        "sized working arrays"
    );
    let start = get_f_start(size.u_start, &f1, conv.n2, size.n_bins_f)?;

    let mut options = conv.options();
    let mut sink: Option<Box<dyn DiagnosticSink>> = match &args.diagnostics {
        Some(path) => {
            options.write_output = true;
            Some(Box::new(TextSink::new(BufWriter::new(File::create(path)?))))
        }
        None if options.write_output => Some(Box::new(TextSink::new(std::io::stderr()))),
        None => None,
    };
    let sink_ref = sink.as_mut().map(|s| &mut **s as &mut dyn DiagnosticSink);

    let out = successive_convolutions(size.u_effective, &start, &options, sink_ref)?;

    println!(
        "u={} n2={} bins={} folds={} f0={:.6e} mean_dose_gy={:.6e} dose_weighted_mean_gy={:.6e}",
        out.u,
        out.n2,
        out.n_bins_f_used,
        out.n_convolutions,
        out.f0,
        out.mean_dose_gy(),
        out.dose_weighted_mean_gy()
    );
    Ok(())
}
