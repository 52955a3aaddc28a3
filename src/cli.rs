use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Single-hit spectrum table (columns: d_gy dd_gy f1)
    #[arg(value_name = "SPECTRUM_PATH")]
    pub spectrum_path: String,

    /// Mean number of hits to convolve up to
    #[arg(long)]
    pub u: f64,

    /// Path to config TOML
    #[arg(long, default_value = "hitfold.toml")]
    pub config: String,

    /// Bins per doubling of dose (overrides config)
    #[arg(long)]
    pub n2: Option<u32>,

    /// Write per-step histogram dumps to this file
    #[arg(long)]
    pub diagnostics: Option<String>,
}
