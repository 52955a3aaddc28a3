use crate::core::convolution_state::ConvolutionOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvolutionConfig {
    /// Bins per doubling of dose.
    #[serde(default = "ConvolutionConfig::default_n2")]
    pub n2: u32,
    #[serde(default = "ConvolutionConfig::default_fluence_factor")]
    pub fluence_factor: f64,
    #[serde(default)]
    pub write_output: bool,
    #[serde(default = "ConvolutionConfig::default_shrink_tails")]
    pub shrink_tails: bool,
    #[serde(default = "ConvolutionConfig::default_shrink_tails_under")]
    pub shrink_tails_under: f64,
    #[serde(default = "ConvolutionConfig::default_adjust_n2")]
    pub adjust_n2: bool,
}

impl ConvolutionConfig {
    fn default_n2() -> u32 {
        10
    }
    fn default_fluence_factor() -> f64 {
        1.0
    }
    fn default_shrink_tails() -> bool {
        true
    }
    fn default_shrink_tails_under() -> f64 {
        1e-30
    }
    fn default_adjust_n2() -> bool {
        true
    }

    pub fn options(&self) -> ConvolutionOptions {
        ConvolutionOptions {
            write_output: self.write_output,
            shrink_tails: self.shrink_tails,
            shrink_tails_under: self.shrink_tails_under,
            adjust_n2: self.adjust_n2,
        }
    }
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        Self {
            n2: Self::default_n2(),
            fluence_factor: Self::default_fluence_factor(),
            write_output: false,
            shrink_tails: Self::default_shrink_tails(),
            shrink_tails_under: Self::default_shrink_tails_under(),
            adjust_n2: Self::default_adjust_n2(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub convolution: ConvolutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Comment out every key so the written file documents the defaults
    /// without pinning them.
    fn commented(text: &str) -> String {
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                commented.push_str(line);
                commented.push('\n');
            } else {
                commented.push_str("# ");
                commented.push_str(line);
                commented.push('\n');
            }
        }
        commented
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        eprintln!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    eprintln!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        // File does not exist: write defaults and return them.
        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, Self::commented(&text)) {
                    eprintln!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => {
                eprintln!("Failed to serialize default config ({err}); continuing with defaults");
            }
        }
        default_cfg
    }
}
