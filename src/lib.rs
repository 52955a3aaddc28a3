//! Multi-hit dose spectra by successive convolution of a single-hit
//! spectrum on a log2 dose grid.

pub mod cli;
pub mod config;
pub mod core;

pub use crate::core::ConvolutionError;
pub use crate::core::convolution_state::{ConvolutionOptions, ConvolutionState};
pub use crate::core::single_hit::SingleHitSpectrum;
pub use crate::core::sizing::{FArraySize, StartSpectrum, get_f_array_size, get_f_start};
pub use crate::core::successive::{MultiHitSpectrum, successive_convolutions};
