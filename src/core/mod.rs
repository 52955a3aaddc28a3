//! Successive-convolution core: log2 dose grid, sizing, convolution state,
//! operators and driver.

pub mod convolution_state;
pub mod density;
pub mod diagnostics;
pub mod fold;
pub mod log2space;
pub mod rebin;
pub mod single_hit;
pub mod sizing;
pub mod successive;

use thiserror::Error;

/// Errors returned by the convolution core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvolutionError {
    /// Rejected before any computation (bad scalars, mismatched arrays, zero fluence).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The histogram needs more bins than the arrays hold.
    #[error("histogram needs {required} bins but only {capacity} are allocated")]
    CapacityExceeded { required: usize, capacity: usize },
    /// Mass vanished where it must not.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(&'static str),
}

impl ConvolutionError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Missing bins for `CapacityExceeded`, zero otherwise.
    pub fn shortfall(&self) -> usize {
        match self {
            Self::CapacityExceeded { required, capacity } => required.saturating_sub(*capacity),
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvolutionError>;
