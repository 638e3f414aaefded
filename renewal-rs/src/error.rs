use thiserror::Error;

/// Errors raised while building generation-time distributions or
/// reconstructing forecasts. Every check runs before the first random draw.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("R(t) input must be 1D or 2D (ndim = {ndim})")]
    InputShape { ndim: usize },

    #[error("invalid type for {input}: {found}")]
    InputType { input: &'static str, found: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{what} index {index} is out of range for length {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{what} at index {index} must be finite and non-negative (got {value})")]
    InvalidValue {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("output buffer has shape {found:?}, expected {expected:?}")]
    OutputShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("poisson sampling failed: {0}")]
    Sampling(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
