//! Renewal-equation forecasts of daily case counts.
//!
//! Given past case counts, a generation-time PMF and one or more future R(t)
//! trajectories, [`reconstruct`] draws synthetic case counts consistent with
//! them by simulating a discrete stochastic renewal equation.

pub mod error;
pub mod generation_time;
pub mod output;
pub mod parameters;
pub mod renewal;
pub mod rng;
pub mod run;
pub mod trajectory;

pub use error::{ForecastError, Result};
pub use generation_time::{ConstGammaTg, GenerationTime, GenerationTimeSpec, VariableGammaTg};
pub use output::Forecast;
pub use renewal::{
    ReconstructOptions, expected_incidence, reconstruct, reconstruct_into, reconstruct_with_stream,
};
pub use rng::RandomStream;
pub use trajectory::RtForecast;
