//! One forecast run driven by a run document: resolve inputs, reconstruct,
//! write `forecast.csv` and, for filesystem outputs, `run_manifest.json`.

use mrp::{Environment, EnvironmentError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
    error::ForecastError, output::Forecast, parameters::Parameters, renewal::reconstruct_with_stream,
    rng::RandomStream,
};

pub const FORECAST_FILE: &str = "forecast.csv";
pub const MANIFEST_FILE: &str = "run_manifest.json";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run document has no input section")]
    MissingInput,

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// What a run produced, as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunManifest {
    /// Seed actually used, including a time-derived one.
    pub seed: u64,
    pub replicate: u64,
    pub input_sha256: String,
    pub nsamples: usize,
    pub nperiods: usize,
    pub tg_max: usize,
    pub ensemble: bool,
}

pub fn run_forecast(ctx: &Environment<Parameters>) -> Result<RunManifest, RunError> {
    let parameters = ctx.input.as_ref().ok_or(RunError::MissingInput)?;

    let inputs = parameters.resolve()?;
    let pmf = inputs.pmf(parameters.pmf_index)?;
    let mut rng = match ctx.seed {
        Some(seed) => RandomStream::new(seed),
        None => RandomStream::from_time(),
    };
    let mut forecast = Forecast::zeros_like(&inputs.rt_forecast);
    reconstruct_with_stream(
        &inputs.past_counts,
        &inputs.rt_forecast,
        pmf,
        parameters.tg_max,
        &mut forecast,
        &mut rng,
    )?;

    let (nsamples, nperiods) = forecast.shape();
    info!(nsamples, nperiods, seed = rng.seed(), "forecast complete");

    ctx.write_csv(
        FORECAST_FILE,
        &["sample", "period", "cases"],
        &forecast.csv_rows(),
    )?;

    let manifest = RunManifest {
        seed: rng.seed(),
        replicate: ctx.replicate,
        input_sha256: ctx.input_digest(),
        nsamples,
        nperiods,
        tg_max: parameters.tg_max.unwrap_or(pmf.len()),
        ensemble: forecast.is_ensemble(),
    };
    // Only written to a filesystem output; stdout carries the CSV alone.
    if ctx.output_dir().is_some() {
        ctx.write_json(MANIFEST_FILE, &manifest)?;
    }
    Ok(manifest)
}
