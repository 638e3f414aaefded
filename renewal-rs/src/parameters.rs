use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{ForecastError, Result},
    generation_time::{GenerationTime, GenerationTimeSpec},
    trajectory::{RtForecast, past_counts_from_json, pmf_from_json},
};

/// Inputs of one forecast run, as read from the run document.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameters {
    pub past_counts: Value,
    pub rt_forecast: Value,
    /// Parametric distribution; exclusive with `generation_time_pmf`.
    #[serde(default)]
    pub generation_time: Option<GenerationTimeSpec>,
    /// Literal PMF with a dummy entry at lag 0.
    #[serde(default)]
    pub generation_time_pmf: Option<Value>,
    #[serde(default)]
    pub tg_max: Option<usize>,
    /// Period whose PMF is used when the generation time is variable.
    #[serde(default)]
    pub pmf_index: Option<usize>,
}

pub enum PmfSource {
    Distribution(Box<dyn GenerationTime>),
    Explicit(Vec<f64>),
}

/// Parameters after input normalization.
pub struct ForecastInputs {
    pub past_counts: Vec<u64>,
    pub rt_forecast: RtForecast,
    pub generation_time: PmfSource,
}

impl Parameters {
    pub fn resolve(&self) -> Result<ForecastInputs> {
        let generation_time = match (&self.generation_time, &self.generation_time_pmf) {
            (Some(spec), None) => PmfSource::Distribution(spec.build()?),
            (None, Some(pmf)) => PmfSource::Explicit(pmf_from_json(pmf)?),
            (Some(_), Some(_)) => {
                return Err(ForecastError::Configuration(
                    "give either generation_time or generation_time_pmf, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(ForecastError::Configuration(
                    "missing generation_time or generation_time_pmf".to_string(),
                ));
            }
        };
        Ok(ForecastInputs {
            past_counts: past_counts_from_json(&self.past_counts)?,
            rt_forecast: RtForecast::from_json(&self.rt_forecast)?,
            generation_time,
        })
    }
}

impl ForecastInputs {
    pub fn pmf(&self, pmf_index: Option<usize>) -> Result<&[f64]> {
        match &self.generation_time {
            PmfSource::Distribution(tg) => tg.get_pmf_array(pmf_index),
            PmfSource::Explicit(pmf) => Ok(pmf),
        }
    }
}
