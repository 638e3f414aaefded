//! R(t) inputs: a single trajectory or an ensemble of trajectories.
//!
//! Ensembles are stored as `DMatrix<f64>` with signature `array[i_sample, i_period]`.

use nalgebra::DMatrix;
use serde_json::Value;

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RtForecast {
    Single(Vec<f64>),
    Ensemble(DMatrix<f64>),
}

impl RtForecast {
    pub fn single(values: Vec<f64>) -> Self {
        RtForecast::Single(values)
    }

    /// Builds an ensemble from sample rows. All rows must have the same length.
    pub fn ensemble_from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let nsamples = rows.len();
        let nperiods = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|r| r.len() != nperiods) {
            return Err(ForecastError::IndexOutOfRange {
                what: "ensemble row period",
                index: usize::max(row.len(), nperiods) - 1,
                len: usize::min(row.len(), nperiods),
            });
        }
        let data: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(RtForecast::Ensemble(DMatrix::from_row_slice(
            nsamples, nperiods, &data,
        )))
    }

    /// Builds from a flat row-major buffer and its shape, like an n-dimensional array.
    pub fn from_array(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        if !(1..=2).contains(&shape.len()) {
            return Err(ForecastError::InputShape { ndim: shape.len() });
        }
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or(ForecastError::IndexOutOfRange {
                what: "R(t) array element",
                index: usize::MAX,
                len: data.len(),
            })?;
        if data.len() != expected {
            return Err(ForecastError::IndexOutOfRange {
                what: "R(t) array element",
                index: expected,
                len: data.len(),
            });
        }
        match *shape {
            [_] => Ok(RtForecast::Single(data)),
            [nsamples, nperiods] => Ok(RtForecast::Ensemble(DMatrix::from_row_slice(
                nsamples, nperiods, &data,
            ))),
            _ => Err(ForecastError::InputShape { ndim: shape.len() }),
        }
    }

    /// Interprets a JSON number array (1D) or array of number arrays (2D).
    pub fn from_json(value: &Value) -> Result<Self> {
        let ndim = json_ndim(value, "rt_forecast")?;
        match ndim {
            1 => Ok(RtForecast::Single(json_f64_row(value, "rt_forecast")?)),
            2 => {
                let rows = value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|row| json_f64_row(row, "rt_forecast"))
                    .collect::<Result<Vec<_>>>()?;
                RtForecast::ensemble_from_rows(rows)
            }
            ndim => Err(ForecastError::InputShape { ndim }),
        }
    }

    pub fn nsamples(&self) -> usize {
        match self {
            RtForecast::Single(_) => 1,
            RtForecast::Ensemble(m) => m.nrows(),
        }
    }

    pub fn nperiods(&self) -> usize {
        match self {
            RtForecast::Single(v) => v.len(),
            RtForecast::Ensemble(m) => m.ncols(),
        }
    }

    /// `(nsamples, nperiods)`; a single trajectory counts as one sample.
    pub fn shape(&self) -> (usize, usize) {
        (self.nsamples(), self.nperiods())
    }

    pub fn is_ensemble(&self) -> bool {
        matches!(self, RtForecast::Ensemble(_))
    }

    /// Copy of sample `i` as a contiguous trajectory.
    pub fn row(&self, i: usize) -> Option<Vec<f64>> {
        match self {
            RtForecast::Single(v) if i == 0 => Some(v.clone()),
            RtForecast::Single(_) => None,
            RtForecast::Ensemble(m) if i < m.nrows() => Some(m.row(i).iter().copied().collect()),
            RtForecast::Ensemble(_) => None,
        }
    }

    /// Checks that every R(t) value is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let check = |index: usize, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ForecastError::InvalidValue {
                    what: "R(t)",
                    index,
                    value,
                })
            }
        };
        match self {
            RtForecast::Single(v) => v.iter().enumerate().try_for_each(|(i, &r)| check(i, r)),
            RtForecast::Ensemble(m) => {
                let ncols = m.ncols();
                for i in 0..m.nrows() {
                    for j in 0..ncols {
                        check(i * ncols + j, m[(i, j)])?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<Vec<f64>> for RtForecast {
    fn from(values: Vec<f64>) -> Self {
        RtForecast::Single(values)
    }
}

impl From<DMatrix<f64>> for RtForecast {
    fn from(matrix: DMatrix<f64>) -> Self {
        RtForecast::Ensemble(matrix)
    }
}

/// Reads past case counts from a JSON array of non-negative integers.
pub fn past_counts_from_json(value: &Value) -> Result<Vec<u64>> {
    let items = value.as_array().ok_or_else(|| ForecastError::InputType {
        input: "past_counts",
        found: json_kind(value).to_string(),
    })?;
    items
        .iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| ForecastError::InputType {
                input: "past_counts",
                found: format!("{} element {v}", json_kind(v)),
            })
        })
        .collect()
}

/// Reads a generation-time PMF from a JSON number array.
pub fn pmf_from_json(value: &Value) -> Result<Vec<f64>> {
    match json_ndim(value, "generation_time_pmf")? {
        1 => json_f64_row(value, "generation_time_pmf"),
        ndim => Err(ForecastError::InputShape { ndim }),
    }
}

/// Depth of array nesting, measured along the first element.
fn json_ndim(value: &Value, input: &'static str) -> Result<usize> {
    let mut ndim = 0;
    let mut current = value;
    while let Value::Array(items) = current {
        ndim += 1;
        match items.first() {
            Some(first) => current = first,
            None => return Ok(ndim),
        }
    }
    match current {
        Value::Number(_) if ndim > 0 => Ok(ndim),
        other => Err(ForecastError::InputType {
            input,
            found: json_kind(other).to_string(),
        }),
    }
}

fn json_f64_row(value: &Value, input: &'static str) -> Result<Vec<f64>> {
    let items = value.as_array().ok_or_else(|| ForecastError::InputType {
        input,
        found: json_kind(value).to_string(),
    })?;
    items
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| ForecastError::InputType {
                input,
                found: format!("{} element", json_kind(v)),
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
