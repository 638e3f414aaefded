//! Discrete generation-time distributions.
//!
//! A generation-time PMF is indexed by the lag `s` (in periods) between a
//! primary and a secondary case. Entry `s = 0` is a dummy: same-period
//! transmission is not part of the renewal model, so the array is normalized
//! such that `pmf[1..].sum() == 1`.

use nalgebra::DMatrix;
use serde::Deserialize;
use statrs::distribution::{Continuous, Gamma};

use crate::error::{ForecastError, Result};

/// Number of standard deviations past the mean used as the default truncation.
const TAIL_STDS: f64 = 10.0;

/// Shortest PMF that still carries one non-dummy lag.
const MIN_TMAX: usize = 2;

/// Longest PMF a distribution may build, in periods.
pub const MAX_TMAX: usize = 100_000;

pub trait GenerationTime {
    /// Whether the distribution is the same for every period.
    fn is_const(&self) -> bool;

    /// Length of the PMF arrays served by this distribution.
    fn tmax(&self) -> usize;

    /// PMF for primary cases reported at period `idx`.
    ///
    /// Constant distributions ignore `idx`. Variable distributions require it.
    fn get_pmf_array(&self, idx: Option<usize>) -> Result<&[f64]>;

    /// Per-period `[shape, rate]` rows for periods `start..stop`.
    fn get_param_arrays_by_index(
        &self,
        start: Option<usize>,
        stop: Option<usize>,
    ) -> Result<DMatrix<f64>>;

    /// `size` rows of `[shape, rate]`.
    fn get_param_arrays_by_size(&self, size: usize) -> Result<DMatrix<f64>>;
}

fn check_gamma_params(shape: f64, rate: f64) -> Result<()> {
    if !(shape.is_finite() && shape > 0.0) {
        return Err(ForecastError::Configuration(format!(
            "gamma shape must be finite and positive (got {shape})"
        )));
    }
    if !(rate.is_finite() && rate > 0.0) {
        return Err(ForecastError::Configuration(format!(
            "gamma rate must be finite and positive (got {rate})"
        )));
    }
    Ok(())
}

fn default_tmax(shape: f64, rate: f64) -> Result<usize> {
    let mean = shape / rate;
    let std = shape.sqrt() / rate;
    let tmax = (mean + TAIL_STDS * std).ceil();
    if !(tmax.is_finite() && tmax <= MAX_TMAX as f64) {
        return Err(ForecastError::Configuration(format!(
            "gamma(shape = {shape}, rate = {rate}) needs a truncation of {tmax} periods, \
             above the limit of {MAX_TMAX}"
        )));
    }
    Ok(usize::max(tmax as usize, MIN_TMAX))
}

/// Evaluates the gamma density at lags `0..tmax` and normalizes over lags `1..tmax`.
fn gamma_pmf(shape: f64, rate: f64, tmax: usize) -> Result<Vec<f64>> {
    if !(MIN_TMAX..=MAX_TMAX).contains(&tmax) {
        return Err(ForecastError::Configuration(format!(
            "tmax must be within {MIN_TMAX}..={MAX_TMAX} (got {tmax})"
        )));
    }
    let gamma = Gamma::new(shape, rate)
        .map_err(|e| ForecastError::Configuration(format!("invalid gamma: {e}")))?;

    let mut pmf: Vec<f64> = (0..tmax).map(|lag| gamma.pdf(lag as f64)).collect();
    let mass: f64 = pmf[1..].iter().sum();
    if !(mass.is_finite() && mass > 0.0) {
        return Err(ForecastError::Configuration(format!(
            "gamma(shape = {shape}, rate = {rate}) has no mass over lags 1..{tmax}"
        )));
    }
    for p in pmf.iter_mut() {
        *p /= mass;
    }
    // Density at zero diverges for shape < 1; the dummy entry is never read.
    if !pmf[0].is_finite() {
        pmf[0] = 0.0;
    }
    Ok(pmf)
}

/// Gamma-distributed generation time with constant parameters.
#[derive(Debug, Clone)]
pub struct ConstGammaTg {
    shape: f64,
    rate: f64,
    tmax: usize,
    pmf: Vec<f64>,
}

impl ConstGammaTg {
    /// Builds and caches the normalized PMF.
    ///
    /// When `tmax` is `None` the truncation point is `ceil(mean + 10 * std)`.
    /// Truncations above [`MAX_TMAX`] are rejected.
    pub fn new(shape: f64, rate: f64, tmax: Option<usize>) -> Result<Self> {
        check_gamma_params(shape, rate)?;
        let tmax = match tmax {
            Some(tmax) => tmax,
            None => default_tmax(shape, rate)?,
        };
        let pmf = gamma_pmf(shape, rate, tmax)?;
        Ok(ConstGammaTg {
            shape,
            rate,
            tmax,
            pmf,
        })
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn mean(&self) -> f64 {
        self.shape / self.rate
    }

    pub fn std(&self) -> f64 {
        self.shape.sqrt() / self.rate
    }

    pub fn pmf(&self) -> &[f64] {
        &self.pmf
    }
}

impl GenerationTime for ConstGammaTg {
    fn is_const(&self) -> bool {
        true
    }

    fn tmax(&self) -> usize {
        self.tmax
    }

    fn get_pmf_array(&self, _idx: Option<usize>) -> Result<&[f64]> {
        Ok(&self.pmf)
    }

    fn get_param_arrays_by_index(
        &self,
        _start: Option<usize>,
        _stop: Option<usize>,
    ) -> Result<DMatrix<f64>> {
        Err(ForecastError::Configuration(
            "ConstGammaTg cannot get a parameter array by index because it is constant"
                .to_string(),
        ))
    }

    fn get_param_arrays_by_size(&self, size: usize) -> Result<DMatrix<f64>> {
        let row = [self.shape, self.rate];
        Ok(DMatrix::from_fn(size, 2, |_, j| row[j]))
    }
}

/// Gamma-distributed generation time whose parameters change per period.
///
/// All PMFs share one truncation length so that the reconstruction sees
/// arrays of equal size regardless of the period they were taken from.
#[derive(Debug, Clone)]
pub struct VariableGammaTg {
    params: DMatrix<f64>,
    tmax: usize,
    pmfs: Vec<Vec<f64>>,
}

impl VariableGammaTg {
    pub fn new(shapes: &[f64], rates: &[f64], tmax: Option<usize>) -> Result<Self> {
        if shapes.len() != rates.len() {
            return Err(ForecastError::Configuration(format!(
                "got {} shapes but {} rates",
                shapes.len(),
                rates.len()
            )));
        }
        if shapes.is_empty() {
            return Err(ForecastError::Configuration(
                "variable generation time needs at least one period".to_string(),
            ));
        }
        for (&shape, &rate) in shapes.iter().zip(rates) {
            check_gamma_params(shape, rate)?;
        }

        let tmax = match tmax {
            Some(tmax) => tmax,
            None => shapes
                .iter()
                .zip(rates)
                .map(|(&shape, &rate)| default_tmax(shape, rate))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .max()
                .unwrap_or(MIN_TMAX),
        };
        let pmfs = shapes
            .iter()
            .zip(rates)
            .map(|(&shape, &rate)| gamma_pmf(shape, rate, tmax))
            .collect::<Result<Vec<_>>>()?;
        let params = DMatrix::from_fn(shapes.len(), 2, |i, j| {
            if j == 0 { shapes[i] } else { rates[i] }
        });

        Ok(VariableGammaTg { params, tmax, pmfs })
    }

    pub fn nperiods(&self) -> usize {
        self.pmfs.len()
    }
}

impl GenerationTime for VariableGammaTg {
    fn is_const(&self) -> bool {
        false
    }

    fn tmax(&self) -> usize {
        self.tmax
    }

    fn get_pmf_array(&self, idx: Option<usize>) -> Result<&[f64]> {
        let idx = idx.ok_or_else(|| {
            ForecastError::Configuration(
                "a period index is required for a variable generation time".to_string(),
            )
        })?;
        self.pmfs
            .get(idx)
            .map(Vec::as_slice)
            .ok_or(ForecastError::IndexOutOfRange {
                what: "generation time period",
                index: idx,
                len: self.pmfs.len(),
            })
    }

    fn get_param_arrays_by_index(
        &self,
        start: Option<usize>,
        stop: Option<usize>,
    ) -> Result<DMatrix<f64>> {
        let len = self.nperiods();
        let start = start.unwrap_or(0);
        let stop = stop.unwrap_or(len);
        if stop > len {
            return Err(ForecastError::IndexOutOfRange {
                what: "generation time period",
                index: stop,
                len,
            });
        }
        if start > stop {
            return Err(ForecastError::Configuration(format!(
                "start ({start}) must not exceed stop ({stop})"
            )));
        }
        Ok(self.params.rows(start, stop - start).into_owned())
    }

    fn get_param_arrays_by_size(&self, size: usize) -> Result<DMatrix<f64>> {
        if size != self.nperiods() {
            return Err(ForecastError::Configuration(format!(
                "variable generation time has {} periods, cannot size to {size}",
                self.nperiods()
            )));
        }
        Ok(self.params.clone())
    }
}

/// Serializable description of a generation-time distribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationTimeSpec {
    ConstGamma {
        shape: f64,
        rate: f64,
        tmax: Option<usize>,
    },
    VariableGamma {
        shapes: Vec<f64>,
        rates: Vec<f64>,
        tmax: Option<usize>,
    },
}

impl GenerationTimeSpec {
    pub fn build(&self) -> Result<Box<dyn GenerationTime>> {
        Ok(match self {
            GenerationTimeSpec::ConstGamma { shape, rate, tmax } => {
                Box::new(ConstGammaTg::new(*shape, *rate, *tmax)?)
            }
            GenerationTimeSpec::VariableGamma {
                shapes,
                rates,
                tmax,
            } => Box::new(VariableGammaTg::new(shapes, rates, *tmax)?),
        })
    }
}
