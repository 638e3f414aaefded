//! Stochastic renewal-equation reconstruction of future case counts.
//!
//! For every forecast period `t`, in increasing order,
//!
//! ```text
//! lambda(t) = R(t) * [ sum_{s=1}^{min(t, tg_max-1)} Tg(s) * C(t-s)
//!                    + sum_{s=t+1}^{tg_max-1}    Tg(s) * past[-(s-t)] ]
//! C(t) ~ Poisson(lambda(t))
//! ```
//!
//! The calculation is recursive (`C(t)` depends on `C(t - s)`), so periods of
//! one trajectory are never reordered. Ensemble rows are processed in row
//! order and all of them consume the same [`RandomStream`].

use tracing::debug;

use crate::{
    error::{ForecastError, Result},
    output::Forecast,
    rng::RandomStream,
    trajectory::RtForecast,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructOptions {
    /// Truncation (one past the last lag) of the convolution. Defaults to the PMF length.
    pub tg_max: Option<usize>,
    /// Seed of the random stream. Defaults to a time-derived seed.
    pub seed: Option<u64>,
}

impl ReconstructOptions {
    pub fn with_seed(seed: u64) -> Self {
        ReconstructOptions {
            tg_max: None,
            seed: Some(seed),
        }
    }

    pub fn tg_max(mut self, tg_max: usize) -> Self {
        self.tg_max = Some(tg_max);
        self
    }
}

/// Reconstructs case counts into a freshly allocated forecast shaped like `rt`.
pub fn reconstruct(
    past: &[u64],
    rt: &RtForecast,
    pmf: &[f64],
    options: &ReconstructOptions,
) -> Result<Forecast> {
    let mut forecast = Forecast::zeros_like(rt);
    reconstruct_into(past, rt, pmf, options, &mut forecast)?;
    Ok(forecast)
}

/// Reconstructs case counts into a reusable buffer of the same shape as `rt`.
///
/// Validation errors leave `forecast` untouched. A [`ForecastError::Sampling`]
/// error raised mid-run (a Poisson mean beyond the sampler's range) leaves the
/// periods drawn so far written into `forecast`; discard the buffer in that case.
pub fn reconstruct_into(
    past: &[u64],
    rt: &RtForecast,
    pmf: &[f64],
    options: &ReconstructOptions,
    forecast: &mut Forecast,
) -> Result<()> {
    let tg_max = options.tg_max.unwrap_or(pmf.len());
    validate(past, rt, pmf, tg_max, forecast)?;

    let mut rng = match options.seed {
        Some(seed) => RandomStream::new(seed),
        None => RandomStream::from_time(),
    };
    run(past, rt, pmf, tg_max, forecast, &mut rng)
}

/// Reconstructs with a caller-owned stream, which keeps advancing across calls.
///
/// Errors leave `forecast` as [`reconstruct_into`] does.
pub fn reconstruct_with_stream(
    past: &[u64],
    rt: &RtForecast,
    pmf: &[f64],
    tg_max: Option<usize>,
    forecast: &mut Forecast,
    rng: &mut RandomStream,
) -> Result<()> {
    let tg_max = tg_max.unwrap_or(pmf.len());
    validate(past, rt, pmf, tg_max, forecast)?;
    run(past, rt, pmf, tg_max, forecast, rng)
}

/// Poisson mean of period `t`, given the counts already generated for periods `0..t`.
pub fn expected_incidence(
    past: &[u64],
    fut: &[u64],
    pmf: &[f64],
    tg_max: usize,
    t: usize,
    r_t: f64,
) -> Result<f64> {
    check_pmf_len(pmf, tg_max)?;
    check_past_depth(past, tg_max.saturating_sub(t + 1))?;
    if fut.len() < t {
        return Err(ForecastError::IndexOutOfRange {
            what: "forecast period",
            index: t - 1,
            len: fut.len(),
        });
    }
    Ok(step_mean(past, fut, pmf, tg_max, t, r_t))
}

fn step_mean(past: &[u64], fut: &[u64], pmf: &[f64], tg_max: usize, t: usize, r_t: f64) -> f64 {
    let mut lamb = 0.0;

    // Future series chunk
    for s in 1..usize::min(t + 1, tg_max) {
        lamb += pmf[s] * fut[t - s] as f64;
    }

    // Past series chunk
    for s in (t + 1)..tg_max {
        lamb += pmf[s] * past[past.len() - (s - t)] as f64;
    }

    r_t * lamb
}

/// Runs the recursion over one trajectory, writing `out[t]` before period `t + 1` reads it.
fn reconstruct_row(
    past: &[u64],
    rt: &[f64],
    pmf: &[f64],
    tg_max: usize,
    out: &mut [u64],
    rng: &mut RandomStream,
) -> Result<()> {
    for (t, &r_t) in rt.iter().enumerate() {
        let lamb = step_mean(past, out, pmf, tg_max, t, r_t);
        out[t] = rng.poisson(lamb)?;
    }
    Ok(())
}

fn run(
    past: &[u64],
    rt: &RtForecast,
    pmf: &[f64],
    tg_max: usize,
    forecast: &mut Forecast,
    rng: &mut RandomStream,
) -> Result<()> {
    let (nsamples, nperiods) = rt.shape();
    debug!(
        nsamples,
        nperiods,
        tg_max,
        seed = rng.seed(),
        ensemble = rt.is_ensemble(),
        "reconstructing case counts"
    );

    match (rt, forecast) {
        (RtForecast::Single(r), Forecast::Single(c)) => {
            reconstruct_row(past, r, pmf, tg_max, c, rng)?;
        }
        (RtForecast::Ensemble(r), Forecast::Ensemble(c)) => {
            let mut rt_row = vec![0.0; nperiods];
            let mut ct_row = vec![0; nperiods];
            for i in 0..nsamples {
                for (dst, src) in rt_row.iter_mut().zip(r.row(i).iter()) {
                    *dst = *src;
                }
                reconstruct_row(past, &rt_row, pmf, tg_max, &mut ct_row, rng)?;
                for (dst, src) in c.row_mut(i).iter_mut().zip(&ct_row) {
                    *dst = *src;
                }
            }
        }
        (_, forecast) => {
            return Err(ForecastError::OutputShape {
                expected: rt.shape(),
                found: forecast.shape(),
            });
        }
    }
    Ok(())
}

fn check_pmf_len(pmf: &[f64], tg_max: usize) -> Result<()> {
    if tg_max > pmf.len() {
        return Err(ForecastError::IndexOutOfRange {
            what: "generation time lag",
            index: tg_max - 1,
            len: pmf.len(),
        });
    }
    Ok(())
}

/// Requires `past[-depth]` to exist.
fn check_past_depth(past: &[u64], depth: usize) -> Result<()> {
    if past.len() < depth {
        return Err(ForecastError::IndexOutOfRange {
            what: "past_counts lag",
            index: depth,
            len: past.len(),
        });
    }
    Ok(())
}

fn validate(
    past: &[u64],
    rt: &RtForecast,
    pmf: &[f64],
    tg_max: usize,
    forecast: &Forecast,
) -> Result<()> {
    check_pmf_len(pmf, tg_max)?;
    // Period 0 reaches deepest into the past, at lag tg_max - 1.
    if rt.nperiods() > 0 {
        check_past_depth(past, tg_max.saturating_sub(1))?;
    }
    for (lag, &p) in pmf.iter().enumerate().take(tg_max).skip(1) {
        if !(p.is_finite() && p >= 0.0) {
            return Err(ForecastError::InvalidValue {
                what: "generation time PMF",
                index: lag,
                value: p,
            });
        }
    }
    rt.validate()?;
    if forecast.shape() != rt.shape() || forecast.is_ensemble() != rt.is_ensemble() {
        return Err(ForecastError::OutputShape {
            expected: rt.shape(),
            found: forecast.shape(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::generation_time::{ConstGammaTg, GenerationTime};
    use nalgebra::DMatrix;

    const PAST: [u64; 3] = [100, 110, 120];
    const PMF: [f64; 3] = [0.0, 0.5, 0.5];

    #[test]
    fn test_expected_decomposition() {
        // t = 0: only the past chunk contributes.
        let lamb0 = expected_incidence(&PAST, &[], &PMF, 3, 0, 1.0).unwrap();
        assert_eq!(lamb0, 0.5 * 120.0 + 0.5 * 110.0);
        assert_eq!(lamb0, 115.0);

        // t = 1: lag 1 reads the forecast, lag 2 reads the most recent past value.
        let lamb1 = expected_incidence(&PAST, &[100], &PMF, 3, 1, 1.0).unwrap();
        assert_eq!(lamb1, 0.5 * 100.0 + 0.5 * 120.0);

        // t = 2: both lags read the forecast.
        let lamb2 = expected_incidence(&PAST, &[100, 80], &PMF, 3, 2, 2.0).unwrap();
        assert_eq!(lamb2, 2.0 * (0.5 * 80.0 + 0.5 * 100.0));
    }

    #[test]
    fn test_concrete_scenario_statistics() {
        let rt = RtForecast::single(vec![1.0, 1.0]);
        let n = 4000;
        let mut sum0 = 0.0;
        let mut residual1 = 0.0;
        for seed in 0..n {
            let forecast = reconstruct(&PAST, &rt, &PMF, &ReconstructOptions::with_seed(seed).tg_max(3))
                .unwrap();
            let c = forecast.as_single().unwrap();
            sum0 += c[0] as f64;
            let lamb1 = expected_incidence(&PAST, &c[..1], &PMF, 3, 1, 1.0).unwrap();
            assert_eq!(lamb1, 0.5 * c[0] as f64 + 60.0);
            residual1 += c[1] as f64 - lamb1;
        }
        let n = n as f64;
        // 4 standard errors
        assert!(f64::abs(sum0 / n - 115.0) < 4.0 * f64::sqrt(115.0 / n));
        assert!(f64::abs(residual1 / n) < 4.0 * f64::sqrt(117.5 / n));
    }

    #[test]
    fn test_reproducible() {
        let rt = RtForecast::single(vec![1.3, 1.1, 0.9, 0.8, 1.2]);
        let options = ReconstructOptions::with_seed(8675309);
        let a = reconstruct(&PAST, &rt, &PMF, &options).unwrap();
        let b = reconstruct(&PAST, &rt, &PMF, &options).unwrap();
        assert_eq!(a, b);

        let c = reconstruct(&PAST, &rt, &PMF, &ReconstructOptions::with_seed(1)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_ensemble_single_equivalence() {
        let values = vec![1.2, 0.8, 1.0, 1.5, 0.7, 1.1];
        let single = RtForecast::single(values.clone());
        let ensemble = RtForecast::ensemble_from_rows(vec![values]).unwrap();
        let options = ReconstructOptions::with_seed(2024);

        let a = reconstruct(&PAST, &single, &PMF, &options).unwrap();
        let b = reconstruct(&PAST, &ensemble, &PMF, &options).unwrap();
        assert_eq!(b.as_ensemble().unwrap().nrows(), 1);
        assert_eq!(a.as_single().unwrap(), b.row(0).unwrap().as_slice());
    }

    #[test]
    fn test_ensemble_shares_stream() {
        let values = vec![1.0; 8];
        let single = RtForecast::single(values.clone());
        let ensemble = RtForecast::ensemble_from_rows(vec![values.clone(), values]).unwrap();
        let options = ReconstructOptions::with_seed(77);

        let a = reconstruct(&PAST, &single, &PMF, &options).unwrap();
        let b = reconstruct(&PAST, &ensemble, &PMF, &options).unwrap();
        // First row draws first; the second row continues the same stream.
        assert_eq!(a.row(0), b.row(0));
        assert_ne!(b.row(0), b.row(1));
    }

    #[test]
    fn test_threaded_stream() {
        let rt = RtForecast::single(vec![1.0; 4]);
        let mut rng = RandomStream::new(5);
        let mut first = Forecast::zeros_like(&rt);
        let mut second = Forecast::zeros_like(&rt);
        reconstruct_with_stream(&PAST, &rt, &PMF, None, &mut first, &mut rng).unwrap();
        reconstruct_with_stream(&PAST, &rt, &PMF, None, &mut second, &mut rng).unwrap();

        // Two calls on one stream equal a two-row ensemble on the same seed.
        let ensemble = RtForecast::ensemble_from_rows(vec![vec![1.0; 4]; 2]).unwrap();
        let both = reconstruct(&PAST, &ensemble, &PMF, &ReconstructOptions::with_seed(5)).unwrap();
        assert_eq!(first.row(0), both.row(0));
        assert_eq!(second.row(0), both.row(1));
    }

    #[test]
    fn test_reuse_buffer() {
        let rt = RtForecast::single(vec![1.0; 6]);
        let options = ReconstructOptions::with_seed(11);
        let mut buffer = Forecast::Single(vec![999; 6]);
        reconstruct_into(&PAST, &rt, &PMF, &options, &mut buffer).unwrap();
        assert_eq!(buffer, reconstruct(&PAST, &rt, &PMF, &options).unwrap());
    }

    #[test]
    fn test_buffer_after_errors() {
        let options = ReconstructOptions::with_seed(11);

        // Rejected before any draw: the buffer is untouched.
        let rt = RtForecast::single(vec![1.0, -1.0, 1.0]);
        let mut buffer = Forecast::Single(vec![999; 3]);
        assert!(reconstruct_into(&PAST, &rt, &PMF, &options, &mut buffer).is_err());
        assert_eq!(buffer, Forecast::Single(vec![999; 3]));

        // The second mean is beyond the sampler's range: period 0 is already written.
        let rt = RtForecast::single(vec![1.0, 1e300, 1.0]);
        assert!(matches!(
            reconstruct_into(&PAST, &rt, &PMF, &options, &mut buffer),
            Err(ForecastError::Sampling(_))
        ));
        let partial = buffer.as_single().unwrap();
        assert_ne!(partial[0], 999);
        assert_eq!(&partial[1..], &[999, 999]);
        assert!(matches!(
            reconstruct(&PAST, &rt, &PMF, &options),
            Err(ForecastError::Sampling(_))
        ));
    }

    #[test]
    fn test_zero_reproduction() {
        let rt = RtForecast::from(DMatrix::<f64>::zeros(3, 5));
        let forecast = reconstruct(&PAST, &rt, &PMF, &ReconstructOptions::with_seed(3)).unwrap();
        assert_eq!(forecast.shape(), (3, 5));
        assert!(forecast.csv_rows().iter().all(|row| row[2] == "0"));
    }

    #[test]
    fn test_no_lags() {
        let rt = RtForecast::from(vec![2.0; 3]);
        let forecast =
            reconstruct(&[], &rt, &PMF, &ReconstructOptions::with_seed(3).tg_max(1)).unwrap();
        assert_eq!(forecast, Forecast::Single(vec![0; 3]));
    }

    #[test]
    fn test_empty_trajectory() {
        let rt = RtForecast::single(vec![]);
        let forecast = reconstruct(&[], &rt, &PMF, &ReconstructOptions::with_seed(3)).unwrap();
        assert_eq!(forecast, Forecast::Single(vec![]));
    }

    #[test]
    fn test_bounds_checks() {
        let rt = RtForecast::single(vec![1.0; 4]);
        let options = ReconstructOptions::with_seed(1);

        let err = reconstruct(&PAST, &rt, &PMF, &options.tg_max(4)).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::IndexOutOfRange { what: "generation time lag", index: 3, len: 3 }
        ));

        // tg_max = 3 needs two past values.
        let err = reconstruct(&[120], &rt, &PMF, &options).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::IndexOutOfRange { what: "past_counts lag", index: 2, len: 1 }
        ));
        assert!(reconstruct(&[110, 120], &rt, &PMF, &options).is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let options = ReconstructOptions::with_seed(1);
        let rt = RtForecast::single(vec![1.0, -1.0]);
        assert!(matches!(
            reconstruct(&PAST, &rt, &PMF, &options),
            Err(ForecastError::InvalidValue { what: "R(t)", index: 1, .. })
        ));
        let rt = RtForecast::single(vec![1.0, 1.0]);
        assert!(matches!(
            reconstruct(&PAST, &rt, &[0.0, 0.5, f64::NAN], &options),
            Err(ForecastError::InvalidValue { what: "generation time PMF", index: 2, .. })
        ));
    }

    #[test]
    fn test_output_shape_mismatch() {
        let rt = RtForecast::single(vec![1.0; 4]);
        let options = ReconstructOptions::with_seed(1);
        let mut short = Forecast::Single(vec![0; 3]);
        assert!(matches!(
            reconstruct_into(&PAST, &rt, &PMF, &options, &mut short),
            Err(ForecastError::OutputShape { .. })
        ));
        let mut wrong_kind = Forecast::zeros_like(&RtForecast::ensemble_from_rows(vec![vec![1.0; 4]]).unwrap());
        assert!(matches!(
            reconstruct_into(&PAST, &rt, &PMF, &options, &mut wrong_kind),
            Err(ForecastError::OutputShape { .. })
        ));
    }

    #[test]
    fn test_statistical_convergence() {
        // Mean of C(t) - lambda(t) vanishes at every period of a longer horizon.
        let tg = ConstGammaTg::new(4.0, 1.0, Some(12)).unwrap();
        let pmf = tg.get_pmf_array(None).unwrap();
        let past: Vec<u64> = (0..20).map(|i| 200 + 5 * i).collect();
        let r = vec![1.4, 1.2, 1.0, 0.9, 0.8, 0.8, 0.9, 1.1];
        let rt = RtForecast::single(r.clone());

        let n = 2000;
        let mut residuals = vec![0.0; r.len()];
        let mut means = vec![0.0; r.len()];
        for seed in 0..n {
            let forecast = reconstruct(&past, &rt, pmf, &ReconstructOptions::with_seed(seed)).unwrap();
            let c = forecast.as_single().unwrap();
            for t in 0..r.len() {
                let lamb = expected_incidence(&past, &c[..t], pmf, pmf.len(), t, r[t]).unwrap();
                residuals[t] += c[t] as f64 - lamb;
                means[t] += lamb;
            }
        }
        for t in 0..r.len() {
            let mean_lamb = means[t] / n as f64;
            let tolerance = 4.0 * f64::sqrt(mean_lamb / n as f64);
            assert!(f64::abs(residuals[t] / n as f64) < tolerance, "period {t}");
        }
    }

    #[test]
    fn test_flat_history_steady_state() {
        // With R = 1 and a constant past, the first period's mean equals the past level.
        let tg = ConstGammaTg::new(2.0, 0.5, None).unwrap();
        let pmf = tg.get_pmf_array(None).unwrap();
        let past = vec![1000; pmf.len()];
        let lamb = expected_incidence(&past, &[], pmf, pmf.len(), 0, 1.0).unwrap();
        assert!(f64::abs(lamb - 1000.0) < 1e-6);
    }
}
