use nalgebra::DMatrix;

use crate::trajectory::RtForecast;

/// Generated case counts, shaped like the R(t) input they came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Forecast {
    Single(Vec<u64>),
    Ensemble(DMatrix<u64>),
}

impl Forecast {
    pub fn zeros_like(rt: &RtForecast) -> Forecast {
        match rt {
            RtForecast::Single(v) => Forecast::Single(vec![0; v.len()]),
            RtForecast::Ensemble(m) => Forecast::Ensemble(DMatrix::zeros(m.nrows(), m.ncols())),
        }
    }

    /// `(nsamples, nperiods)`; a single series counts as one sample.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Forecast::Single(v) => (1, v.len()),
            Forecast::Ensemble(m) => (m.nrows(), m.ncols()),
        }
    }

    pub fn is_ensemble(&self) -> bool {
        matches!(self, Forecast::Ensemble(_))
    }

    pub fn as_single(&self) -> Option<&[u64]> {
        match self {
            Forecast::Single(v) => Some(v),
            Forecast::Ensemble(_) => None,
        }
    }

    pub fn as_ensemble(&self) -> Option<&DMatrix<u64>> {
        match self {
            Forecast::Single(_) => None,
            Forecast::Ensemble(m) => Some(m),
        }
    }

    /// Counts of sample `i` as a contiguous series.
    pub fn row(&self, i: usize) -> Option<Vec<u64>> {
        match self {
            Forecast::Single(v) if i == 0 => Some(v.clone()),
            Forecast::Ensemble(m) if i < m.nrows() => Some(m.row(i).iter().copied().collect()),
            _ => None,
        }
    }

    /// `[sample, period, cases]` records in row-major order.
    pub fn csv_rows(&self) -> Vec<Vec<String>> {
        let (nsamples, nperiods) = self.shape();
        let mut rows = Vec::with_capacity(nsamples * nperiods);
        for sample in 0..nsamples {
            for period in 0..nperiods {
                let cases = match self {
                    Forecast::Single(v) => v[period],
                    Forecast::Ensemble(m) => m[(sample, period)],
                };
                rows.push(vec![
                    sample.to_string(),
                    period.to_string(),
                    cases.to_string(),
                ]);
            }
        }
        rows
    }
}
