use crate::fit::PosteriorChain;
use crate::parameters::FitConfiguration;

use ndarray::ArrayView1;
use std::fmt;

/// Values sorted in ascending order with NaN removed
#[derive(Clone, Debug)]
struct SortedSamples(Vec<f64>);

impl SortedSamples {
    fn new(samples: ArrayView1<f64>) -> Option<Self> {
        let mut v: Vec<f64> = samples.iter().copied().filter(|x| !x.is_nan()).collect();
        if v.is_empty() {
            return None;
        }
        v.sort_unstable_by(f64::total_cmp);
        Some(Self(v))
    }

    // R-7 from https://en.wikipedia.org/wiki/Quantile, the linear interpolation of numpy.percentile
    fn ppf(&self, q: f64) -> f64 {
        let h = (self.0.len() - 1) as f64 * q;
        let h_floor = h.floor();
        let i = h_floor as usize;
        if i + 1 >= self.0.len() {
            self.0[self.0.len() - 1]
        } else {
            self.0[i] + (h - h_floor) * (self.0[i + 1] - self.0[i])
        }
    }
}

/// Median and one-sigma credible interval of a fit parameter in log10 space
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSummary {
    pub name: &'static str,
    pub median: f64,
    /// Median minus the 16th percentile
    pub lower: f64,
    /// 84th percentile minus the median
    pub upper: f64,
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "log10({}) = {:.5} -{:.5} +{:.5}",
            self.name, self.median, self.lower, self.upper
        )
    }
}

/// Summary of a posterior chain after burn-in
#[derive(Clone, Debug, PartialEq)]
pub struct PosteriorSummary {
    pub parameters: Vec<ParameterSummary>,
    /// Maximum-a-posteriori sample of the whole chain and its log-probability
    pub map: Option<(Vec<f64>, f64)>,
    pub acceptance_fraction: f64,
    pub n_samples: usize,
}

impl PosteriorSummary {
    /// Percentiles of the chain without the first `burn_in` steps
    ///
    /// The whole chain is used if `burn_in` leaves no samples.
    pub fn new(chain: &PosteriorChain, fit: &FitConfiguration, burn_in: usize) -> Self {
        let discard = if burn_in < chain.n_steps() {
            burn_in
        } else {
            tracing::warn!(
                "Burn-in of {burn_in} steps covers the whole chain of {} steps, using all samples",
                chain.n_steps()
            );
            0
        };
        let flat = chain.flat(discard);
        let parameters = fit
            .names()
            .into_iter()
            .zip(flat.columns())
            .map(|(name, column)| match SortedSamples::new(column) {
                Some(sorted) => {
                    let median = sorted.ppf(0.5);
                    ParameterSummary {
                        name,
                        median,
                        lower: median - sorted.ppf(0.16),
                        upper: sorted.ppf(0.84) - median,
                    }
                }
                None => ParameterSummary {
                    name,
                    median: f64::NAN,
                    lower: f64::NAN,
                    upper: f64::NAN,
                },
            })
            .collect();
        Self {
            parameters,
            map: chain.max_log_prob_sample(),
            acceptance_fraction: chain.mean_acceptance_fraction(),
            n_samples: flat.nrows(),
        }
    }

    /// Log10 medians in fit order
    pub fn medians(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.median).collect()
    }
}
