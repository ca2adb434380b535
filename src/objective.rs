use crate::data::ObservedSpectrum;
use crate::error::ModelEvaluationError;
use crate::model::{ForwardModel, ModelAdapter};

use std::f64::consts::PI;

/// Residuals, chi-squared and log-probabilities of log10 fit parameter values
///
/// Bounds are the log10 fit bounds ordered as the adapter's fit configuration.
pub struct Objective<'a, M: ?Sized> {
    adapter: ModelAdapter<'a, M>,
    observed: &'a ObservedSpectrum,
    lower: Vec<f64>,
    upper: Vec<f64>,
    unit_uncertainties: bool,
}

impl<'a, M> Objective<'a, M>
where
    M: ForwardModel + ?Sized,
{
    pub fn new(adapter: ModelAdapter<'a, M>, observed: &'a ObservedSpectrum) -> Self {
        let (lower, upper) = adapter.fit().log_bounds();
        Self {
            adapter,
            observed,
            lower,
            upper,
            unit_uncertainties: observed.unit_uncertainties(),
        }
    }

    pub fn adapter(&self) -> &ModelAdapter<'a, M> {
        &self.adapter
    }

    pub fn observed(&self) -> &'a ObservedSpectrum {
        self.observed
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// `(model - observed) / uncertainty` for already evaluated model values
    ///
    /// Both intensities are divided by `scale` first. The uncertainty division is skipped
    /// when all uncertainties are unity.
    pub fn residuals_of(&self, model: &[f64], scale: f64) -> Vec<f64> {
        let obs = self.observed.intensities();
        if self.unit_uncertainties {
            model
                .iter()
                .zip(obs)
                .map(|(m, y)| m / scale - y / scale)
                .collect()
        } else {
            model
                .iter()
                .zip(obs)
                .zip(self.observed.uncertainties())
                .map(|((m, y), s)| (m / scale - y / scale) / s)
                .collect()
        }
    }

    pub fn residuals(&self, x: &[f64]) -> Result<Vec<f64>, ModelEvaluationError> {
        Ok(self.residuals_of(&self.adapter.evaluate(x)?, 1.0))
    }

    /// Residuals with intensities normalized by `scale`
    pub fn scaled_residuals(
        &self,
        x: &[f64],
        scale: f64,
    ) -> Result<Vec<f64>, ModelEvaluationError> {
        Ok(self.residuals_of(&self.adapter.evaluate(x)?, scale))
    }

    /// Sum of squared residuals over the matched lines
    pub fn chi2_of(&self, model: &[f64]) -> f64 {
        self.residuals_of(model, 1.0).iter().map(|r| r * r).sum()
    }

    /// Per-line squared residuals
    pub fn line_chi2(&self, model: &[f64]) -> Vec<f64> {
        self.residuals_of(model, 1.0).iter().map(|r| r * r).collect()
    }

    /// Flat prior over the box, both ends included
    pub fn log_prior(&self, x: &[f64]) -> f64 {
        let inside = x
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(&x, (&lower, &upper))| lower <= x && x <= upper);
        if inside { 0.0 } else { f64::NEG_INFINITY }
    }

    /// Gaussian log-likelihood of already evaluated model values
    pub fn log_likelihood_of(&self, model: &[f64]) -> f64 {
        let n = model.len() as f64;
        let sum: f64 = self
            .observed
            .intensities()
            .iter()
            .zip(self.observed.uncertainties())
            .zip(model)
            .map(|((y, s), m)| 2.0 * s.ln() + ((y - m) / s).powi(2))
            .sum();
        -0.5 * (n * (2.0 * PI).ln() + sum)
    }

    pub fn log_likelihood(&self, x: &[f64]) -> Result<f64, ModelEvaluationError> {
        Ok(self.log_likelihood_of(&self.adapter.evaluate(x)?))
    }

    /// Log-posterior, `-inf` outside of the prior support
    ///
    /// The model is not evaluated outside of the support. Model failures are returned as
    /// errors, a NaN result is [ModelEvaluationError::NanLogProbability].
    pub fn log_posterior(&self, x: &[f64]) -> Result<f64, ModelEvaluationError> {
        let prior = self.log_prior(x);
        if !prior.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        let lp = prior + self.log_likelihood(x)?;
        if lp.is_nan() {
            return Err(ModelEvaluationError::NanLogProbability);
        }
        Ok(lp)
    }
}
