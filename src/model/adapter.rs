use crate::data::{IntensityUnit, LineMatchMask};
use crate::error::ModelEvaluationError;
use crate::model::{ForwardModel, ModelOutput};
use crate::parameters::{FitConfiguration, FixedParameters, ModelParameters};

/// Forward model seen as a function of log10 fit parameter values
///
/// The adapter holds only shared references and builds a fresh [ModelParameters] for every
/// call, so it can be used from many threads at once.
pub struct ModelAdapter<'a, M: ?Sized> {
    model: &'a M,
    fit: &'a FitConfiguration,
    fixed: &'a FixedParameters,
    mask: &'a LineMatchMask,
    unit: IntensityUnit,
}

impl<M: ?Sized> Clone for ModelAdapter<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ?Sized> Copy for ModelAdapter<'_, M> {}

impl<'a, M> ModelAdapter<'a, M>
where
    M: ForwardModel + ?Sized,
{
    pub fn new(
        model: &'a M,
        fit: &'a FitConfiguration,
        fixed: &'a FixedParameters,
        mask: &'a LineMatchMask,
        unit: IntensityUnit,
    ) -> Self {
        Self {
            model,
            fit,
            fixed,
            mask,
            unit,
        }
    }

    pub fn fit(&self) -> &'a FitConfiguration {
        self.fit
    }

    pub fn dimension(&self) -> usize {
        self.fit.len()
    }

    /// Number of matched lines returned by [ModelAdapter::evaluate]
    pub fn output_len(&self) -> usize {
        self.mask.matched_len()
    }

    /// Full forward model input for log10 fit values ordered as `self.fit()`
    pub fn parameters(&self, log_values: &[f64]) -> ModelParameters {
        let linear: Vec<_> = log_values.iter().map(|&x| 10f64.powf(x)).collect();
        self.fixed.merge(self.fit, &linear)
    }

    /// Model intensities of the matched lines, in the observed unit and observed-line order
    pub fn evaluate(&self, log_values: &[f64]) -> Result<Vec<f64>, ModelEvaluationError> {
        let output = self.model.evaluate(&self.parameters(log_values))?;
        self.select(&output)
    }

    /// [ModelAdapter::evaluate] for a batch of points through the bulk model interface
    pub fn evaluate_batch(
        &self,
        points: &[Vec<f64>],
    ) -> Vec<Result<Vec<f64>, ModelEvaluationError>> {
        let grid: Vec<_> = points.iter().map(|x| self.parameters(x)).collect();
        self.model
            .evaluate_grid(&grid)
            .into_iter()
            .map(|output| output.and_then(|output| self.select(&output)))
            .collect()
    }

    /// Complete model output table, unmasked
    pub fn evaluate_full(&self, log_values: &[f64]) -> Result<ModelOutput, ModelEvaluationError> {
        let output = self.model.evaluate(&self.parameters(log_values))?;
        self.check_len(&output)?;
        Ok(output)
    }

    fn check_len(&self, output: &ModelOutput) -> Result<(), ModelEvaluationError> {
        if output.len() != self.mask.catalogue_len() {
            return Err(ModelEvaluationError::OutputLength {
                expected: self.mask.catalogue_len(),
                actual: output.len(),
            });
        }
        Ok(())
    }

    fn select(&self, output: &ModelOutput) -> Result<Vec<f64>, ModelEvaluationError> {
        self.check_len(output)?;
        let values = self
            .mask
            .indices()
            .iter()
            .map(|&i| output.lines[i].intensities.get(self.unit))
            .collect::<Vec<_>>();
        match values.iter().position(|y| !y.is_finite()) {
            Some(index) => Err(ModelEvaluationError::NonFinite { index }),
            None => Ok(values),
        }
    }
}
