mod adapter;
pub use adapter::ModelAdapter;

use crate::data::IntensityUnit;
use crate::error::ModelEvaluationError;
use crate::parameters::ModelParameters;

use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Intensity of a single line in every supported unit
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineIntensities {
    /// Radiation temperature, K
    pub temperature: f64,
    /// Velocity-integrated intensity, K km/s
    pub flux_velocity: f64,
    /// Energy flux, erg/cm²/s
    pub flux_energy: f64,
}

impl LineIntensities {
    pub fn get(&self, unit: IntensityUnit) -> f64 {
        match unit {
            IntensityUnit::Temperature => self.temperature,
            IntensityUnit::FluxVelocity => self.flux_velocity,
            IntensityUnit::FluxEnergy => self.flux_energy,
        }
    }

    /// The same value in every unit
    pub fn uniform(value: f64) -> Self {
        Self {
            temperature: value,
            flux_velocity: value,
            flux_energy: value,
        }
    }
}

/// Row of the forward model output table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelLine {
    pub line_id: String,
    /// GHz
    pub frequency: f64,
    pub intensities: LineIntensities,
}

/// Forward model output, one row per line of the molecular line list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelOutput {
    pub lines: Vec<ModelLine>,
}

impl ModelOutput {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Intensity column in the given unit
    pub fn column(&self, unit: IntensityUnit) -> Vec<f64> {
        self.lines.iter().map(|line| line.intensities.get(unit)).collect()
    }
}

impl FromIterator<ModelLine> for ModelOutput {
    fn from_iter<I: IntoIterator<Item = ModelLine>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

/// Radiative-transfer model predicting line intensities of a gas cloud
///
/// Implementations must return one [ModelLine] per line of the molecular line list in the
/// line-list order. The model is called concurrently from worker threads.
pub trait ForwardModel: Sync {
    fn evaluate(&self, parameters: &ModelParameters) -> Result<ModelOutput, ModelEvaluationError>;

    /// Evaluate a batch of parameter sets, one result per input in the input order
    fn evaluate_grid(
        &self,
        grid: &[ModelParameters],
    ) -> Vec<Result<ModelOutput, ModelEvaluationError>> {
        grid.par_iter().map(|p| self.evaluate(p)).collect()
    }
}

impl<M: ForwardModel + ?Sized> ForwardModel for &M {
    fn evaluate(&self, parameters: &ModelParameters) -> Result<ModelOutput, ModelEvaluationError> {
        (**self).evaluate(parameters)
    }

    fn evaluate_grid(
        &self,
        grid: &[ModelParameters],
    ) -> Vec<Result<ModelOutput, ModelEvaluationError>> {
        (**self).evaluate_grid(grid)
    }
}
