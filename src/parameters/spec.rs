use crate::error::{BoundsError, ConfigurationError, PipelineError};
use crate::parameters::kind::PhysicalParameter;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User choice for a single physical quantity
///
/// If `is_fit` is `false` the `value` is authoritative and `bounds` are ignored, otherwise
/// `bounds` are authoritative and `value` is not used. Both are given in linear (not log10)
/// space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterSpec {
    pub kind: PhysicalParameter,
    pub value: Option<f64>,
    pub bounds: (f64, f64),
    pub is_fit: bool,
}

impl ParameterSpec {
    /// Parameter held at `value` during the whole pipeline
    pub fn fixed(kind: PhysicalParameter, value: f64) -> Self {
        let range = kind.operating_range();
        Self {
            kind,
            value: Some(value),
            bounds: (range.min, range.max),
            is_fit: false,
        }
    }

    /// Parameter estimated within `[lower, upper]`
    pub fn fit(kind: PhysicalParameter, lower: f64, upper: f64) -> Self {
        Self {
            kind,
            value: None,
            bounds: (lower, upper),
            is_fit: true,
        }
    }

    /// Check the spec against the forward model operating range
    pub fn validate(&self) -> Result<(), PipelineError> {
        let range = self.kind.operating_range();
        let name = self.kind.model_key();
        if self.is_fit {
            let (lower, upper) = self.bounds;
            range.check(format!("minimum {name}"), lower)?;
            range.check(format!("maximum {name}"), upper)?;
            if lower > upper {
                return Err(BoundsError::MinExceedsMax {
                    parameter: name.to_owned(),
                    min: lower,
                    max: upper,
                }
                .into());
            }
        } else {
            let value = self
                .value
                .ok_or(ConfigurationError::MissingValue { parameter: self.kind })?;
            range.check(name, value)?;
        }
        Ok(())
    }
}

/// Fit parameter with its linear-space bounds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitParameter {
    pub kind: PhysicalParameter,
    pub lower: f64,
    pub upper: f64,
}

impl FitParameter {
    pub fn log_bounds(&self) -> (f64, f64) {
        (self.lower.log10(), self.upper.log10())
    }
}

/// Ordered list of fit parameters shared by all pipeline stages
///
/// Index `i` of every parameter estimate, grid axis, least-squares bound and MCMC walker
/// dimension refers to `self.parameters()[i]`. The order is the canonical
/// [PhysicalParameter] order and never changes after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitConfiguration {
    parameters: Vec<FitParameter>,
}

impl FitConfiguration {
    /// Validate all specs and collect the fit ones in canonical order
    pub fn from_specs(specs: &[ParameterSpec]) -> Result<Self, PipelineError> {
        let mut seen = BTreeSet::new();
        for spec in specs {
            if !seen.insert(spec.kind) {
                return Err(ConfigurationError::DuplicateParameter {
                    parameter: spec.kind,
                }
                .into());
            }
            spec.validate()?;
        }

        let mut parameters: Vec<_> = specs
            .iter()
            .filter(|spec| spec.is_fit)
            .map(|spec| FitParameter {
                kind: spec.kind,
                lower: spec.bounds.0,
                upper: spec.bounds.1,
            })
            .collect();
        if parameters.is_empty() {
            return Err(ConfigurationError::NoFitParameters.into());
        }
        parameters.sort_by_key(|p| p.kind);
        Ok(Self { parameters })
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn parameters(&self) -> &[FitParameter] {
        &self.parameters
    }

    pub fn kinds(&self) -> impl Iterator<Item = PhysicalParameter> + '_ {
        self.parameters.iter().map(|p| p.kind)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kinds().map(|kind| kind.model_key()).collect()
    }

    pub fn index_of(&self, kind: PhysicalParameter) -> Option<usize> {
        self.parameters.iter().position(|p| p.kind == kind)
    }

    /// Lower and upper bounds in log10 space
    pub fn log_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.parameters.iter().map(|p| p.log_bounds()).unzip()
    }
}
