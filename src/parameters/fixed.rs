use crate::error::BoundsError;
use crate::parameters::kind::{Geometry, OperatingRange, PhysicalParameter};
use crate::parameters::spec::{FitConfiguration, ParameterSpec};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Every forward model input that is not being fit
///
/// The value is never mutated during a pipeline run. Each evaluation builds its own
/// [ModelParameters] with [FixedParameters::merge], so a single instance is shared by all
/// workers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FixedParameters {
    /// Molecular data file name understood by the forward model
    pub molecule: String,
    pub background_temperature: f64,
    pub line_width: f64,
    pub geometry: Geometry,
    /// Frequency window of the model output, GHz
    pub frequency_window: (f64, f64),
    values: Vec<(PhysicalParameter, f64)>,
}

impl FixedParameters {
    pub fn new(molecule: impl Into<String>) -> Self {
        Self {
            molecule: molecule.into(),
            background_temperature: Self::default_background_temperature(),
            line_width: Self::default_line_width(),
            geometry: Geometry::default(),
            frequency_window: Self::default_frequency_window(),
            values: vec![],
        }
    }

    #[inline]
    pub fn default_background_temperature() -> f64 {
        2.73
    }

    #[inline]
    pub fn default_line_width() -> f64 {
        1.0
    }

    /// The whole molecular line list
    #[inline]
    pub fn default_frequency_window() -> (f64, f64) {
        (OperatingRange::FREQUENCY.min, OperatingRange::FREQUENCY.max)
    }

    pub fn with_background_temperature(mut self, value: f64) -> Self {
        self.background_temperature = value;
        self
    }

    pub fn with_line_width(mut self, value: f64) -> Self {
        self.line_width = value;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Take the values of all specs which are not fit
    ///
    /// Specs without a value are skipped, they are reported by [ParameterSpec::validate].
    pub fn with_specs(mut self, specs: &[ParameterSpec]) -> Self {
        for spec in specs.iter().filter(|spec| !spec.is_fit) {
            if let Some(value) = spec.value {
                self.set(spec.kind, value);
            }
        }
        self
    }

    fn set(&mut self, kind: PhysicalParameter, value: f64) {
        match self.values.binary_search_by_key(&kind, |&(k, _)| k) {
            Ok(i) => self.values[i].1 = value,
            Err(i) => self.values.insert(i, (kind, value)),
        }
    }

    pub fn get(&self, kind: PhysicalParameter) -> Option<f64> {
        self.values
            .binary_search_by_key(&kind, |&(k, _)| k)
            .ok()
            .map(|i| self.values[i].1)
    }

    /// Fixed physical values in canonical order
    pub fn values(&self) -> &[(PhysicalParameter, f64)] {
        &self.values
    }

    /// Check the non-physical settings against the forward model operating range
    pub fn validate(&self) -> Result<(), BoundsError> {
        OperatingRange::BACKGROUND_TEMPERATURE.check("tbg", self.background_temperature)?;
        OperatingRange::LINE_WIDTH.check("linewidth", self.line_width)?;
        let (fmin, fmax) = self.frequency_window;
        if fmin > fmax {
            return Err(BoundsError::MinExceedsMax {
                parameter: "frequency".to_owned(),
                min: fmin,
                max: fmax,
            });
        }
        let range = OperatingRange::FREQUENCY;
        for (name, value) in [("fmin", fmin), ("fmax", fmax)] {
            // window ends may touch the range ends
            if value < range.min || value > range.max {
                return Err(BoundsError::OutOfRange {
                    parameter: name.to_owned(),
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Merge linear-space values of the fit parameters into a fresh parameter set
    ///
    /// Fit values take precedence over fixed values of the same kind. `values` are ordered as
    /// `fit.parameters()`.
    pub fn merge(&self, fit: &FitConfiguration, values: &[f64]) -> ModelParameters {
        debug_assert_eq!(fit.len(), values.len());
        let mut merged = self.clone();
        for (kind, &value) in fit.kinds().zip(values) {
            merged.set(kind, value);
        }
        ModelParameters {
            molecule: merged.molecule,
            background_temperature: merged.background_temperature,
            line_width: merged.line_width,
            geometry: merged.geometry,
            frequency_window: merged.frequency_window,
            values: merged.values,
        }
    }
}

/// Complete input of a single forward model evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParameters {
    pub molecule: String,
    pub background_temperature: f64,
    pub line_width: f64,
    pub geometry: Geometry,
    pub frequency_window: (f64, f64),
    values: Vec<(PhysicalParameter, f64)>,
}

/// Value of a forward model input keyed by its model name
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl ModelParameters {
    pub fn get(&self, kind: PhysicalParameter) -> Option<f64> {
        self.values
            .iter()
            .find_map(|&(k, v)| (k == kind).then_some(v))
    }

    /// Physical values in canonical order
    pub fn values(&self) -> &[(PhysicalParameter, f64)] {
        &self.values
    }

    /// Inputs keyed by the names the forward model expects
    pub fn key_values(&self) -> Vec<(&'static str, ModelValue<'_>)> {
        let mut kv = vec![
            ("molfile", ModelValue::Text(&self.molecule)),
            ("tbg", ModelValue::Number(self.background_temperature)),
            ("linewidth", ModelValue::Number(self.line_width)),
            (
                "geometry",
                ModelValue::Number(self.geometry.model_code().into()),
            ),
            ("fmin", ModelValue::Number(self.frequency_window.0)),
            ("fmax", ModelValue::Number(self.frequency_window.1)),
        ];
        kv.extend(
            self.values
                .iter()
                .map(|&(kind, value)| (kind.model_key(), ModelValue::Number(value))),
        );
        kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::CollisionPartner;

    fn specs() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::fit(PhysicalParameter::KineticTemperature, 10.0, 300.0),
            ParameterSpec::fixed(PhysicalParameter::ColumnDensity, 1e14),
            ParameterSpec::fit(PhysicalParameter::Density(CollisionPartner::H2), 1e2, 1e6),
            ParameterSpec::fixed(PhysicalParameter::Density(CollisionPartner::Electron), 3.0),
        ]
    }

    #[test]
    fn merge_sets_the_named_parameter() {
        let specs = specs();
        let fit = FitConfiguration::from_specs(&specs).unwrap();
        let fixed = FixedParameters::new("co.dat").with_specs(&specs);

        let merged = fixed.merge(&fit, &[50.0, 1e4]);
        assert_eq!(merged.get(PhysicalParameter::KineticTemperature), Some(50.0));
        assert_eq!(
            merged.get(PhysicalParameter::Density(CollisionPartner::H2)),
            Some(1e4)
        );
        assert_eq!(merged.get(PhysicalParameter::ColumnDensity), Some(1e14));
        assert_eq!(
            merged.get(PhysicalParameter::Density(CollisionPartner::Electron)),
            Some(3.0)
        );

        let changed = fixed.merge(&fit, &[50.0, 2e4]);
        assert_eq!(changed.get(PhysicalParameter::KineticTemperature), Some(50.0));
        assert_eq!(
            changed.get(PhysicalParameter::Density(CollisionPartner::H2)),
            Some(2e4)
        );
    }

    #[test]
    fn merge_leaves_fixed_parameters_untouched() {
        let specs = specs();
        let fit = FitConfiguration::from_specs(&specs).unwrap();
        let fixed = FixedParameters::new("co.dat").with_specs(&specs);
        let before = fixed.clone();
        let _ = fixed.merge(&fit, &[50.0, 1e4]);
        assert_eq!(fixed, before);
        assert_eq!(fixed.get(PhysicalParameter::KineticTemperature), None);
    }

    #[test]
    fn key_values_use_model_names() {
        let specs = specs();
        let fit = FitConfiguration::from_specs(&specs).unwrap();
        let merged = FixedParameters::new("co.dat")
            .with_geometry(Geometry::Slab)
            .with_specs(&specs)
            .merge(&fit, &[50.0, 1e4]);
        let kv = merged.key_values();
        let keys: Vec<_> = kv.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["molfile", "tbg", "linewidth", "geometry", "fmin", "fmax", "tkin", "cdmol", "h2", "e-"]
        );
        assert_eq!(kv[0].1, ModelValue::Text("co.dat"));
        assert_eq!(kv[3].1, ModelValue::Number(3.0));
    }

    #[test]
    fn validate_line_width() {
        let fixed = FixedParameters::new("co.dat").with_line_width(1e4);
        assert!(matches!(
            fixed.validate(),
            Err(BoundsError::OutOfRange { .. })
        ));
        assert!(FixedParameters::new("co.dat").validate().is_ok());
    }
}
