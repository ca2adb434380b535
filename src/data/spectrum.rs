use crate::error::{ConfigurationError, PipelineError};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Unit of the observed line strengths
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum IntensityUnit {
    /// Radiation temperature, K
    #[serde(rename = "T_R (K)")]
    Temperature,
    /// Velocity-integrated intensity, K km/s
    #[serde(rename = "FLUX (K*km/s)")]
    FluxVelocity,
    /// Energy flux, erg/cm²/s
    #[serde(rename = "FLUX (erg/cm2/s)")]
    FluxEnergy,
}

impl IntensityUnit {
    pub fn from_code(code: char) -> Result<Self, ConfigurationError> {
        match code {
            '1' => Ok(Self::Temperature),
            '2' => Ok(Self::FluxVelocity),
            '3' => Ok(Self::FluxEnergy),
            _ => Err(ConfigurationError::InvalidUnitCode(code.to_string())),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Temperature => 1,
            Self::FluxVelocity => 2,
            Self::FluxEnergy => 3,
        }
    }

    /// Column name of the forward model output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "T_R (K)",
            Self::FluxVelocity => "FLUX (K*km/s)",
            Self::FluxEnergy => "FLUX (erg/cm2/s)",
        }
    }
}

/// Observed line intensities, immutable once constructed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "ObservedSpectrumParameters")]
pub struct ObservedSpectrum {
    frequencies: Vec<f64>,
    intensities: Vec<f64>,
    uncertainties: Vec<f64>,
    has_uncertainties: bool,
    unit: IntensityUnit,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename = "ObservedSpectrum")]
struct ObservedSpectrumParameters {
    frequencies: Vec<f64>,
    intensities: Vec<f64>,
    uncertainties: Vec<f64>,
    has_uncertainties: bool,
    unit: IntensityUnit,
}

impl TryFrom<ObservedSpectrumParameters> for ObservedSpectrum {
    type Error = ConfigurationError;

    fn try_from(p: ObservedSpectrumParameters) -> Result<Self, Self::Error> {
        let uncertainties = p.has_uncertainties.then_some(p.uncertainties);
        Self::new(p.frequencies, p.intensities, uncertainties, p.unit)
    }
}

impl ObservedSpectrum {
    /// Spectrum with explicit uncertainties, `None` sets all of them to unity
    pub fn new(
        frequencies: Vec<f64>,
        intensities: Vec<f64>,
        uncertainties: Option<Vec<f64>>,
        unit: IntensityUnit,
    ) -> Result<Self, ConfigurationError> {
        if frequencies.len() != intensities.len() {
            return Err(ConfigurationError::LengthMismatch(
                "frequencies and intensities",
            ));
        }
        if frequencies.is_empty() {
            return Err(ConfigurationError::EmptySpectrum);
        }
        let has_uncertainties = uncertainties.is_some();
        let uncertainties = match uncertainties {
            Some(uncertainties) => {
                if uncertainties.len() != frequencies.len() {
                    return Err(ConfigurationError::LengthMismatch(
                        "frequencies and uncertainties",
                    ));
                }
                uncertainties
            }
            None => vec![1.0; frequencies.len()],
        };
        if let Some((index, &value)) = intensities
            .iter()
            .enumerate()
            .find(|&(_, &x)| !x.is_finite())
        {
            return Err(ConfigurationError::NonFiniteIntensity { index, value });
        }
        if let Some((index, &value)) = uncertainties
            .iter()
            .enumerate()
            .find(|&(_, &s)| !(s.is_finite() && s > 0.0))
        {
            return Err(ConfigurationError::InvalidUncertainty { index, value });
        }
        Ok(Self {
            frequencies,
            intensities,
            uncertainties,
            has_uncertainties,
            unit,
        })
    }

    /// Read whitespace-separated observed data
    ///
    /// The last character of the first line is the unit code, every following non-empty line
    /// holds frequency (GHz), intensity and optionally its uncertainty.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(contents.parse::<Self>()?)
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn uncertainties(&self) -> &[f64] {
        &self.uncertainties
    }

    /// `false` if the uncertainties are the unity placeholder
    pub fn has_uncertainties(&self) -> bool {
        self.has_uncertainties
    }

    /// `true` if residuals need no division by the uncertainties
    pub fn unit_uncertainties(&self) -> bool {
        self.uncertainties.iter().all(|&s| s == 1.0)
    }

    pub fn unit(&self) -> IntensityUnit {
        self.unit
    }

    /// Maximum absolute observed intensity
    pub fn max_abs_intensity(&self) -> f64 {
        self.intensities.iter().fold(0.0, |acc, &y| f64::max(acc, y.abs()))
    }
}

impl FromStr for ObservedSpectrum {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().enumerate();
        let header = lines
            .next()
            .map(|(_, line)| line.trim_end())
            .ok_or(ConfigurationError::EmptySpectrum)?;
        let code = header
            .chars()
            .last()
            .ok_or_else(|| ConfigurationError::InvalidUnitCode(String::new()))?;
        let unit = IntensityUnit::from_code(code)?;

        let mut columns = None;
        let mut frequencies = vec![];
        let mut intensities = vec![];
        let mut uncertainties = vec![];
        for (i, line) in lines {
            let fields: Vec<_> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            let line_number = i + 1;
            let n = fields.len();
            if !(2..=3).contains(&n) || columns.is_some_and(|c| c != n) {
                return Err(ConfigurationError::InvalidColumnCount {
                    line: line_number,
                    columns: n,
                });
            }
            columns = Some(n);
            let values = fields
                .iter()
                .map(|field| {
                    field
                        .parse::<f64>()
                        .map_err(|_| ConfigurationError::ParseFloat {
                            line: line_number,
                            value: field.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            frequencies.push(values[0]);
            intensities.push(values[1]);
            if let Some(&sigma) = values.get(2) {
                uncertainties.push(sigma);
            }
        }

        let uncertainties = (columns == Some(3)).then_some(uncertainties);
        Self::new(frequencies, intensities, uncertainties, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_columns_default_to_unit_uncertainties() {
        let spectrum: ObservedSpectrum = "# 1\n100.0 5.0\n200.0 2.5\n".parse().unwrap();
        assert_eq!(spectrum.unit(), IntensityUnit::Temperature);
        assert_eq!(spectrum.frequencies(), [100.0, 200.0]);
        assert_eq!(spectrum.intensities(), [5.0, 2.5]);
        assert_eq!(spectrum.uncertainties(), [1.0, 1.0]);
        assert!(!spectrum.has_uncertainties());
        assert!(spectrum.unit_uncertainties());
    }

    #[test]
    fn three_columns_give_uncertainties() {
        let spectrum: ObservedSpectrum = "#3\n\n115.27 1e-7 2e-8\n230.54 3e-7 4e-8\n"
            .parse()
            .unwrap();
        assert_eq!(spectrum.unit(), IntensityUnit::FluxEnergy);
        assert_eq!(spectrum.uncertainties(), [2e-8, 4e-8]);
        assert!(spectrum.has_uncertainties());
        assert!(!spectrum.unit_uncertainties());
    }

    #[test]
    fn invalid_unit_code() {
        let err = "# 4\n100.0 5.0\n".parse::<ObservedSpectrum>().unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidUnitCode("4".to_owned()));
    }

    #[test]
    fn mixed_column_counts() {
        let err = "# 2\n100.0 5.0\n200.0 2.5 0.1\n"
            .parse::<ObservedSpectrum>()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidColumnCount {
                line: 3,
                columns: 3
            }
        );
    }

    #[test]
    fn unparsable_value() {
        let err = "# 2\n100.0 five\n".parse::<ObservedSpectrum>().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ParseFloat {
                line: 2,
                value: "five".to_owned()
            }
        );
    }

    #[test]
    fn header_only() {
        let err = "# 2\n".parse::<ObservedSpectrum>().unwrap_err();
        assert_eq!(err, ConfigurationError::EmptySpectrum);
    }

    #[test]
    fn zero_negative_and_nan_uncertainties_are_rejected() {
        for sigma in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let err = ObservedSpectrum::new(
                vec![100.0, 200.0],
                vec![5.0, 2.5],
                Some(vec![1.0, sigma]),
                IntensityUnit::Temperature,
            )
            .unwrap_err();
            match err {
                ConfigurationError::InvalidUncertainty { index, value } => {
                    assert_eq!(index, 1);
                    assert!(value.is_nan() || value == sigma);
                }
                _ => panic!("unexpected error {err:?}"),
            }
        }
    }

    #[test]
    fn non_finite_intensity_is_rejected() {
        let err = ObservedSpectrum::new(
            vec![100.0, 200.0],
            vec![f64::INFINITY, 2.5],
            None,
            IntensityUnit::Temperature,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NonFiniteIntensity {
                index: 0,
                value: f64::INFINITY
            }
        );
    }

    #[test]
    fn nan_in_file_is_rejected() {
        let err = "# 1\n100.0 5.0 0.1\n200.0 nan 0.2\n"
            .parse::<ObservedSpectrum>()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::NonFiniteIntensity { index: 1, .. }
        ));
        let err = "# 1\n100.0 5.0 0.1\n200.0 2.5 0\n"
            .parse::<ObservedSpectrum>()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidUncertainty {
                index: 1,
                value: 0.0
            }
        );
    }

    #[test]
    fn serde_round_trip() {
        let spectrum: ObservedSpectrum = "# 3\n100.0 5.0 0.5\n200.0 2.5 0.25\n".parse().unwrap();
        let json = serde_json::to_string(&spectrum).unwrap();
        let deserialized: ObservedSpectrum = serde_json::from_str(&json).unwrap();
        assert_eq!(spectrum, deserialized);
    }

    #[test]
    fn deserialization_is_validated() {
        let value = |intensities: &[f64], uncertainties: &[f64], has_uncertainties: bool| {
            serde_json::json!({
                "frequencies": [100.0, 200.0],
                "intensities": intensities,
                "uncertainties": uncertainties,
                "has_uncertainties": has_uncertainties,
                "unit": "T_R (K)",
            })
        };
        let mismatched = value(&[5.0], &[1.0, 1.0], false);
        assert!(serde_json::from_value::<ObservedSpectrum>(mismatched).is_err());
        let negative = value(&[5.0, 2.5], &[1.0, -1.0], true);
        assert!(serde_json::from_value::<ObservedSpectrum>(negative).is_err());
        let placeholder = value(&[5.0, 2.5], &[0.0, 0.0], false);
        let spectrum: ObservedSpectrum = serde_json::from_value(placeholder).unwrap();
        assert_eq!(spectrum.uncertainties(), [1.0, 1.0]);
    }
}
