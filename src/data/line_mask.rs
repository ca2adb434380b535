use crate::data::catalogue::LineCatalogue;
use crate::data::spectrum::ObservedSpectrum;
use crate::error::{ConfigurationError, PipelineError};
use crate::parameters::OperatingRange;

/// Correspondence between the observed lines and the forward model output lines
///
/// `mask()` has one entry per catalogue line and exactly `observed.len()` of them are `true`.
/// Model output is selected in observed-line order, see [LineMatchMask::indices].
#[derive(Clone, Debug, PartialEq)]
pub struct LineMatchMask {
    mask: Vec<bool>,
    indices: Vec<usize>,
    frequency_window: (f64, f64),
}

impl LineMatchMask {
    #[inline]
    pub fn default_tolerance() -> f64 {
        1e-3
    }

    /// Match every observed frequency to the first catalogue line within the fractional
    /// `tolerance`
    ///
    /// Observed frequency `f` matches catalogue frequency `c` if `f (1 - tolerance) <= c <= f /
    /// (1 - tolerance)`.
    pub fn build(
        observed: &ObservedSpectrum,
        catalogue: &LineCatalogue,
        tolerance: f64,
    ) -> Result<Self, PipelineError> {
        if !(0.0..1.0).contains(&tolerance) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "match tolerance must be in [0, 1), got {tolerance}"
            ))
            .into());
        }
        let mut mask = vec![false; catalogue.len()];
        let mut indices = Vec::with_capacity(observed.len());
        for &f in observed.frequencies() {
            let lower = f * (1.0 - tolerance);
            let upper = f / (1.0 - tolerance);
            let index = catalogue
                .frequencies()
                .iter()
                .position(|&c| lower <= c && c <= upper)
                .ok_or(ConfigurationError::UnmatchedFrequency { frequency: f })?;
            if let Some(j) = indices.iter().position(|&i| i == index) {
                return Err(ConfigurationError::DuplicateMatch {
                    first: observed.frequencies()[j],
                    second: f,
                }
                .into());
            }
            mask[index] = true;
            indices.push(index);
        }

        let matched = indices.iter().map(|&i| catalogue.frequencies()[i]);
        let (min, max) = matched.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c), hi.max(c))
        });
        let frequency_window = (min * (1.0 - tolerance), max / (1.0 - tolerance));
        let range = OperatingRange::FREQUENCY;
        range.check("minimum frequency", frequency_window.0)?;
        range.check("maximum frequency", frequency_window.1)?;

        Ok(Self {
            mask,
            indices,
            frequency_window,
        })
    }

    /// One entry per catalogue line
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Catalogue index of every observed line, in observed order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn catalogue_len(&self) -> usize {
        self.mask.len()
    }

    pub fn matched_len(&self) -> usize {
        self.indices.len()
    }

    /// Smallest window, GHz, holding all matched lines
    pub fn frequency_window(&self) -> (f64, f64) {
        self.frequency_window
    }

    /// Values of the matched lines in observed order
    pub fn select(&self, all_lines: &[f64]) -> Vec<f64> {
        self.indices.iter().map(|&i| all_lines[i]).collect()
    }
}
