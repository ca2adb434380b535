use crate::error::{ConfigurationError, PipelineError};

use std::path::Path;
use std::str::FromStr;

const TRANSITION_MARKERS: [&str; 2] = ["!TRANS", "! TRANS"];
const NUMBER_MARKERS: [&str; 2] = ["!NUMBER", "! NUMBER"];
const FREQUENCY_COLUMN: usize = 4;

fn starts_with_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.starts_with(m))
}

/// Frequencies of all radiative transitions of a molecule
///
/// The order is the order of the forward model output lines.
#[derive(Clone, Debug, PartialEq)]
pub struct LineCatalogue {
    frequencies: Vec<f64>,
}

impl LineCatalogue {
    pub fn new(frequencies: Vec<f64>) -> Self {
        Self { frequencies }
    }

    /// Read a molecular data file in LAMDA format
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

    /// Frequencies, GHz
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }
}

impl FromStr for LineCatalogue {
    type Err = ConfigurationError;

    /// Parse the radiative transition table
    ///
    /// The table follows the first `!TRANS` comment and ends at the next `!NUMBER` comment,
    /// its fifth column is the frequency in GHz.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().enumerate();
        lines
            .by_ref()
            .find(|(_, line)| starts_with_any(line, &TRANSITION_MARKERS))
            .ok_or(ConfigurationError::MissingTransitionTable)?;

        let mut frequencies = vec![];
        let mut closed = false;
        for (i, line) in lines {
            if starts_with_any(line, &NUMBER_MARKERS) {
                closed = true;
                break;
            }
            let fields: Vec<_> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            let field = fields
                .get(FREQUENCY_COLUMN)
                .ok_or(ConfigurationError::InvalidColumnCount {
                    line: i + 1,
                    columns: fields.len(),
                })?;
            let frequency = field
                .parse::<f64>()
                .map_err(|_| ConfigurationError::ParseFloat {
                    line: i + 1,
                    value: field.to_string(),
                })?;
            frequencies.push(frequency);
        }
        if !closed || frequencies.is_empty() {
            return Err(ConfigurationError::MissingTransitionTable);
        }
        Ok(Self { frequencies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CO_HEAD: &str = "\
!MOLECULE
CO
!MOLECULAR WEIGHT
28.0
!NUMBER OF ENERGY LEVELS
3
!LEVEL + ENERGIES(cm^-1) + WEIGHT + J
    1     0.000000000  1.0     0
    2     3.845033413  3.0     1
    3    11.534919938  5.0     2
!NUMBER OF RADIATIVE TRANSITIONS
2
!TRANS + UP + LOW + EINSTEINA(s^-1) + FREQ(GHz) + E_u(K)
    1     2     1  7.203e-08          115.2712018     5.53
    2     3     2  6.910e-07          230.5380000    16.60
!NUMBER OF COLL PARTNERS
1
";

    #[test]
    fn reads_frequency_column() {
        let catalogue: LineCatalogue = CO_HEAD.parse().unwrap();
        assert_eq!(catalogue.frequencies(), [115.2712018, 230.538]);
    }

    #[test]
    fn marker_with_space() {
        let text = CO_HEAD
            .replace("!TRANS", "! TRANS")
            .replace("!NUMBER OF COLL", "! NUMBER OF COLL");
        let catalogue: LineCatalogue = text.parse().unwrap();
        assert_eq!(catalogue.len(), 2);
    }

    #[test]
    fn missing_table() {
        let err = "!MOLECULE\nCO\n".parse::<LineCatalogue>().unwrap_err();
        assert_eq!(err, ConfigurationError::MissingTransitionTable);
    }
}
