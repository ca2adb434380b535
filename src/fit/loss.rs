use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Robust loss applied to the squared residuals
///
/// With `z = (r / scale)^2` the cost of a residual vector is `0.5 scale^2 sum rho(z)`:
/// - `Linear`: `rho(z) = z`, ordinary least squares
/// - `SoftL1`: `rho(z) = 2 (sqrt(1 + z) - 1)`
/// - `Huber`: `rho(z) = z` for `z <= 1`, `2 sqrt(z) - 1` otherwise
/// - `Cauchy`: `rho(z) = ln(1 + z)`, strongest down-weighting of outlying lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum LossFunction {
    Linear,
    SoftL1,
    Huber,
    #[default]
    Cauchy,
}

impl LossFunction {
    pub fn rho(&self, z: f64) -> f64 {
        match self {
            Self::Linear => z,
            Self::SoftL1 => 2.0 * ((1.0 + z).sqrt() - 1.0),
            Self::Huber => {
                if z <= 1.0 {
                    z
                } else {
                    2.0 * z.sqrt() - 1.0
                }
            }
            Self::Cauchy => z.ln_1p(),
        }
    }

    /// Derivative `d rho / d z`, the weight of a residual in the reweighted normal equations
    pub fn weight(&self, z: f64) -> f64 {
        match self {
            Self::Linear => 1.0,
            Self::SoftL1 => 1.0 / (1.0 + z).sqrt(),
            Self::Huber => {
                if z <= 1.0 {
                    1.0
                } else {
                    1.0 / z.sqrt()
                }
            }
            Self::Cauchy => 1.0 / (1.0 + z),
        }
    }

    pub fn cost(&self, residuals: &[f64], scale: f64) -> f64 {
        let c2 = scale * scale;
        0.5 * c2
            * residuals
                .iter()
                .map(|r| self.rho(r * r / c2))
                .sum::<f64>()
    }

    pub fn weights(&self, residuals: &[f64], scale: f64) -> Vec<f64> {
        let c2 = scale * scale;
        residuals.iter().map(|r| self.weight(r * r / c2)).collect()
    }
}
