use crate::error::{ConfigurationError, ModelEvaluationError};
use crate::fit::bounds::{clip_to_bounds, within_bounds};
use crate::fit::loss::LossFunction;
use crate::model::ForwardModel;
use crate::objective::Objective;

use nalgebra::{Cholesky, DMatrix, DVector};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e300;
const MIN_DIAGONAL: f64 = 1e-12;

/// Why an iterative stage stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TerminationReason {
    /// Projected gradient is below `gtol`
    Gtol,
    /// Relative cost reduction is below `ftol`
    Ftol,
    /// Step is below `xtol` relative to the parameter norm
    Xtol,
    MaxIterations,
    /// Damping grew without finding a cost reduction
    Stalled,
    /// Forward model failed at the starting point or for every Jacobian probe
    ModelFailure,
}

/// Convergence diagnostic of the least-squares stage
///
/// Not converging is not an error, the last iterate is used either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConvergenceStatus {
    Converged(TerminationReason),
    NotConverged(TerminationReason),
}

impl ConvergenceStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged(reason) => write!(f, "converged ({reason:?})"),
            Self::NotConverged(reason) => write!(f, "not converged ({reason:?})"),
        }
    }
}

/// Bounded non-linear least squares with a robust loss
///
/// Levenberg–Marquardt trust region: the damping follows the ratio of actual to predicted cost
/// reduction, every step is projected onto the bounds and the Jacobian is a forward finite
/// difference taken inwards at the upper bound. Parameters held at a bound by the gradient are
/// frozen for the step. The robust loss enters through iteratively reweighted normal equations
/// `(J^T W J + lambda D) dx = -J^T W r` with `W = rho'(z)`.
///
/// If `normalize` is set, observed and model intensities are divided by the maximum absolute
/// observed intensity before the residuals are formed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "TrustRegion")]
pub struct TrustRegionFit {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub loss: LossFunction,
    pub loss_scale: f64,
    pub normalize: bool,
}

/// Refined estimate and solver diagnostics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrustRegionResult {
    /// log10 fit parameter values
    pub x: Vec<f64>,
    /// Robust cost of the normalized residuals
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub status: ConvergenceStatus,
}

impl TrustRegionFit {
    /// Create a new [TrustRegionFit]
    ///
    /// # Arguments
    /// - `max_iterations`: maximum number of Jacobian evaluations, must be positive
    /// - `ftol`, `xtol`, `gtol`: relative cost, step and projected gradient tolerances
    /// - `loss`: robust loss function
    /// - `loss_scale`: residual scale where the loss starts to soften, must be positive
    /// - `normalize`: divide intensities by the maximum observed intensity
    pub fn new(
        max_iterations: usize,
        ftol: f64,
        xtol: f64,
        gtol: f64,
        loss: LossFunction,
        loss_scale: f64,
        normalize: bool,
    ) -> Self {
        assert!(max_iterations > 0, "max_iterations must be positive");
        assert!(loss_scale > 0.0, "loss_scale must be positive");
        let s = Self {
            max_iterations,
            ftol,
            xtol,
            gtol,
            loss,
            loss_scale,
            normalize,
        };
        if let Err(err) = s.validate() {
            panic!("{err}");
        }
        s
    }

    #[inline]
    pub fn default_max_iterations() -> usize {
        100
    }

    /// Machine epsilon, the solver runs until it cannot improve any further
    #[inline]
    pub fn default_tolerance() -> f64 {
        f64::EPSILON
    }

    #[inline]
    pub fn default_loss() -> LossFunction {
        LossFunction::Cauchy
    }

    #[inline]
    pub fn default_loss_scale() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_normalize() -> bool {
        true
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "least-squares max_iterations must be positive".to_owned(),
            ));
        }
        for (name, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(ConfigurationError::InvalidSetting(format!(
                    "least-squares {name} must be non-negative, got {tol}"
                )));
            }
        }
        if !(self.loss_scale.is_finite() && self.loss_scale > 0.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "least-squares loss_scale must be positive, got {}",
                self.loss_scale
            )));
        }
        Ok(())
    }

    /// Refine `x0` against the observed spectrum
    pub fn run<M>(&self, objective: &Objective<'_, M>, x0: &[f64]) -> TrustRegionResult
    where
        M: ForwardModel + ?Sized,
    {
        let max_abs = objective.observed().max_abs_intensity();
        let scale = if self.normalize && max_abs > 0.0 {
            max_abs
        } else {
            1.0
        };
        let result = self.minimize(
            |x| objective.scaled_residuals(x, scale),
            x0,
            objective.lower(),
            objective.upper(),
        );
        if !result.status.is_converged() {
            tracing::warn!(
                "Least squares did not converge after {} iterations: {}",
                result.iterations,
                result.status
            );
        }
        result
    }

    /// Minimize the robust cost of `residuals` within `[lower, upper]` starting from `x0`
    ///
    /// A failed residual evaluation rejects the trial point.
    pub fn minimize<F>(
        &self,
        residuals: F,
        x0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> TrustRegionResult
    where
        F: Fn(&[f64]) -> Result<Vec<f64>, ModelEvaluationError>,
    {
        let n = x0.len();
        let mut x = x0.to_vec();
        clip_to_bounds(&mut x, lower, upper);
        debug_assert!(within_bounds(&x, lower, upper));

        let mut evaluations = 1;
        let mut r = match residuals(&x) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!("Least squares cannot start, the forward model failed: {err}");
                return TrustRegionResult {
                    x,
                    cost: f64::INFINITY,
                    iterations: 0,
                    evaluations,
                    status: ConvergenceStatus::NotConverged(TerminationReason::ModelFailure),
                };
            }
        };
        let mut cost = self.loss.cost(&r, self.loss_scale);
        let mut lambda = INITIAL_DAMPING;
        let mut nu = 2.0;
        let mut status = ConvergenceStatus::NotConverged(TerminationReason::MaxIterations);
        let mut iterations = 0;

        'outer: for iteration in 1..=self.max_iterations {
            iterations = iteration;

            let jacobian = match self.jacobian(&residuals, &x, &r, lower, upper) {
                Ok(jacobian) => jacobian,
                Err(err) => {
                    tracing::warn!("Jacobian evaluation failed: {err}");
                    status = ConvergenceStatus::NotConverged(TerminationReason::ModelFailure);
                    break;
                }
            };
            evaluations += n;

            let w = DVector::from_vec(self.loss.weights(&r, self.loss_scale));
            let r_vec = DVector::from_column_slice(&r);
            let jtw = jacobian.transpose() * DMatrix::from_diagonal(&w);
            let hessian = &jtw * &jacobian;
            let gradient = &jtw * r_vec;

            // bound constraints pushing against the descent direction
            let active: Vec<bool> = (0..n)
                .map(|j| {
                    let g = gradient[j];
                    (x[j] <= lower[j] && g > 0.0) || (x[j] >= upper[j] && g < 0.0)
                })
                .collect();
            let projected_gradient = (0..n)
                .filter(|&j| !active[j])
                .map(|j| gradient[j].abs())
                .fold(0.0, f64::max);
            if projected_gradient <= self.gtol {
                status = ConvergenceStatus::Converged(TerminationReason::Gtol);
                break;
            }

            loop {
                if lambda.is_nan() || lambda >= MAX_DAMPING {
                    status = ConvergenceStatus::NotConverged(TerminationReason::Stalled);
                    break 'outer;
                }

                let mut damped = hessian.clone();
                for j in 0..n {
                    damped[(j, j)] += lambda * hessian[(j, j)].max(MIN_DIAGONAL);
                }
                let mut rhs = -&gradient;
                for j in (0..n).filter(|&j| active[j]) {
                    damped.row_mut(j).fill(0.0);
                    damped.column_mut(j).fill(0.0);
                    damped[(j, j)] = 1.0;
                    rhs[j] = 0.0;
                }
                let Some(delta) = Cholesky::new(damped.clone())
                    .map(|c| c.solve(&rhs))
                    .or_else(|| damped.lu().solve(&rhs))
                else {
                    lambda *= nu;
                    nu *= 2.0;
                    continue;
                };

                let mut x_new: Vec<f64> = x.iter().zip(delta.iter()).map(|(x, d)| x + d).collect();
                clip_to_bounds(&mut x_new, lower, upper);
                let step = DVector::from_iterator(n, x_new.iter().zip(&x).map(|(a, b)| a - b));

                let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
                if step.norm() <= self.xtol * (x_norm + self.xtol) {
                    status = ConvergenceStatus::Converged(TerminationReason::Xtol);
                    break 'outer;
                }

                evaluations += 1;
                let trial = residuals(&x_new);
                let cost_new = match &trial {
                    Ok(r_new) => self.loss.cost(r_new, self.loss_scale),
                    Err(_) => f64::INFINITY,
                };
                let predicted = -(gradient.dot(&step) + 0.5 * step.dot(&(&hessian * &step)));
                let actual = cost - cost_new;

                if actual > 0.0 && predicted > 0.0 {
                    let rho = actual / predicted;
                    tracing::debug!(
                        iteration,
                        cost = cost_new,
                        damping = lambda,
                        gain_ratio = rho,
                        "Least squares step accepted"
                    );
                    let converged_f = actual <= self.ftol * cost;
                    x = x_new;
                    r = trial.unwrap_or_default();
                    cost = cost_new;
                    lambda *= f64::max(1.0 / 3.0, 1.0 - (2.0 * rho - 1.0).powi(3));
                    nu = 2.0;
                    if converged_f {
                        status = ConvergenceStatus::Converged(TerminationReason::Ftol);
                        break 'outer;
                    }
                    break;
                }

                lambda *= nu;
                nu *= 2.0;
            }
        }

        TrustRegionResult {
            x,
            cost,
            iterations,
            evaluations,
            status,
        }
    }

    /// Forward-difference Jacobian, columns step inwards at the upper bound
    fn jacobian<F>(
        &self,
        residuals: &F,
        x: &[f64],
        r: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<DMatrix<f64>, ModelEvaluationError>
    where
        F: Fn(&[f64]) -> Result<Vec<f64>, ModelEvaluationError>,
    {
        let m = r.len();
        let n = x.len();
        let sqrt_eps = f64::EPSILON.sqrt();
        let mut jacobian = DMatrix::zeros(m, n);
        for j in 0..n {
            if lower[j] == upper[j] {
                continue;
            }
            let mut h = sqrt_eps * x[j].abs().max(1.0);
            if x[j] + h > upper[j] {
                h = -h;
            }
            let mut probe = x.to_vec();
            probe[j] = x[j] + h;
            let r_h = match residuals(&probe) {
                Ok(r_h) => r_h,
                Err(_) => {
                    h = -h;
                    probe[j] = (x[j] + h).clamp(lower[j], upper[j]);
                    h = probe[j] - x[j];
                    if h == 0.0 {
                        continue;
                    }
                    residuals(&probe)?
                }
            };
            for i in 0..m {
                jacobian[(i, j)] = (r_h[i] - r[i]) / h;
            }
        }
        Ok(jacobian)
    }
}

impl Default for TrustRegionFit {
    fn default() -> Self {
        Self::new(
            Self::default_max_iterations(),
            Self::default_tolerance(),
            Self::default_tolerance(),
            Self::default_tolerance(),
            Self::default_loss(),
            Self::default_loss_scale(),
            Self::default_normalize(),
        )
    }
}
