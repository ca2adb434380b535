use crate::error::{ConfigurationError, PipelineError};
use crate::model::ForwardModel;
use crate::objective::Objective;
use crate::parameters::{AxisSpacing, FitConfiguration, FitParameter, PhysicalParameter};

use conv::{ConvUtil, RoundToZero};
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Brute-force global search over a Cartesian grid of the fit parameters
///
/// Every fit parameter gets its own axis strictly inside of its bounds: linearly spaced for the
/// kinetic temperature, log-spaced for the column and volume densities. The number of axis points
/// grows with the width of the bounds:
/// - kinetic temperature: one point per `temperature_step` K, clamped to `temperature_points`
/// - column density: number of decades plus `column_density_offset`, at least
///   `column_density_min_points`
/// - volume densities: number of decades plus `volume_density_offset`, at least
///   `volume_density_min_points`
///
/// The grid point with the smallest chi-squared wins, ties go to the first point in enumeration
/// order (last axis varies fastest).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "GridSearch")]
pub struct GridSearch {
    pub temperature_step: f64,
    pub temperature_points: (usize, usize),
    pub column_density_offset: i64,
    pub column_density_min_points: usize,
    pub volume_density_offset: i64,
    pub volume_density_min_points: usize,
}

/// Best grid point and grid statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GridResult {
    /// log10 fit parameter values of the best grid point
    pub estimate: Vec<f64>,
    pub chi2: f64,
    pub index: usize,
    pub n_points: usize,
    /// Points excluded because the model failed or returned non-finite values
    pub n_failed: usize,
}

impl GridSearch {
    pub fn new(
        temperature_step: f64,
        temperature_points: (usize, usize),
        column_density_offset: i64,
        column_density_min_points: usize,
        volume_density_offset: i64,
        volume_density_min_points: usize,
    ) -> Self {
        let s = Self {
            temperature_step,
            temperature_points,
            column_density_offset,
            column_density_min_points,
            volume_density_offset,
            volume_density_min_points,
        };
        if let Err(err) = s.validate() {
            panic!("{err}");
        }
        s
    }

    #[inline]
    pub fn default_temperature_step() -> f64 {
        40.0
    }

    #[inline]
    pub fn default_temperature_points() -> (usize, usize) {
        (5, 30)
    }

    #[inline]
    pub fn default_column_density_offset() -> i64 {
        -1
    }

    #[inline]
    pub fn default_column_density_min_points() -> usize {
        5
    }

    #[inline]
    pub fn default_volume_density_offset() -> i64 {
        3
    }

    #[inline]
    pub fn default_volume_density_min_points() -> usize {
        7
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.temperature_step.is_finite() && self.temperature_step > 0.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "grid temperature step must be positive, got {}",
                self.temperature_step
            )));
        }
        let (min, max) = self.temperature_points;
        if min == 0 || min > max {
            return Err(ConfigurationError::InvalidSetting(format!(
                "grid temperature points must satisfy 0 < min <= max, got ({min}, {max})"
            )));
        }
        if self.column_density_min_points == 0 || self.volume_density_min_points == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "grid minimum number of points must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Number of axis points for a fit parameter
    pub fn axis_len(&self, parameter: &FitParameter) -> Result<usize, ConfigurationError> {
        let (lower, upper) = (parameter.lower, parameter.upper);
        let (span, offset, min_points, max_points) = match parameter.kind {
            PhysicalParameter::KineticTemperature => {
                let (min, max) = self.temperature_points;
                ((upper - lower) / self.temperature_step, 0, min, max)
            }
            PhysicalParameter::ColumnDensity => (
                upper.log10() - lower.log10(),
                self.column_density_offset,
                self.column_density_min_points,
                usize::MAX,
            ),
            PhysicalParameter::Density(_) => (
                upper.log10() - lower.log10(),
                self.volume_density_offset,
                self.volume_density_min_points,
                usize::MAX,
            ),
        };
        let n = span
            .approx_as_by::<i64, RoundToZero>()
            .map_err(|_| {
                ConfigurationError::InvalidSetting(format!(
                    "cannot build a grid axis for {} within ({lower}, {upper})",
                    parameter.kind
                ))
            })?
            .saturating_add(offset);
        let n = usize::try_from(n).unwrap_or(0);
        Ok(n.clamp(min_points, max_points))
    }

    /// log10 values of the axis points, endpoints excluded
    pub fn axis(&self, parameter: &FitParameter) -> Result<Vec<f64>, ConfigurationError> {
        let n = self.axis_len(parameter)?;
        let step_count = (n + 1) as f64;
        let axis = match parameter.kind.spacing() {
            AxisSpacing::Linear => {
                let step = (parameter.upper - parameter.lower) / step_count;
                (1..=n)
                    .map(|k| (parameter.lower + k as f64 * step).log10())
                    .collect()
            }
            AxisSpacing::Geometric => {
                let (lower, upper) = parameter.log_bounds();
                let step = (upper - lower) / step_count;
                (1..=n).map(|k| lower + k as f64 * step).collect()
            }
        };
        Ok(axis)
    }

    /// All grid points in enumeration order
    pub fn points(&self, fit: &FitConfiguration) -> Result<Vec<Vec<f64>>, ConfigurationError> {
        let axes = fit
            .parameters()
            .iter()
            .map(|p| self.axis(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(axes.into_iter().multi_cartesian_product().collect())
    }

    pub fn run<M>(&self, objective: &Objective<'_, M>) -> Result<GridResult, PipelineError>
    where
        M: ForwardModel + ?Sized,
    {
        let points = self.points(objective.adapter().fit())?;
        let n_points = points.len();
        tracing::info!("Evaluating the forward model on a grid of {n_points} points");

        let chi2: Vec<f64> = objective
            .adapter()
            .evaluate_batch(&points)
            .into_iter()
            .map(|model| match model {
                Ok(model) => objective.chi2_of(&model),
                Err(err) => {
                    tracing::debug!("Grid point excluded: {err}");
                    f64::INFINITY
                }
            })
            .map(|chi2| if chi2.is_nan() { f64::INFINITY } else { chi2 })
            .collect();

        let n_failed = chi2.iter().filter(|c| !c.is_finite()).count();
        if n_failed > 0 {
            tracing::warn!("{n_failed} of {n_points} grid points have no finite chi-squared");
        }

        let (index, &best) = chi2
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_finite())
            .reduce(|best, current| if current.1 < best.1 { current } else { best })
            .ok_or(PipelineError::NoFiniteGridPoint { points: n_points })?;

        Ok(GridResult {
            estimate: points[index].clone(),
            chi2: best,
            index,
            n_points,
            n_failed,
        })
    }
}

impl Default for GridSearch {
    fn default() -> Self {
        Self::new(
            Self::default_temperature_step(),
            Self::default_temperature_points(),
            Self::default_column_density_offset(),
            Self::default_column_density_min_points(),
            Self::default_volume_density_offset(),
            Self::default_volume_density_min_points(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{IntensityUnit, LineCatalogue, LineMatchMask, ObservedSpectrum};
    use crate::model::{LineIntensities, ModelAdapter};
    use crate::parameters::{CollisionPartner, FixedParameters, ModelParameters, ParameterSpec};
    use crate::tests::{FnModel, linear_model};

    use approx::assert_abs_diff_eq;

    fn fit_parameter(kind: PhysicalParameter, lower: f64, upper: f64) -> FitParameter {
        FitParameter { kind, lower, upper }
    }

    #[test]
    fn axis_lengths() {
        let grid = GridSearch::default();
        let tkin = |lower, upper| {
            grid.axis_len(&fit_parameter(PhysicalParameter::KineticTemperature, lower, upper))
                .unwrap()
        };
        assert_eq!(tkin(1.0, 100.0), 5);
        assert_eq!(tkin(10.0, 410.0), 10);
        assert_eq!(tkin(10.0, 5000.0), 30);

        let cd = |lower, upper| {
            grid.axis_len(&fit_parameter(PhysicalParameter::ColumnDensity, lower, upper))
                .unwrap()
        };
        assert_eq!(cd(1e12, 1e16), 5);
        assert_eq!(cd(1e10, 3e20), 9);

        let h2 = |lower, upper| {
            grid.axis_len(&fit_parameter(
                PhysicalParameter::Density(CollisionPartner::H2),
                lower,
                upper,
            ))
            .unwrap()
        };
        assert_eq!(h2(1e2, 1e4), 7);
        assert_eq!(h2(1e0, 3e8), 11);
    }

    #[test]
    fn axis_excludes_endpoints() {
        let grid = GridSearch::default();
        let axis = grid
            .axis(&fit_parameter(PhysicalParameter::KineticTemperature, 1.0, 100.0))
            .unwrap();
        let linear: Vec<_> = axis.iter().map(|x| 10f64.powf(*x)).collect();
        assert_abs_diff_eq!(&linear[..], &[17.5, 34.0, 50.5, 67.0, 83.5][..], epsilon = 1e-9);

        let axis = grid
            .axis(&fit_parameter(PhysicalParameter::ColumnDensity, 1e12, 1e18))
            .unwrap();
        assert_abs_diff_eq!(&axis[..], &[13.0, 14.0, 15.0, 16.0, 17.0][..], epsilon = 1e-12);
    }

    #[test]
    fn last_axis_varies_fastest() {
        let specs = [
            ParameterSpec::fit(PhysicalParameter::KineticTemperature, 1.0, 100.0),
            ParameterSpec::fit(PhysicalParameter::ColumnDensity, 1e12, 1e18),
        ];
        let fit = FitConfiguration::from_specs(&specs).unwrap();
        let points = GridSearch::default().points(&fit).unwrap();
        assert_eq!(points.len(), 25);
        assert_eq!(points[0][0], points[1][0]);
        assert_abs_diff_eq!(points[0][1], 13.0, epsilon = 1e-12);
        assert_abs_diff_eq!(points[1][1], 14.0, epsilon = 1e-12);
    }

    struct Setup {
        observed: ObservedSpectrum,
        fit: FitConfiguration,
        fixed: FixedParameters,
        mask: LineMatchMask,
    }

    fn setup(intensities: Vec<f64>) -> Setup {
        let specs = [ParameterSpec::fit(
            PhysicalParameter::KineticTemperature,
            1.0,
            100.0,
        )];
        let observed = ObservedSpectrum::new(
            vec![100.0, 200.0],
            intensities,
            None,
            IntensityUnit::Temperature,
        )
        .unwrap();
        let mask =
            LineMatchMask::build(&observed, &LineCatalogue::new(vec![100.0, 200.0]), 1e-3).unwrap();
        Setup {
            fit: FitConfiguration::from_specs(&specs).unwrap(),
            fixed: FixedParameters::new("mock.dat").with_specs(&specs),
            observed,
            mask,
        }
    }

    #[test]
    fn exact_grid_point_has_zero_chi2() {
        // 34 K is the second axis point
        let s = setup(vec![34.0, 17.0]);
        let model = linear_model();
        let adapter = ModelAdapter::new(
            &model,
            &s.fit,
            &s.fixed,
            &s.mask,
            IntensityUnit::Temperature,
        );
        let objective = Objective::new(adapter, &s.observed);
        let result = GridSearch::default().run(&objective).unwrap();
        assert_eq!(result.index, 1);
        assert_abs_diff_eq!(result.chi2, 0.0, epsilon = 1e-18);
        assert_abs_diff_eq!(result.estimate[0], 34f64.log10(), epsilon = 1e-12);
        assert_eq!(result.n_points, 5);
        assert_eq!(result.n_failed, 0);
    }

    #[test]
    fn ties_go_to_first_point() {
        let s = setup(vec![1.0, 1.0]);
        let model = FnModel::new(2, |_: &ModelParameters, _| LineIntensities::uniform(1.0));
        let adapter = ModelAdapter::new(
            &model,
            &s.fit,
            &s.fixed,
            &s.mask,
            IntensityUnit::Temperature,
        );
        let objective = Objective::new(adapter, &s.observed);
        let result = GridSearch::default().run(&objective).unwrap();
        assert_eq!(result.index, 0);
    }

    #[test]
    fn failed_points_are_excluded() {
        let s = setup(vec![17.5, 8.75]);
        let model = linear_model().failing_if(|p: &ModelParameters| {
            p.get(PhysicalParameter::KineticTemperature).unwrap() < 20.0
        });
        let adapter = ModelAdapter::new(
            &model,
            &s.fit,
            &s.fixed,
            &s.mask,
            IntensityUnit::Temperature,
        );
        let objective = Objective::new(adapter, &s.observed);
        let result = GridSearch::default().run(&objective).unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.n_failed, 1);
    }

    #[test]
    fn no_finite_point_is_fatal() {
        let s = setup(vec![1.0, 1.0]);
        let model = linear_model().failing_if(|_: &ModelParameters| true);
        let adapter = ModelAdapter::new(
            &model,
            &s.fit,
            &s.fixed,
            &s.mask,
            IntensityUnit::Temperature,
        );
        let objective = Objective::new(adapter, &s.observed);
        assert!(matches!(
            GridSearch::default().run(&objective),
            Err(PipelineError::NoFiniteGridPoint { points: 5 })
        ));
    }
}
