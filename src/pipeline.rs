use crate::data::{LineCatalogue, LineMatchMask, ObservedSpectrum};
use crate::error::{ConfigurationError, ModelEvaluationError, PipelineError};
use crate::fit::{
    EnsembleMcmc, GridResult, GridSearch, PosteriorChain, TrustRegionFit, TrustRegionResult,
};
use crate::model::{ForwardModel, ModelAdapter, ModelOutput};
use crate::objective::Objective;
use crate::parameters::{FitConfiguration, FixedParameters, ModelParameters, ParameterSpec};
use crate::summary::PosteriorSummary;

use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Settings of the three fit stages and of the worker pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "Pipeline")]
pub struct PipelineConfig {
    pub grid: GridSearch,
    pub least_squares: TrustRegionFit,
    pub mcmc: EnsembleMcmc,
    /// Worker threads, all cores if `None`
    pub workers: Option<usize>,
    /// Steps discarded from the start of the chain in the posterior summary
    pub burn_in: usize,
    /// Fractional bandwidth used to match observed lines to the line list
    pub match_tolerance: f64,
}

impl PipelineConfig {
    #[inline]
    pub fn default_workers() -> Option<usize> {
        None
    }

    #[inline]
    pub fn default_burn_in() -> usize {
        100
    }

    #[inline]
    pub fn default_match_tolerance() -> f64 {
        LineMatchMask::default_tolerance()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.grid.validate()?;
        self.least_squares.validate()?;
        self.mcmc.validate()?;
        if self.workers == Some(0) {
            return Err(ConfigurationError::InvalidSetting(
                "number of workers must be positive".to_owned(),
            ));
        }
        if !(0.0..1.0).contains(&self.match_tolerance) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "match tolerance must be in [0, 1), got {}",
                self.match_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridSearch::default(),
            least_squares: TrustRegionFit::default(),
            mcmc: EnsembleMcmc::default(),
            workers: Self::default_workers(),
            burn_in: Self::default_burn_in(),
            match_tolerance: Self::default_match_tolerance(),
        }
    }
}

/// Forward model evaluated at the posterior medians
#[derive(Clone, Debug, PartialEq)]
pub struct PointEstimate {
    /// log10 fit parameter values
    pub log_values: Vec<f64>,
    pub parameters: ModelParameters,
    /// Complete model table
    pub output: ModelOutput,
    /// Model intensities of the observed lines in observed order
    pub matched: Vec<f64>,
    pub line_chi2: Vec<f64>,
    pub chi2: f64,
}

/// Wall-clock time of every stage
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTiming {
    pub grid: Duration,
    pub least_squares: Duration,
    pub mcmc: Duration,
    pub total: Duration,
}

#[derive(Clone, Debug)]
pub struct PipelineResult {
    /// Fit parameter names in the order of every estimate
    pub names: Vec<&'static str>,
    pub grid: GridResult,
    pub least_squares: TrustRegionResult,
    pub chain: PosteriorChain,
    pub summary: PosteriorSummary,
    pub point_estimate: Result<PointEstimate, ModelEvaluationError>,
    pub timing: StageTiming,
}

/// Grid search, least-squares refinement and ensemble sampling of a forward model against an
/// observed spectrum
///
/// Everything that can be checked without calling the model is checked by [Pipeline::new].
pub struct Pipeline<'a, M: ?Sized> {
    model: &'a M,
    observed: &'a ObservedSpectrum,
    fit: FitConfiguration,
    fixed: FixedParameters,
    mask: LineMatchMask,
    config: PipelineConfig,
}

impl<'a, M> Pipeline<'a, M>
where
    M: ForwardModel + ?Sized,
{
    /// Validate the problem and set up the pipeline
    ///
    /// Fixed entries of `specs` override the values of `fixed`.
    pub fn new(
        model: &'a M,
        observed: &'a ObservedSpectrum,
        catalogue: &LineCatalogue,
        specs: &[ParameterSpec],
        fixed: FixedParameters,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let fit = FitConfiguration::from_specs(specs)?;
        let fixed = fixed.with_specs(specs);
        fixed.validate()?;
        if observed.len() <= fit.len() {
            return Err(ConfigurationError::Underdetermined {
                observed: observed.len(),
                fit: fit.len(),
            }
            .into());
        }
        config.mcmc.validate_dimension(fit.len())?;
        let mask = LineMatchMask::build(observed, catalogue, config.match_tolerance)?;
        tracing::debug!(
            "Matched {} observed lines to the line list of {} lines, frequency window {:?} GHz",
            mask.matched_len(),
            mask.catalogue_len(),
            mask.frequency_window()
        );
        Ok(Self {
            model,
            observed,
            fit,
            fixed,
            mask,
            config,
        })
    }

    pub fn fit_configuration(&self) -> &FitConfiguration {
        &self.fit
    }

    pub fn fixed_parameters(&self) -> &FixedParameters {
        &self.fixed
    }

    pub fn line_mask(&self) -> &LineMatchMask {
        &self.mask
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn objective(&self) -> Objective<'_, M> {
        let adapter = ModelAdapter::new(
            self.model,
            &self.fit,
            &self.fixed,
            &self.mask,
            self.observed.unit(),
        );
        Objective::new(adapter, self.observed)
    }

    /// Run all stages in a worker pool of `config.workers` threads
    pub fn run(&self) -> Result<PipelineResult, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.unwrap_or(0))
            .build()
            .map_err(|err| PipelineError::ThreadPool(err.to_string()))?;
        pool.install(|| self.run_stages())
    }

    fn run_stages(&self) -> Result<PipelineResult, PipelineError> {
        let objective = self.objective();
        let names = self.fit.names();
        let start = Instant::now();

        let grid = self.config.grid.run(&objective)?;
        let grid_time = start.elapsed();
        tracing::info!(
            "Grid search done in {grid_time:?}: chi2 = {:.5e}, {}",
            grid.chi2,
            format_estimate(&names, &grid.estimate)
        );

        let stage_start = Instant::now();
        let least_squares = self.config.least_squares.run(&objective, &grid.estimate);
        let least_squares_time = stage_start.elapsed();
        tracing::info!(
            "Least squares done in {least_squares_time:?} ({}): {}",
            least_squares.status,
            format_estimate(&names, &least_squares.x)
        );

        let stage_start = Instant::now();
        let chain = self.config.mcmc.run(&objective, &least_squares.x)?;
        let mcmc_time = stage_start.elapsed();
        let summary = PosteriorSummary::new(&chain, &self.fit, self.config.burn_in);
        tracing::info!(
            "MCMC done in {mcmc_time:?}, mean acceptance fraction {:.3}",
            summary.acceptance_fraction
        );
        for parameter in &summary.parameters {
            tracing::info!("{parameter}");
        }

        let point_estimate = self.point_estimate(&objective, summary.medians());
        if let Err(err) = &point_estimate {
            tracing::warn!("Cannot evaluate the forward model at the posterior medians: {err}");
        }

        Ok(PipelineResult {
            names,
            grid,
            least_squares,
            chain,
            summary,
            point_estimate,
            timing: StageTiming {
                grid: grid_time,
                least_squares: least_squares_time,
                mcmc: mcmc_time,
                total: start.elapsed(),
            },
        })
    }

    fn point_estimate(
        &self,
        objective: &Objective<'_, M>,
        log_values: Vec<f64>,
    ) -> Result<PointEstimate, ModelEvaluationError> {
        let adapter = objective.adapter();
        let output = adapter.evaluate_full(&log_values)?;
        let matched = self.mask.select(&output.column(self.observed.unit()));
        let line_chi2 = objective.line_chi2(&matched);
        Ok(PointEstimate {
            parameters: adapter.parameters(&log_values),
            log_values,
            output,
            chi2: line_chi2.iter().sum(),
            matched,
            line_chi2,
        })
    }
}

fn format_estimate(names: &[&str], log_values: &[f64]) -> String {
    names
        .iter()
        .zip(log_values)
        .map(|(name, x)| format!("log10({name}) = {x:.5}"))
        .join(", ")
}
