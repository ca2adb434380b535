use crate::error::{ConfigurationError, ModelEvaluationError, PipelineError};
use crate::fit::mcmc::chain::PosteriorChain;
use crate::fit::mcmc::moves::{
    DeSnookerMove, DifferentialEvolutionMove, EnsembleMove, EnsembleMoveTrait, StretchMove,
    WeightedMove,
};
use crate::model::ForwardModel;
use crate::objective::Objective;

use ndarray::{Array2, s};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::Range;

const PROGRESS_STEPS: usize = 50;
const LOW_ACCEPTANCE: f64 = 0.05;

/// Affine-invariant ensemble sampler of the log-posterior
///
/// Walkers start in a Gaussian ball of radius `init_scale` around the seed estimate. Each step
/// picks one move of the weighted mixture and updates the two halves of the ensemble in turn,
/// every half against the other one. Proposals of a half are evaluated in parallel, so the
/// result depends on the seed only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "EnsembleMcmc")]
pub struct EnsembleMcmc {
    pub n_walkers: usize,
    pub n_steps: usize,
    pub init_scale: f64,
    pub seed: Option<u64>,
    pub moves: Vec<WeightedMove>,
}

impl EnsembleMcmc {
    pub fn new(
        n_walkers: usize,
        n_steps: usize,
        init_scale: f64,
        seed: Option<u64>,
        moves: Vec<WeightedMove>,
    ) -> Self {
        assert!(n_steps > 0, "number of steps should be positive");
        assert!(init_scale >= 0.0, "initial scale should be non-negative");
        let mcmc = Self {
            n_walkers,
            n_steps,
            init_scale,
            seed,
            moves,
        };
        if let Err(err) = mcmc.validate() {
            panic!("{err}");
        }
        mcmc
    }

    #[inline]
    pub fn default_n_walkers() -> usize {
        35
    }

    #[inline]
    pub fn default_n_steps() -> usize {
        500
    }

    #[inline]
    pub fn default_init_scale() -> f64 {
        1e-3
    }

    #[inline]
    pub fn default_seed() -> Option<u64> {
        None
    }

    pub fn default_moves() -> Vec<WeightedMove> {
        vec![
            WeightedMove::new(0.7, EnsembleMove::Stretch(StretchMove::new(3.0))),
            WeightedMove::new(
                0.2,
                EnsembleMove::DifferentialEvolution(DifferentialEvolutionMove::default()),
            ),
            WeightedMove::new(0.1, EnsembleMove::Snooker(DeSnookerMove::default())),
        ]
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::InvalidSetting(msg));
        if self.n_steps == 0 {
            return invalid("MCMC needs at least one step".to_owned());
        }
        if !(self.init_scale.is_finite() && self.init_scale >= 0.0) {
            return invalid(format!(
                "MCMC initial scale must be non-negative, got {}",
                self.init_scale
            ));
        }
        if self.moves.is_empty() {
            return invalid("MCMC move list is empty".to_owned());
        }
        let mut total_weight = 0.0;
        for WeightedMove {
            weight,
            ensemble_move,
        } in &self.moves
        {
            if !(weight.is_finite() && *weight >= 0.0) {
                return invalid(format!("MCMC move weight must be non-negative, got {weight}"));
            }
            ensemble_move.validate()?;
            if *weight > 0.0 && self.n_walkers / 2 < ensemble_move.min_complement() {
                return invalid(format!(
                    "{} walkers are too few for the {ensemble_move:?} move",
                    self.n_walkers
                ));
            }
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            return invalid("MCMC move weights sum to zero".to_owned());
        }
        Ok(())
    }

    /// Check the ensemble size against the number of fit parameters
    pub fn validate_dimension(&self, dim: usize) -> Result<(), ConfigurationError> {
        if self.n_walkers < 2 * dim {
            return Err(ConfigurationError::InvalidSetting(format!(
                "{} walkers are too few for {dim} fit parameters, need at least {}",
                self.n_walkers,
                2 * dim
            )));
        }
        Ok(())
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        }
    }

    /// Seed estimate plus independent Gaussian perturbations of `init_scale`
    pub fn initial_positions<R: Rng + ?Sized>(&self, x0: &[f64], rng: &mut R) -> Array2<f64> {
        Array2::from_shape_fn((self.n_walkers, x0.len()), |(_, j)| {
            x0[j] + self.init_scale * rng.sample::<f64, _>(StandardNormal)
        })
    }

    fn choose_move<R: Rng + ?Sized>(&self, rng: &mut R) -> &EnsembleMove {
        let total: f64 = self.moves.iter().map(|m| m.weight).sum();
        let mut u = rng.random::<f64>() * total;
        for m in &self.moves {
            if u < m.weight {
                return &m.ensemble_move;
            }
            u -= m.weight;
        }
        // rounding can leave u slightly above the last weight
        &self
            .moves
            .iter()
            .rev()
            .find(|m| m.weight > 0.0)
            .unwrap_or(&self.moves[self.moves.len() - 1])
            .ensemble_move
    }

    /// Sample the posterior of the objective starting around `x0`
    pub fn run<M>(
        &self,
        objective: &Objective<M>,
        x0: &[f64],
    ) -> Result<PosteriorChain, PipelineError>
    where
        M: ForwardModel + ?Sized,
    {
        self.sample(|x| objective.log_posterior(x), x0)
    }

    /// Sample an arbitrary log-probability function starting around `x0`
    ///
    /// A NaN log-probability of an initial walker is an error. Failed or NaN evaluations of
    /// proposals are rejected and counted in [PosteriorChain::n_failed].
    pub fn sample<F>(&self, log_prob: F, x0: &[f64]) -> Result<PosteriorChain, PipelineError>
    where
        F: Fn(&[f64]) -> Result<f64, ModelEvaluationError> + Sync,
    {
        self.validate()?;
        self.validate_dimension(x0.len())?;

        let mut rng = self.rng();
        let mut positions = self.initial_positions(x0, &mut rng);
        let rows: Vec<Vec<f64>> = positions.outer_iter().map(|row| row.to_vec()).collect();
        let mut log_probs = Vec::with_capacity(self.n_walkers);
        for result in rows.par_iter().map(|x| log_prob(x.as_slice())).collect::<Vec<_>>() {
            match result {
                Ok(lp) if lp.is_nan() => {
                    return Err(ModelEvaluationError::NanLogProbability.into());
                }
                Ok(lp) => log_probs.push(lp),
                Err(ModelEvaluationError::NanLogProbability) => {
                    return Err(ModelEvaluationError::NanLogProbability.into());
                }
                Err(err) => {
                    tracing::warn!("Initial walker position rejected: {err}");
                    log_probs.push(f64::NEG_INFINITY);
                }
            }
        }
        if log_probs.iter().all(|lp| lp.is_infinite()) {
            tracing::warn!("No walker starts at a finite log-probability");
        }

        tracing::info!(
            "Running ensemble MCMC: {} walkers, {} steps, {} parameters",
            self.n_walkers,
            self.n_steps,
            x0.len()
        );

        let half = self.n_walkers / 2;
        let halves = [(0..half, half..self.n_walkers), (half..self.n_walkers, 0..half)];
        let mut chain = PosteriorChain::with_capacity(self.n_steps, self.n_walkers, x0.len());
        for step in 0..self.n_steps {
            let ensemble_move = self.choose_move(&mut rng);
            for (active, complement) in halves.iter().cloned() {
                self.update_half(
                    &log_prob,
                    ensemble_move,
                    &mut positions,
                    &mut log_probs,
                    active,
                    complement,
                    &mut chain,
                    &mut rng,
                );
            }
            chain.push(positions.view(), &log_probs);
            if (step + 1) % PROGRESS_STEPS == 0 {
                tracing::debug!(
                    "MCMC step {}/{}: mean acceptance fraction {:.3}",
                    step + 1,
                    self.n_steps,
                    chain.mean_acceptance_fraction()
                );
            }
        }

        if chain.n_failed() > 0 {
            tracing::warn!(
                "{} MCMC proposals were rejected as their log-probability could not be evaluated",
                chain.n_failed()
            );
        }
        let acceptance = chain.mean_acceptance_fraction();
        if acceptance < LOW_ACCEPTANCE {
            tracing::warn!(
                "Low MCMC mean acceptance fraction {acceptance:.3}, the chain may be poorly mixed"
            );
        }
        Ok(chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn update_half<F, R>(
        &self,
        log_prob: &F,
        ensemble_move: &EnsembleMove,
        positions: &mut Array2<f64>,
        log_probs: &mut [f64],
        active: Range<usize>,
        complement: Range<usize>,
        chain: &mut PosteriorChain,
        rng: &mut R,
    ) where
        F: Fn(&[f64]) -> Result<f64, ModelEvaluationError> + Sync,
        R: Rng + ?Sized,
    {
        let (proposals, factors) = ensemble_move.propose(
            rng,
            positions.slice(s![active.clone(), ..]),
            positions.slice(s![complement, ..]),
        );
        let rows: Vec<Vec<f64>> = proposals.outer_iter().map(|row| row.to_vec()).collect();
        let results: Vec<_> = rows.par_iter().map(|x| log_prob(x.as_slice())).collect();

        for (k, (walker, result)) in active.zip(results).enumerate() {
            let new = match result {
                Ok(lp) if !lp.is_nan() => lp,
                Ok(_) | Err(_) => {
                    chain.record_failure();
                    f64::NEG_INFINITY
                }
            };
            let log_ratio = factors[k] + new - log_probs[walker];
            let u: f64 = rng.random();
            if new > f64::NEG_INFINITY && u.ln() < log_ratio {
                positions.row_mut(walker).assign(&proposals.row(k));
                log_probs[walker] = new;
                chain.record_acceptance(walker);
            }
        }
    }
}

impl Default for EnsembleMcmc {
    fn default() -> Self {
        Self::new(
            Self::default_n_walkers(),
            Self::default_n_steps(),
            Self::default_init_scale(),
            Self::default_seed(),
            Self::default_moves(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn gaussian(
        mu: &'static [f64],
        sd: f64,
    ) -> impl Fn(&[f64]) -> Result<f64, ModelEvaluationError> + Sync {
        move |x| {
            Ok(-0.5
                * x.iter()
                    .zip(mu)
                    .map(|(x, mu)| ((x - mu) / sd).powi(2))
                    .sum::<f64>())
        }
    }

    #[test]
    fn initial_positions_are_close_to_seed() {
        let mcmc = EnsembleMcmc::default().with_seed(0);
        let x0 = [0.7, 20.0, 3.0];
        let mut rng = mcmc.rng();
        let positions = mcmc.initial_positions(&x0, &mut rng);
        assert_eq!(positions.dim(), (35, 3));
        for row in positions.outer_iter() {
            for (x, x0) in row.iter().zip(&x0) {
                assert!((x - x0).abs() < 5e-3, "{x} is too far from {x0}");
            }
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mcmc = EnsembleMcmc {
            n_steps: 50,
            ..EnsembleMcmc::default().with_seed(42)
        };
        let a = mcmc.sample(gaussian(&[0.0, 1.0], 1.0), &[0.0, 1.0]).unwrap();
        let b = mcmc.sample(gaussian(&[0.0, 1.0], 1.0), &[0.0, 1.0]).unwrap();
        assert_eq!(a.flat(0), b.flat(0));
        assert_eq!(a.n_steps(), 50);
        assert_eq!(a.n_walkers(), 35);
    }

    #[test]
    fn recovers_gaussian_moments() {
        let mcmc = EnsembleMcmc {
            n_walkers: 32,
            n_steps: 1500,
            ..EnsembleMcmc::default().with_seed(7)
        };
        let chain = mcmc.sample(gaussian(&[1.0, -2.0], 0.5), &[1.0, -2.0]).unwrap();
        let flat = chain.flat(500);
        for (j, mu) in [1.0, -2.0].into_iter().enumerate() {
            let column = flat.column(j);
            let mean = column.mean().unwrap();
            let sd = column.std(0.0);
            assert_abs_diff_eq!(mean, mu, epsilon = 0.1);
            assert_abs_diff_eq!(sd, 0.5, epsilon = 0.1);
        }
        let acceptance = chain.mean_acceptance_fraction();
        assert!(acceptance > 0.1 && acceptance < 0.9);
    }

    #[test]
    fn failed_proposals_are_rejected() {
        let mcmc = EnsembleMcmc {
            n_steps: 200,
            ..EnsembleMcmc::default().with_seed(3)
        };
        let log_prob = |x: &[f64]| {
            if x[0] > 0.5 {
                Err(ModelEvaluationError::Failed("too hot".to_owned()))
            } else {
                Ok(-0.5 * x[0] * x[0])
            }
        };
        let chain = mcmc.sample(log_prob, &[0.0]).unwrap();
        assert!(chain.n_failed() > 0);
        assert!(chain.flat(0).iter().all(|&x| x <= 0.5));
    }

    #[test]
    fn nan_proposals_are_rejected() {
        let mcmc = EnsembleMcmc {
            n_steps: 200,
            ..EnsembleMcmc::default().with_seed(3)
        };
        let log_prob = |x: &[f64]| {
            if x[0] > 0.5 {
                Ok(f64::NAN)
            } else {
                Ok(-0.5 * x[0] * x[0])
            }
        };
        let chain = mcmc.sample(log_prob, &[0.0]).unwrap();
        assert!(chain.n_failed() > 0);
        assert!(chain.flat(0).iter().all(|&x| x <= 0.5));
        assert!(chain.flat_log_probs(0).iter().all(|lp| !lp.is_nan()));
    }

    #[test]
    fn nan_initial_log_probability_is_an_error() {
        let mcmc = EnsembleMcmc {
            n_steps: 10,
            ..EnsembleMcmc::default().with_seed(0)
        };
        let err = mcmc.sample(|_| Ok(f64::NAN), &[0.0]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Model(ModelEvaluationError::NanLogProbability)
        ));
    }

    #[test]
    fn too_few_walkers() {
        let mcmc = EnsembleMcmc {
            n_walkers: 4,
            ..EnsembleMcmc::default()
        };
        assert!(mcmc.validate().is_err());
        let stretch_only = EnsembleMcmc {
            n_walkers: 4,
            moves: vec![WeightedMove::new(1.0, EnsembleMove::stretch(2.0))],
            ..EnsembleMcmc::default()
        };
        assert!(stretch_only.validate().is_ok());
        assert!(stretch_only.validate_dimension(3).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let mcmc = EnsembleMcmc::default().with_seed(1);
        let json = serde_json::to_string(&mcmc).unwrap();
        let back: EnsembleMcmc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mcmc);
    }
}
