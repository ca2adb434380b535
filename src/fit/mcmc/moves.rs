use crate::error::ConfigurationError;

use enum_dispatch::enum_dispatch;
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand::seq::index::sample as sample_indices;
use rand_distr::StandardNormal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Proposal of an affine-invariant ensemble move
///
/// Every walker of `walkers` gets a proposal built from itself and the complementary ensemble
/// `complement`, which is held fixed during the update. The returned vector holds the log of the
/// proposal asymmetry factor added to the Metropolis–Hastings log-ratio of each walker.
#[enum_dispatch]
pub trait EnsembleMoveTrait: Send + Sync + Clone + Debug {
    fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        walkers: ArrayView2<f64>,
        complement: ArrayView2<f64>,
    ) -> (Array2<f64>, Vec<f64>);

    /// Smallest complementary ensemble the move works with
    fn min_complement(&self) -> usize;

    fn validate(&self) -> Result<(), ConfigurationError>;
}

/// Ensemble move, see the variants for the proposals
#[enum_dispatch(EnsembleMoveTrait)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[non_exhaustive]
pub enum EnsembleMove {
    Stretch(StretchMove),
    DifferentialEvolution(DifferentialEvolutionMove),
    Snooker(DeSnookerMove),
}

impl EnsembleMove {
    pub fn stretch(a: f64) -> Self {
        Self::Stretch(StretchMove::new(a))
    }

    pub fn differential_evolution() -> Self {
        Self::DifferentialEvolution(DifferentialEvolutionMove::default())
    }

    pub fn snooker() -> Self {
        Self::Snooker(DeSnookerMove::default())
    }
}

/// Goodman & Weare stretch move
///
/// `q = c + z (s - c)` with a random complementary walker `c` and `z` drawn from
/// `g(z) ~ 1 / sqrt(z)` on `[1 / a, a]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "Stretch")]
pub struct StretchMove {
    pub a: f64,
}

impl StretchMove {
    pub fn new(a: f64) -> Self {
        assert!(a > 1.0, "stretch scale must be larger than unity");
        Self { a }
    }

    #[inline]
    pub fn default_a() -> f64 {
        2.0
    }

    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        ((self.a - 1.0) * u + 1.0).powi(2) / self.a
    }
}

impl Default for StretchMove {
    fn default() -> Self {
        Self::new(Self::default_a())
    }
}

impl EnsembleMoveTrait for StretchMove {
    fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        walkers: ArrayView2<f64>,
        complement: ArrayView2<f64>,
    ) -> (Array2<f64>, Vec<f64>) {
        let dim = walkers.ncols();
        let mut proposals = Array2::zeros(walkers.raw_dim());
        let mut factors = Vec::with_capacity(walkers.nrows());
        for (s, mut q) in walkers.outer_iter().zip(proposals.outer_iter_mut()) {
            let z = self.sample_z(rng);
            let c = complement.row(rng.random_range(0..complement.nrows()));
            q.assign(&(&c + &((&s - &c) * z)));
            factors.push((dim as f64 - 1.0) * z.ln());
        }
        (proposals, factors)
    }

    fn min_complement(&self) -> usize {
        1
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.a.is_finite() && self.a > 1.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "stretch move scale must be larger than unity, got {}",
                self.a
            )));
        }
        Ok(())
    }
}

/// Differential evolution move of ter Braak (2006)
///
/// `q = s + gamma0 (c1 - c2) + sigma N(0, 1)` for two distinct complementary walkers, `gamma0`
/// defaults to `2.38 / sqrt(2 dim)`. The proposal is symmetric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "DifferentialEvolution")]
pub struct DifferentialEvolutionMove {
    pub sigma: f64,
    pub gamma0: Option<f64>,
}

impl DifferentialEvolutionMove {
    pub fn new(sigma: f64, gamma0: Option<f64>) -> Self {
        assert!(sigma >= 0.0, "sigma must be non-negative");
        Self { sigma, gamma0 }
    }

    #[inline]
    pub fn default_sigma() -> f64 {
        1e-5
    }

    #[inline]
    pub fn default_gamma0() -> Option<f64> {
        None
    }

    fn gamma0(&self, dim: usize) -> f64 {
        self.gamma0
            .unwrap_or_else(|| 2.38 / (2.0 * dim as f64).sqrt())
    }
}

impl Default for DifferentialEvolutionMove {
    fn default() -> Self {
        Self::new(Self::default_sigma(), Self::default_gamma0())
    }
}

impl EnsembleMoveTrait for DifferentialEvolutionMove {
    fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        walkers: ArrayView2<f64>,
        complement: ArrayView2<f64>,
    ) -> (Array2<f64>, Vec<f64>) {
        let gamma0 = self.gamma0(walkers.ncols());
        let mut proposals = Array2::zeros(walkers.raw_dim());
        for (s, mut q) in walkers.outer_iter().zip(proposals.outer_iter_mut()) {
            let pair = sample_indices(rng, complement.nrows(), 2);
            let (c1, c2) = (complement.row(pair.index(0)), complement.row(pair.index(1)));
            let noise = self.sigma * rng.sample::<f64, _>(StandardNormal);
            q.assign(&(&s + &((&c1 - &c2) * gamma0) + noise));
        }
        (proposals, vec![0.0; walkers.nrows()])
    }

    fn min_complement(&self) -> usize {
        2
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "differential evolution sigma must be non-negative, got {}",
                self.sigma
            )));
        }
        if let Some(gamma0) = self.gamma0 {
            if !gamma0.is_finite() {
                return Err(ConfigurationError::InvalidSetting(format!(
                    "differential evolution gamma0 must be finite, got {gamma0}"
                )));
            }
        }
        Ok(())
    }
}

/// Differential evolution snooker move of ter Braak & Vrugt (2008)
///
/// With three distinct complementary walkers `z`, `z1` and `z2`, the walker moves along
/// `u = (s - z) / |s - z|` by `gammas (u z1 - u z2)`. The log asymmetry factor is
/// `(dim - 1) ln(|q - z| / |s - z|)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "Snooker")]
pub struct DeSnookerMove {
    pub gammas: f64,
}

impl DeSnookerMove {
    pub fn new(gammas: f64) -> Self {
        Self { gammas }
    }

    #[inline]
    pub fn default_gammas() -> f64 {
        1.7
    }
}

impl Default for DeSnookerMove {
    fn default() -> Self {
        Self::new(Self::default_gammas())
    }
}

impl EnsembleMoveTrait for DeSnookerMove {
    fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        walkers: ArrayView2<f64>,
        complement: ArrayView2<f64>,
    ) -> (Array2<f64>, Vec<f64>) {
        let dim = walkers.ncols();
        let mut proposals = Array2::zeros(walkers.raw_dim());
        let mut factors = Vec::with_capacity(walkers.nrows());
        for (s, mut q) in walkers.outer_iter().zip(proposals.outer_iter_mut()) {
            let triple = sample_indices(rng, complement.nrows(), 3);
            let z = complement.row(triple.index(0));
            let z1 = complement.row(triple.index(1));
            let z2 = complement.row(triple.index(2));

            let delta: Array1<f64> = &s - &z;
            let norm = delta.dot(&delta).sqrt();
            if norm == 0.0 {
                q.assign(&s);
                factors.push(f64::NEG_INFINITY);
                continue;
            }
            let u = delta / norm;
            let shift = self.gammas * (u.dot(&z1) - u.dot(&z2));
            q.assign(&(&s + &(&u * shift)));

            let new_delta = &q - &z;
            let new_norm = new_delta.dot(&new_delta).sqrt();
            factors.push((dim as f64 - 1.0) * (new_norm.ln() - norm.ln()));
        }
        (proposals, factors)
    }

    fn min_complement(&self) -> usize {
        3
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.gammas.is_finite() {
            return Err(ConfigurationError::InvalidSetting(format!(
                "snooker gammas must be finite, got {}",
                self.gammas
            )));
        }
        Ok(())
    }
}

/// Ensemble move with its mixture weight
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightedMove {
    pub weight: f64,
    #[serde(rename = "move")]
    pub ensemble_move: EnsembleMove,
}

impl WeightedMove {
    pub fn new(weight: f64, ensemble_move: EnsembleMove) -> Self {
        Self {
            weight,
            ensemble_move,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn stretch_z_is_within_scale() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let stretch = StretchMove::new(3.0);
        for _ in 0..1000 {
            let z = stretch.sample_z(&mut rng);
            assert!((1.0 / 3.0..=3.0).contains(&z));
        }
    }

    #[test]
    fn stretch_proposal_is_on_the_line() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let walkers = array![[1.0, 1.0]];
        let complement = array![[0.0, 0.0]];
        let (q, factors) =
            StretchMove::default().propose(&mut rng, walkers.view(), complement.view());
        // c = 0, so q = z s and ln z = factor for dim = 2
        assert_abs_diff_eq!(q[[0, 0]], q[[0, 1]]);
        assert_abs_diff_eq!(q[[0, 0]].ln(), factors[0], epsilon = 1e-12);
    }

    #[test]
    fn differential_evolution_is_symmetric() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let walkers = array![[0.0, 0.0], [1.0, 1.0]];
        let complement = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let (q, factors) = DifferentialEvolutionMove::new(0.0, Some(1.0)).propose(
            &mut rng,
            walkers.view(),
            complement.view(),
        );
        assert_eq!(factors, [0.0, 0.0]);
        // every difference of two complementary walkers has integer components
        for v in q.iter() {
            assert_abs_diff_eq!(v.fract().abs(), 0.0);
        }
    }

    #[test]
    fn snooker_moves_along_the_walker_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let walkers = array![[2.0, 0.0]];
        let complement = array![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
        let (q, factors) =
            DeSnookerMove::default().propose(&mut rng, walkers.view(), complement.view());
        // all complementary walkers coincide: no shift
        assert_abs_diff_eq!(q[[0, 0]], 2.0);
        assert_abs_diff_eq!(q[[0, 1]], 0.0);
        assert_abs_diff_eq!(factors[0], 0.0);
    }

    #[test]
    fn weighted_move_serde() {
        let weighted = WeightedMove::new(0.7, EnsembleMove::stretch(3.0));
        let json = serde_json::to_string(&weighted).unwrap();
        let back: WeightedMove = serde_json::from_str(&json).unwrap();
        assert_eq!(back, weighted);
    }
}
