use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis, s};

/// Walker positions and log-probabilities of every step of an ensemble run
///
/// Positions are stored as `[step][walker][parameter]` in log10 space. The chain is filled
/// step by step by the sampler and is read-only afterwards.
#[derive(Clone, Debug)]
pub struct PosteriorChain {
    samples: Array3<f64>,
    log_probs: Array2<f64>,
    n_accepted: Vec<usize>,
    n_failed: usize,
    filled: usize,
}

impl PosteriorChain {
    pub(crate) fn with_capacity(n_steps: usize, n_walkers: usize, dim: usize) -> Self {
        Self {
            samples: Array3::zeros((n_steps, n_walkers, dim)),
            log_probs: Array2::zeros((n_steps, n_walkers)),
            n_accepted: vec![0; n_walkers],
            n_failed: 0,
            filled: 0,
        }
    }

    pub(crate) fn push(&mut self, positions: ArrayView2<f64>, log_probs: &[f64]) {
        self.samples
            .index_axis_mut(Axis(0), self.filled)
            .assign(&positions);
        self.log_probs
            .index_axis_mut(Axis(0), self.filled)
            .assign(&Array1::from(log_probs.to_vec()));
        self.filled += 1;
    }

    pub(crate) fn record_acceptance(&mut self, walker: usize) {
        self.n_accepted[walker] += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.n_failed += 1;
    }

    pub fn n_steps(&self) -> usize {
        self.filled
    }

    pub fn n_walkers(&self) -> usize {
        self.samples.len_of(Axis(1))
    }

    pub fn dimension(&self) -> usize {
        self.samples.len_of(Axis(2))
    }

    /// `[step][walker][parameter]` view without the first `discard` steps
    pub fn get_chain(&self, discard: usize) -> ArrayView3<'_, f64> {
        let discard = discard.min(self.filled);
        self.samples.slice(s![discard..self.filled, .., ..])
    }

    pub fn get_log_probs(&self, discard: usize) -> ArrayView2<'_, f64> {
        let discard = discard.min(self.filled);
        self.log_probs.slice(s![discard..self.filled, ..])
    }

    /// `[sample][parameter]` array of all walkers after the first `discard` steps
    ///
    /// Samples of one step are contiguous.
    pub fn flat(&self, discard: usize) -> Array2<f64> {
        let chain = self.get_chain(discard);
        let (n_steps, n_walkers, dim) = chain.dim();
        chain
            .to_owned()
            .into_shape_with_order((n_steps * n_walkers, dim))
            .unwrap_or_else(|_| Array2::zeros((0, dim)))
    }

    pub fn flat_log_probs(&self, discard: usize) -> Array1<f64> {
        self.get_log_probs(discard).iter().copied().collect()
    }

    /// Fraction of accepted proposals of every walker
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        let steps = self.filled.max(1) as f64;
        self.n_accepted
            .iter()
            .map(|&n| n as f64 / steps)
            .collect()
    }

    pub fn mean_acceptance_fraction(&self) -> f64 {
        let fractions = self.acceptance_fraction();
        if fractions.is_empty() {
            return 0.0;
        }
        fractions.iter().sum::<f64>() / fractions.len() as f64
    }

    /// Number of proposals rejected because the model failed or the log-probability was NaN
    pub fn n_failed(&self) -> usize {
        self.n_failed
    }

    /// Sample of the highest log-probability, ties resolve to the earliest
    pub fn max_log_prob_sample(&self) -> Option<(Vec<f64>, f64)> {
        let mut best: Option<((usize, usize), f64)> = None;
        for ((step, walker), &lp) in self.get_log_probs(0).indexed_iter() {
            if lp.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, best_lp)| lp > best_lp) {
                best = Some(((step, walker), lp));
            }
        }
        best.map(|((step, walker), lp)| {
            (self.samples.slice(s![step, walker, ..]).to_vec(), lp)
        })
    }
}
