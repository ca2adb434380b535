pub(crate) mod bounds;

mod grid;
pub use grid::{GridResult, GridSearch};

mod loss;
pub use loss::LossFunction;

pub mod mcmc;
pub use mcmc::{EnsembleMcmc, EnsembleMove, PosteriorChain};

mod trust_region;
pub use trust_region::{ConvergenceStatus, TerminationReason, TrustRegionFit, TrustRegionResult};
