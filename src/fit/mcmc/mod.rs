mod chain;
pub use chain::PosteriorChain;

mod moves;
pub use moves::{
    DeSnookerMove, DifferentialEvolutionMove, EnsembleMove, EnsembleMoveTrait, StretchMove,
    WeightedMove,
};

mod sampler;
pub use sampler::EnsembleMcmc;
