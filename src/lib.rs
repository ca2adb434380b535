#![doc = include_str!("../README.md")]


mod data;
pub use data::{IntensityUnit, LineCatalogue, LineMatchMask, ObservedSpectrum};

mod error;
pub use error::{BoundsError, ConfigurationError, ModelEvaluationError, PipelineError};

pub mod fit;
pub use fit::{
    ConvergenceStatus, EnsembleMcmc, EnsembleMove, GridResult, GridSearch, LossFunction,
    PosteriorChain, TerminationReason, TrustRegionFit, TrustRegionResult,
};

mod model;
pub use model::{ForwardModel, LineIntensities, ModelAdapter, ModelLine, ModelOutput};

mod objective;
pub use objective::Objective;

mod parameters;
pub use parameters::{
    AxisSpacing, CollisionPartner, FitConfiguration, FitParameter, FixedParameters, Geometry,
    ModelParameters, ModelValue, OperatingRange, ParameterSpec, PhysicalParameter,
};

mod pipeline;
pub use pipeline::{Pipeline, PipelineConfig, PipelineResult, PointEstimate, StageTiming};

mod summary;
pub use summary::{ParameterSummary, PosteriorSummary};

pub use ndarray;
