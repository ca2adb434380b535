use crate::parameters::PhysicalParameter;

/// Problem with the requested fit detected at setup, before any model evaluation
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("no parameter is set to be fit")]
    NoFitParameters,

    #[error(
        "{observed} data points are not enough to fit {fit} parameters, need at least {}",
        .fit + 1
    )]
    Underdetermined { observed: usize, fit: usize },

    #[error("the line at {frequency} GHz does not match any frequency of the molecular line list")]
    UnmatchedFrequency { frequency: f64 },

    #[error("the lines at {first} and {second} GHz match the same line of the molecular line list")]
    DuplicateMatch { first: f64, second: f64 },

    #[error("parameter {parameter} is fixed but has no value")]
    MissingValue { parameter: PhysicalParameter },

    #[error("parameter {parameter} is specified more than once")]
    DuplicateParameter { parameter: PhysicalParameter },

    #[error("observed spectrum contains no lines")]
    EmptySpectrum,

    #[error("observed spectrum arrays have different lengths: {0}")]
    LengthMismatch(&'static str),

    #[error("intensity {value} of line {index} is not finite")]
    NonFiniteIntensity { index: usize, value: f64 },

    #[error("uncertainty {value} of line {index} must be finite and positive")]
    InvalidUncertainty { index: usize, value: f64 },

    #[error("invalid intensity unit code {0:?}, expected 1 (T_R), 2 (K km/s) or 3 (erg/cm2/s)")]
    InvalidUnitCode(String),

    #[error("line {line}: {columns} columns found, expected 2 or 3")]
    InvalidColumnCount { line: usize, columns: usize },

    #[error("line {line}: cannot parse {value:?} as a number")]
    ParseFloat { line: usize, value: String },

    #[error("no radiative transition table found in the molecular line list")]
    MissingTransitionTable,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Value outside of the forward model operating range or inconsistent bounds
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BoundsError {
    #[error("{parameter} = {value} is not within the limits of ({min}; {max})")]
    OutOfRange {
        parameter: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("the minimum {parameter} {min} is greater than the maximum {max}")]
    MinExceedsMax {
        parameter: String,
        min: f64,
        max: f64,
    },
}

/// Failure of a single forward model evaluation
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ModelEvaluationError {
    #[error("forward model failed: {0}")]
    Failed(String),

    #[error("forward model returned {actual} lines, the line list has {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("forward model returned a non-finite intensity for matched line {index}")]
    NonFinite { index: usize },

    #[error("log-probability is NaN")]
    NanLogProbability,
}

/// Error returned from [crate::Pipeline]
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Model(#[from] ModelEvaluationError),

    #[error("none of the {points} grid points produced a finite chi-squared")]
    NoFiniteGridPoint { points: usize },

    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
