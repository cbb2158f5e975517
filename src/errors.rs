//! Errors
//!
//! Custom error types used throughout the `orthoml` crate.
use thiserror::Error;

/// Errors that can occur while estimating a double machine learning model.
#[derive(Debug, Error)]
pub enum DmlError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Cross-fitting cannot be disabled for more than two folds.
    #[error("Estimation without cross-fitting not supported for n_folds > 2.")]
    NoCrossFitManyFolds,
    /// Neither drawn nor externally supplied sample splitting.
    #[error("Sample splitting not specified. Either draw samples via .draw_sample_splitting() or set external samples via .set_sample_splitting().")]
    NoSampleSplitting,
    /// An operation requires a fitted model.
    #[error("Apply fit() before {0}().")]
    NotFitted(String),
    /// Joint confidence intervals require a bootstrap distribution.
    #[error("Apply fit() & bootstrap() before confint(joint=true).")]
    NotBootstrapped,
    /// Unsupported configuration.
    #[error("{0}")]
    NotImplemented(String),
    /// An array does not line up with the number of observations.
    #[error("The {0} array has {1} rows, expected {2}.")]
    ShapeMismatch(String, usize, usize),
    /// NaN value found where a complete array was expected.
    #[error("A NaN value was found in {0}; missing values are not supported.")]
    NanValueFound(String),
    /// Interactive models require 0/1 coded treatments and instruments.
    #[error("The variable {0} must be binary with values 0 and 1.")]
    NonBinary(String),
    /// Instrumental variable models require instrument columns.
    #[error("The model requires instruments, but the data contains none.")]
    MissingInstruments,
    /// A nuisance learner was requested under an unknown name.
    #[error("Invalid nuisance learner {0}. Valid nuisance learners: {1}.")]
    UnknownLearner(String, String),
    /// A nuisance learner failed to fit or predict.
    #[error("Nuisance learner {0} failed: {1}")]
    Learner(String, String),
    /// Unable to serialize fitted results.
    #[error("Unable to serialize results: {0}")]
    Serialization(String),
}
