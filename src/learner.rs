//! Learner interface
//!
//! Nuisance functions are estimated by pluggable learners. The crate treats
//! them as opaque capabilities: anything that can be cloned into a fresh
//! instance, fitted on a training design and queried for predictions works.
//! Regression nuisances implement [`Regressor`], propensity-type nuisances
//! implement [`Classifier`].
use crate::data::Matrix;
use crate::errors::DmlError;

/// A regression learner for conditional mean nuisances.
///
/// A fresh clone is fitted per fold, so no state leaks across folds.
pub trait Regressor: Clone + Send + Sync {
    /// Fit the learner on the given training design.
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), DmlError>;
    /// Predict conditional means for the given rows.
    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError>;
}

/// A classification learner for propensity-type nuisances.
pub trait Classifier: Clone + Send + Sync {
    /// Fit the learner on the given training design with 0/1 labels.
    fn fit(&mut self, x: &Matrix<f64>, y: &[f64]) -> Result<(), DmlError>;
    /// Predict `P(label = 1)` for the given rows.
    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError>;
}
