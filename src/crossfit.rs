//! Cross-fitting
//!
//! Out-of-fold nuisance estimation: for every fold a fresh clone of the
//! learner prototype is fitted on the train indices and queried on the held
//! out test indices. Fold fits are independent and run on a rayon pool.
use crate::data::Matrix;
use crate::errors::DmlError;
use crate::learner::{Classifier, Regressor};
use crate::resampling::Fold;
use crate::utils::gather;
use hashbrown::HashMap;
use rayon::prelude::*;

/// Out-of-fold nuisance predictions for one repetition, keyed by learner
/// name. Every array is aligned to observation position; rows not covered by
/// any test fold hold NaN.
pub struct NuisanceEstimate {
    predictions: HashMap<String, Vec<f64>>,
}

impl NuisanceEstimate {
    pub fn new() -> Self {
        NuisanceEstimate {
            predictions: HashMap::new(),
        }
    }

    /// Store the prediction array of one nuisance learner.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        self.predictions.insert(name.to_string(), values);
    }

    /// Look up a nuisance prediction array by learner name.
    pub fn get(&self, name: &str) -> Result<&[f64], DmlError> {
        self.predictions.get(name).map(|v| v.as_slice()).ok_or_else(|| {
            let mut known: Vec<&str> = self.predictions.keys().map(|k| k.as_str()).collect();
            known.sort_unstable();
            DmlError::UnknownLearner(name.to_string(), known.join(", "))
        })
    }

    /// Names of the stored nuisance learners.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predictions.keys().map(|k| k.as_str())
    }
}

impl Default for NuisanceEstimate {
    fn default() -> Self {
        Self::new()
    }
}

/// Scatter per-fold test predictions into a full-length array.
pub(crate) fn scatter(n_obs: usize, fold_preds: Vec<(Vec<usize>, Vec<f64>)>) -> Vec<f64> {
    let mut out = vec![f64::NAN; n_obs];
    for (test, preds) in fold_preds {
        for (k, &i) in test.iter().enumerate() {
            out[i] = preds[k];
        }
    }
    out
}

fn train_rows(train: &[usize], train_filter: Option<&[bool]>) -> Vec<usize> {
    match train_filter {
        Some(mask) => train.iter().copied().filter(|&i| mask[i]).collect(),
        None => train.to_vec(),
    }
}

/// Cross-fit a regression nuisance.
///
/// * `prototype` - Learner prototype, cloned per fold.
/// * `x` - Design matrix for the nuisance.
/// * `target` - Regression target.
/// * `smpls` - Fold pairs of one repetition.
/// * `train_filter` - Optional row mask restricting the training rows of
///   every fold (used for per-arm outcome regressions).
/// * `name` - Learner name used in error reports.
pub fn cross_fit_regressor<L: Regressor>(
    prototype: &L,
    x: &Matrix<f64>,
    target: &[f64],
    smpls: &[Fold],
    train_filter: Option<&[bool]>,
    pool: &rayon::ThreadPool,
    name: &str,
) -> Result<Vec<f64>, DmlError> {
    let fold_preds = pool.install(|| {
        smpls
            .par_iter()
            .map(|(train, test)| {
                let rows = train_rows(train, train_filter);
                let x_train_buf = x.take_rows(&rows);
                let x_train = Matrix::new(&x_train_buf, rows.len(), x.cols);
                let y_train = gather(target, &rows);
                let mut learner = prototype.clone();
                learner
                    .fit(&x_train, &y_train)
                    .map_err(|e| DmlError::Learner(name.to_string(), e.to_string()))?;
                let x_test_buf = x.take_rows(test);
                let x_test = Matrix::new(&x_test_buf, test.len(), x.cols);
                let preds = learner
                    .predict(&x_test)
                    .map_err(|e| DmlError::Learner(name.to_string(), e.to_string()))?;
                Ok((test.clone(), preds))
            })
            .collect::<Result<Vec<_>, DmlError>>()
    })?;
    Ok(scatter(target.len(), fold_preds))
}

/// Cross-fit a classification nuisance, producing out-of-fold `P(label = 1)`.
pub fn cross_fit_classifier<C: Classifier>(
    prototype: &C,
    x: &Matrix<f64>,
    target: &[f64],
    smpls: &[Fold],
    train_filter: Option<&[bool]>,
    pool: &rayon::ThreadPool,
    name: &str,
) -> Result<Vec<f64>, DmlError> {
    let fold_preds = pool.install(|| {
        smpls
            .par_iter()
            .map(|(train, test)| {
                let rows = train_rows(train, train_filter);
                let x_train_buf = x.take_rows(&rows);
                let x_train = Matrix::new(&x_train_buf, rows.len(), x.cols);
                let y_train = gather(target, &rows);
                let mut learner = prototype.clone();
                learner
                    .fit(&x_train, &y_train)
                    .map_err(|e| DmlError::Learner(name.to_string(), e.to_string()))?;
                let x_test_buf = x.take_rows(test);
                let x_test = Matrix::new(&x_test_buf, test.len(), x.cols);
                let preds = learner
                    .predict_proba(&x_test)
                    .map_err(|e| DmlError::Learner(name.to_string(), e.to_string()))?;
                Ok((test.clone(), preds))
            })
            .collect::<Result<Vec<_>, DmlError>>()
    })?;
    Ok(scatter(target.len(), fold_preds))
}

/// Build the rayon pool bounding fold-level parallelism. `None` uses all
/// available cores, matching sequential execution with `Some(1)`.
pub(crate) fn build_pool(n_jobs_cv: Option<usize>) -> Result<rayon::ThreadPool, DmlError> {
    if n_jobs_cv == Some(0) {
        return Err(DmlError::InvalidParameter(
            "n_jobs_cv".to_string(),
            "a positive integer or None".to_string(),
            "0".to_string(),
        ));
    }
    let num_threads = match n_jobs_cv {
        Some(n) => n,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap())
}
