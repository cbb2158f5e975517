//! Resampling
//!
//! Repeated K-fold sample splitting for cross-fitted estimation, with an
//! optional stratified mode and a degenerate single-split mode for
//! estimation without cross-fitting.
use crate::errors::DmlError;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A `(train_indices, test_indices)` pair.
pub type Fold = (Vec<usize>, Vec<usize>);

/// Sample splitting for all repetitions: `splits[i_rep]` holds the fold
/// pairs of repetition `i_rep`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SampleSplit {
    pub splits: Vec<Vec<Fold>>,
}

impl SampleSplit {
    /// Number of repetitions.
    pub fn n_rep(&self) -> usize {
        self.splits.len()
    }

    /// Number of folds within each repetition.
    pub fn n_folds(&self) -> usize {
        self.splits.first().map(|s| s.len()).unwrap_or(0)
    }

    /// Check the split against a dataset of `n_obs` rows. With cross-fitting
    /// the test sets of every repetition must partition `0..n_obs` exactly;
    /// without it a single fold pair per repetition is expected.
    pub fn validate(&self, n_obs: usize, apply_cross_fitting: bool) -> Result<(), DmlError> {
        if self.splits.is_empty() {
            return Err(DmlError::InvalidParameter(
                "smpls".to_string(),
                "at least one repetition".to_string(),
                "an empty split".to_string(),
            ));
        }
        for rep in &self.splits {
            let mut seen = vec![false; n_obs];
            let mut n_test = 0;
            for (train, test) in rep {
                for &i in train.iter().chain(test.iter()) {
                    if i >= n_obs {
                        return Err(DmlError::InvalidParameter(
                            "smpls".to_string(),
                            format!("indices below {}", n_obs),
                            i.to_string(),
                        ));
                    }
                }
                for &i in test {
                    if seen[i] && rep.len() > 1 {
                        return Err(DmlError::InvalidParameter(
                            "smpls".to_string(),
                            "disjoint test sets".to_string(),
                            format!("index {} in several test sets", i),
                        ));
                    }
                    seen[i] = true;
                    n_test += 1;
                }
            }
            if apply_cross_fitting && rep.len() > 1 && n_test != n_obs {
                return Err(DmlError::InvalidParameter(
                    "smpls".to_string(),
                    format!("test sets partitioning all {} observations", n_obs),
                    format!("{} tested observations", n_test),
                ));
            }
        }
        Ok(())
    }

    /// Observation indices covered by the test folds of one repetition,
    /// in increasing order.
    pub(crate) fn covered(&self, i_rep: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = self.splits[i_rep].iter().flat_map(|(_, test)| test.iter().copied()).collect();
        idx.sort_unstable();
        idx.dedup();
        idx
    }
}

/// Repeated K-fold resampling.
pub struct KFoldResampling {
    pub n_folds: usize,
    pub n_rep: usize,
    pub apply_cross_fitting: bool,
}

impl KFoldResampling {
    /// Create a resampling scheme, validating the fold and repetition counts.
    pub fn new(n_folds: usize, n_rep: usize, apply_cross_fitting: bool) -> Result<Self, DmlError> {
        if n_folds == 0 {
            return Err(DmlError::InvalidParameter(
                "n_folds".to_string(),
                "a positive integer".to_string(),
                "0".to_string(),
            ));
        }
        if n_rep == 0 {
            return Err(DmlError::InvalidParameter(
                "n_rep".to_string(),
                "a positive integer".to_string(),
                "0".to_string(),
            ));
        }
        if !apply_cross_fitting && n_folds > 2 {
            return Err(DmlError::NoCrossFitManyFolds);
        }
        if n_folds == 1 {
            warn!("Cross-fitting is not supported for n_folds = 1; nuisances are fitted in-sample.");
        }
        Ok(KFoldResampling {
            n_folds,
            n_rep,
            apply_cross_fitting,
        })
    }

    /// Draw `n_rep` independent shuffled K-fold partitions of `0..n_obs`.
    pub fn split(&self, n_obs: usize, rng: &mut StdRng) -> SampleSplit {
        let mut splits = Vec::with_capacity(self.n_rep);
        for _ in 0..self.n_rep {
            let mut indices: Vec<usize> = (0..n_obs).collect();
            indices.shuffle(rng);
            splits.push(self.folds_from(&indices, n_obs));
        }
        SampleSplit { splits }
    }

    /// Draw stratified partitions: every stratum is shuffled and dealt
    /// round-robin across the folds, so each fold approximates the global
    /// stratum shares.
    pub fn split_stratified(&self, strata: &[usize], rng: &mut StdRng) -> SampleSplit {
        let n_obs = strata.len();
        let n_strata = strata.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut splits = Vec::with_capacity(self.n_rep);
        for _ in 0..self.n_rep {
            let mut dealt: Vec<usize> = Vec::with_capacity(n_obs);
            for s in 0..n_strata {
                let mut members: Vec<usize> = (0..n_obs).filter(|&i| strata[i] == s).collect();
                members.shuffle(rng);
                dealt.extend(members);
            }
            // Dealing the concatenated strata round-robin keeps the folds balanced.
            let mut fold_tests: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];
            for (pos, &i) in dealt.iter().enumerate() {
                fold_tests[pos % self.n_folds].push(i);
            }
            splits.push(self.folds_from_tests(fold_tests, n_obs));
        }
        SampleSplit { splits }
    }

    fn folds_from(&self, shuffled: &[usize], n_obs: usize) -> Vec<Fold> {
        if self.n_folds == 1 {
            let all: Vec<usize> = (0..n_obs).collect();
            return vec![(all.clone(), all)];
        }
        // Balanced chunk sizes: the first n_obs % n_folds folds get one extra.
        let base = n_obs / self.n_folds;
        let extra = n_obs % self.n_folds;
        let mut tests = Vec::with_capacity(self.n_folds);
        let mut start = 0;
        for k in 0..self.n_folds {
            let size = base + usize::from(k < extra);
            tests.push(shuffled[start..start + size].to_vec());
            start += size;
        }
        self.folds_from_tests(tests, n_obs)
    }

    fn folds_from_tests(&self, tests: Vec<Vec<usize>>, n_obs: usize) -> Vec<Fold> {
        if self.n_folds == 1 {
            let all: Vec<usize> = (0..n_obs).collect();
            return vec![(all.clone(), all)];
        }
        let mut folds = Vec::with_capacity(self.n_folds);
        for test in tests {
            let mut in_test = vec![false; n_obs];
            for &i in &test {
                in_test[i] = true;
            }
            let train: Vec<usize> = (0..n_obs).filter(|&i| !in_test[i]).collect();
            folds.push((train, test));
        }
        if !self.apply_cross_fitting {
            folds.truncate(1);
        }
        folds
    }
}
