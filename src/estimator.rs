//! Estimator
//!
//! The cross-fitting orchestrator. `DoubleMl` drives repeated sample
//! splitting, per-repetition nuisance estimation and score construction for
//! a model family, solves the moment condition with the DML1 or DML2
//! procedure and combines repetitions through a median-of-means rule.
use crate::crossfit::build_pool;
use crate::data::DmlData;
use crate::errors::DmlError;
use crate::models::DmlModel;
use crate::resampling::{Fold, KFoldResampling, SampleSplit};
use crate::score::ScoreElements;
use crate::utils::{items_to_strings, mean_at, median, quantile};
use log::info;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use std::str::FromStr;

/// How per-fold moment conditions are aggregated into one estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmlProcedure {
    /// Solve the moment condition per fold, then average the fold solutions.
    Dml1,
    /// Pool the score elements across folds, then solve once.
    Dml2,
}

impl FromStr for DmlProcedure {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dml1" => Ok(DmlProcedure::Dml1),
            "dml2" => Ok(DmlProcedure::Dml2),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "dml_procedure".to_string(),
                items_to_strings(vec!["dml1", "dml2"]),
            )),
        }
    }
}

/// Point estimates and standard errors of one `fit()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Final coefficient per treatment variable (median across repetitions).
    pub coef: Vec<f64>,
    /// Final standard error per treatment variable.
    pub se: Vec<f64>,
    /// Per-repetition coefficients, indexed `[i_rep][i_treat]`.
    pub all_coef: Vec<Vec<f64>>,
    /// Per-repetition standard errors, indexed `[i_rep][i_treat]`.
    pub all_se: Vec<Vec<f64>>,
    /// Treatment names used in reported tables.
    pub treatment_names: Vec<String>,
    /// Number of observations the model was fitted on.
    pub n_obs: usize,
}

impl FitResult {
    /// t-statistics `coef / se`.
    pub fn t_stats(&self) -> Vec<f64> {
        self.coef.iter().zip(self.se.iter()).map(|(c, s)| c / s).collect()
    }

    /// Two-sided p-values against the standard normal.
    pub fn pvalues(&self) -> Vec<f64> {
        let normal = Normal::new(0.0, 1.0).unwrap();
        self.t_stats()
            .iter()
            .map(|t| 2.0 * (1.0 - normal.cdf(t.abs())))
            .collect()
    }

    /// Dump the fitted summary as a json object.
    pub fn json_dump(&self) -> Result<String, DmlError> {
        serde_json::to_string(self).map_err(|e| DmlError::Serialization(e.to_string()))
    }
}

/// Multiplier bootstrap distribution of the studentized coefficients,
/// indexed `[i_treat][i_rep * n_rep_boot + b]`. Repetitions are concatenated
/// horizontally, never reduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapDistribution {
    pub boot_coef: Vec<Vec<f64>>,
    pub n_rep_boot: usize,
}

/// Confidence interval table, one row per treatment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfIntTable {
    pub names: Vec<String>,
    pub level: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl fmt::Display for ConfIntTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo_pct = 100.0 * (1.0 - self.level) / 2.0;
        let hi_pct = 100.0 - lo_pct;
        writeln!(f, "{:>12} {:>12.1} % {:>12.1} %", "", lo_pct, hi_pct)?;
        for i in 0..self.names.len() {
            writeln!(f, "{:>12} {:>14.6} {:>14.6}", self.names[i], self.lower[i], self.upper[i])?;
        }
        Ok(())
    }
}

/// Score arrays retained after fitting, indexed `[i_rep][i_treat][i_obs]`.
pub(crate) struct ScoreStore {
    pub psi: Vec<Vec<Vec<f64>>>,
    pub psi_a: Vec<Vec<Vec<f64>>>,
    pub psi_b: Vec<Vec<Vec<f64>>>,
}

/// Double machine learning estimator for a model family.
pub struct DoubleMl<M: DmlModel> {
    pub(crate) model: M,
    pub(crate) resampling: KFoldResampling,
    pub(crate) dml_procedure: DmlProcedure,
    pub(crate) smpls: Option<SampleSplit>,
    pub(crate) scores: Option<ScoreStore>,
    pub(crate) result: Option<FitResult>,
    pub(crate) boot: Option<BootstrapDistribution>,
}

impl<M: DmlModel> DoubleMl<M> {
    /// Create a new estimator.
    ///
    /// * `model` - Model family carrying learners and a score form.
    /// * `n_folds` - Number of folds for cross-fitting.
    /// * `n_rep` - Number of repetitions of the sample splitting.
    /// * `dml_procedure` - Fold aggregation procedure.
    /// * `apply_cross_fitting` - Whether all folds are used; disabling is
    ///   only supported for up to two folds.
    pub fn new(
        model: M,
        n_folds: usize,
        n_rep: usize,
        dml_procedure: DmlProcedure,
        apply_cross_fitting: bool,
    ) -> Result<Self, DmlError> {
        let resampling = KFoldResampling::new(n_folds, n_rep, apply_cross_fitting)?;
        Ok(DoubleMl {
            model,
            resampling,
            dml_procedure,
            smpls: None,
            scores: None,
            result: None,
            boot: None,
        })
    }

    /// Draw the repeated K-fold sample splitting for a dataset of `n_obs`
    /// rows.
    pub fn draw_sample_splitting(&mut self, n_obs: usize, rng: &mut StdRng) {
        self.smpls = Some(self.resampling.split(n_obs, rng));
        self.invalidate();
    }

    /// Draw a stratified sample splitting; `strata` assigns every
    /// observation to a stratum.
    pub fn draw_sample_splitting_stratified(&mut self, strata: &[usize], rng: &mut StdRng) {
        self.smpls = Some(self.resampling.split_stratified(strata, rng));
        self.invalidate();
    }

    /// Use externally supplied sample splitting. The fold and repetition
    /// counts are taken over from the provided split.
    pub fn set_sample_splitting(&mut self, smpls: SampleSplit) -> Result<(), DmlError> {
        if smpls.splits.is_empty() {
            return Err(DmlError::InvalidParameter(
                "smpls".to_string(),
                "at least one repetition".to_string(),
                "an empty split".to_string(),
            ));
        }
        self.resampling.n_rep = smpls.n_rep();
        self.resampling.n_folds = smpls.n_folds();
        self.smpls = Some(smpls);
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.scores = None;
        self.result = None;
        self.boot = None;
    }

    /// The active sample splitting.
    pub fn smpls(&self) -> Result<&SampleSplit, DmlError> {
        self.smpls.as_ref().ok_or(DmlError::NoSampleSplitting)
    }

    /// Fitted results of the last `fit()` call.
    pub fn result(&self) -> Option<&FitResult> {
        self.result.as_ref()
    }

    /// Final coefficients.
    pub fn coef(&self) -> Option<&[f64]> {
        self.result.as_ref().map(|r| r.coef.as_slice())
    }

    /// Final standard errors.
    pub fn se(&self) -> Option<&[f64]> {
        self.result.as_ref().map(|r| r.se.as_slice())
    }

    /// Retained score arrays `psi`, indexed `[i_rep][i_treat][i_obs]`,
    /// evaluated at the repetition's coefficient.
    pub fn psi(&self) -> Option<&Vec<Vec<Vec<f64>>>> {
        self.scores.as_ref().map(|s| &s.psi)
    }

    /// Retained score derivative arrays `psi_a`.
    pub fn psi_a(&self) -> Option<&Vec<Vec<Vec<f64>>>> {
        self.scores.as_ref().map(|s| &s.psi_a)
    }

    /// Retained score constant arrays `psi_b`.
    pub fn psi_b(&self) -> Option<&Vec<Vec<Vec<f64>>>> {
        self.scores.as_ref().map(|s| &s.psi_b)
    }

    /// Bootstrap distribution of the last `bootstrap()` call.
    pub fn boot_coef(&self) -> Option<&Vec<Vec<f64>>> {
        self.boot.as_ref().map(|b| &b.boot_coef)
    }

    /// Estimate the causal parameters.
    ///
    /// * `data` - The dataset; its row count must match the drawn splitting.
    /// * `n_jobs_cv` - Fold-level parallelism; `None` uses all cores.
    /// * `keep_scores` - Whether the psi arrays are retained. Dropping them
    ///   saves memory but makes `bootstrap()` unavailable.
    pub fn fit(
        &mut self,
        data: &DmlData,
        n_jobs_cv: Option<usize>,
        keep_scores: bool,
    ) -> Result<&FitResult, DmlError> {
        let pool = build_pool(n_jobs_cv)?;
        let smpls = self.smpls.as_ref().ok_or(DmlError::NoSampleSplitting)?;
        smpls.validate(data.n_obs(), self.resampling.apply_cross_fitting)?;
        self.model.check_data(data)?;

        let n_rep = smpls.n_rep();
        let n_treat = data.n_treat();
        let mut all_coef = vec![vec![0.0_f64; n_treat]; n_rep];
        let mut all_se = vec![vec![0.0_f64; n_treat]; n_rep];
        let mut store = ScoreStore {
            psi: Vec::with_capacity(n_rep),
            psi_a: Vec::with_capacity(n_rep),
            psi_b: Vec::with_capacity(n_rep),
        };

        for i_rep in 0..n_rep {
            let folds = &smpls.splits[i_rep];
            let covered = smpls.covered(i_rep);
            let mut rep_psi = Vec::with_capacity(n_treat);
            let mut rep_psi_a = Vec::with_capacity(n_treat);
            let mut rep_psi_b = Vec::with_capacity(n_treat);
            for i_treat in 0..n_treat {
                let nuisance = self.model.fit_nuisance(data, i_treat, folds, &pool)?;
                let elements = self.model.score_elements(data, i_treat, &nuisance, folds)?;
                let (theta, se) = match self.dml_procedure {
                    DmlProcedure::Dml1 => est_dml1(&elements, folds, &covered),
                    DmlProcedure::Dml2 => est_dml2(&elements, &covered),
                };
                all_coef[i_rep][i_treat] = theta;
                all_se[i_rep][i_treat] = se;
                rep_psi.push(elements.psi(theta));
                rep_psi_a.push(elements.psi_a);
                rep_psi_b.push(elements.psi_b);
            }
            store.psi.push(rep_psi);
            store.psi_a.push(rep_psi_a);
            store.psi_b.push(rep_psi_b);
            info!("Finished repetition {}/{}.", i_rep + 1, n_rep);
        }

        let mut coef = Vec::with_capacity(n_treat);
        let mut se = Vec::with_capacity(n_treat);
        for i_treat in 0..n_treat {
            let thetas: Vec<f64> = (0..n_rep).map(|r| all_coef[r][i_treat]).collect();
            let theta_med = median(&thetas);
            // Individual terms may go negative; only the median across
            // repetitions is required to stabilize, so no clipping here.
            let terms: Vec<f64> = (0..n_rep)
                .map(|r| all_se[r][i_treat].powi(2) - (all_coef[r][i_treat] - theta_med).powi(2))
                .collect();
            coef.push(theta_med);
            se.push(median(&terms).sqrt());
        }

        self.scores = if keep_scores { Some(store) } else { None };
        self.boot = None;
        let result = FitResult {
            coef,
            se,
            all_coef,
            all_se,
            treatment_names: data.treatment_names().to_vec(),
            n_obs: data.n_obs(),
        };
        Ok(&*self.result.insert(result))
    }

    /// Confidence intervals for the fitted coefficients.
    ///
    /// * `joint` - Simultaneous bands over all treatments via the
    ///   bootstrapped max-statistic; requires `bootstrap()`.
    /// * `level` - Confidence level in (0, 1).
    pub fn confint(&self, joint: bool, level: f64) -> Result<ConfIntTable, DmlError> {
        if !(level > 0.0 && level < 1.0) {
            return Err(DmlError::InvalidParameter(
                "level".to_string(),
                "a value in (0, 1)".to_string(),
                level.to_string(),
            ));
        }
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("confint".to_string()))?;
        let (lower, upper) = if joint {
            let boot = self.boot.as_ref().ok_or(DmlError::NotBootstrapped)?;
            let n_draws = boot.boot_coef[0].len();
            let sim: Vec<f64> = (0..n_draws)
                .map(|b| {
                    boot.boot_coef
                        .iter()
                        .map(|row| row[b].abs())
                        .fold(f64::NEG_INFINITY, f64::max)
                })
                .collect();
            let hatc = quantile(&sim, level);
            interval(&result.coef, &result.se, hatc)
        } else {
            let normal = Normal::new(0.0, 1.0).unwrap();
            let q = normal.inverse_cdf(0.5 + level / 2.0);
            interval(&result.coef, &result.se, q)
        };
        Ok(ConfIntTable {
            names: result.treatment_names.clone(),
            level,
            lower,
            upper,
        })
    }
}

fn interval(coef: &[f64], se: &[f64], crit: f64) -> (Vec<f64>, Vec<f64>) {
    let lower = coef.iter().zip(se.iter()).map(|(c, s)| c - crit * s).collect();
    let upper = coef.iter().zip(se.iter()).map(|(c, s)| c + crit * s).collect();
    (lower, upper)
}

/// DML1: solve the moment condition per fold and average; the variance is
/// estimated per fold at the averaged coefficient and then averaged.
fn est_dml1(elements: &ScoreElements, folds: &[Fold], covered: &[usize]) -> (f64, f64) {
    let mut thetas = Vec::with_capacity(folds.len());
    for (_, test) in folds {
        let ma = mean_at(&elements.psi_a, test);
        let mb = mean_at(&elements.psi_b, test);
        thetas.push(-mb / ma);
    }
    let theta = thetas.iter().sum::<f64>() / thetas.len() as f64;
    let n = covered.len() as f64;
    let mut vars = Vec::with_capacity(folds.len());
    for (_, test) in folds {
        let ma = mean_at(&elements.psi_a, test);
        let psi_sq = test
            .iter()
            .map(|&i| {
                let p = elements.psi_a[i] * theta + elements.psi_b[i];
                p * p
            })
            .sum::<f64>()
            / test.len() as f64;
        vars.push(psi_sq / (ma * ma) / n);
    }
    let sigma2 = vars.iter().sum::<f64>() / vars.len() as f64;
    (theta, sigma2.sqrt())
}

/// DML2: pool the score elements across folds and solve once.
fn est_dml2(elements: &ScoreElements, covered: &[usize]) -> (f64, f64) {
    let ma = mean_at(&elements.psi_a, covered);
    let mb = mean_at(&elements.psi_b, covered);
    let theta = -mb / ma;
    let n = covered.len() as f64;
    let psi_sq = covered
        .iter()
        .map(|&i| {
            let p = elements.psi_a[i] * theta + elements.psi_b[i];
            p * p
        })
        .sum::<f64>()
        / n;
    let sigma2 = psi_sq / (ma * ma) / n;
    (theta, sigma2.sqrt())
}
