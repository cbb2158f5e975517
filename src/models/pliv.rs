//! Partially Linear IV Regression (PLIV)
//!
//! $$Y = D \theta + g(X) + \zeta, \qquad Z = m(X) + V$$
//!
//! Endogenous treatment with instruments. Three variants differ in what is
//! partialled out:
//!
//! * `Pliv` (partialX) — residualizes Y, D and every instrument on X; with
//!   several instruments the treatment residual is projected on the
//!   instrument residuals in a first stage.
//! * `PlivPartialZ` — projects the treatment on `[X | Z]` directly.
//! * `PlivPartialXZ` — combines both projections.
use crate::crossfit::{cross_fit_regressor, scatter, NuisanceEstimate};
use crate::data::{DmlData, Matrix};
use crate::errors::DmlError;
use crate::learner::Regressor;
use crate::models::DmlModel;
use crate::resampling::Fold;
use crate::score::{PlivScore, ScoreElements};
use crate::utils::{gather, least_squares};
use rayon::prelude::*;

/// Partially linear IV model, partialX variant.
pub struct Pliv<G, M, R> {
    /// Learner for the outcome regression E[Y|X].
    pub ml_g: G,
    /// Learner for the instrument regressions E[Z_j|X].
    pub ml_m: M,
    /// Learner for the treatment regression E[D|X].
    pub ml_r: R,
    /// Score form.
    pub score: PlivScore,
}

impl<G, M, R> Pliv<G, M, R> {
    pub fn new(ml_g: G, ml_m: M, ml_r: R, score: PlivScore) -> Self {
        Pliv { ml_g, ml_m, ml_r, score }
    }
}

fn instrument_name(n_instr: usize, j: usize) -> String {
    if n_instr == 1 {
        "ml_m".to_string()
    } else {
        format!("ml_m_{}", j + 1)
    }
}

impl<G: Regressor, M: Regressor, R: Regressor> DmlModel for Pliv<G, M, R> {
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError> {
        data.instruments_required().map(|_| ())
    }

    fn fit_nuisance(
        &self,
        data: &DmlData,
        i_treat: usize,
        smpls: &[Fold],
        pool: &rayon::ThreadPool,
    ) -> Result<NuisanceEstimate, DmlError> {
        let x = data.covariates();
        let z = data.instruments_required()?;
        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_g",
            cross_fit_regressor(&self.ml_g, x, data.outcome(), smpls, None, pool, "ml_g")?,
        );
        for j in 0..z.cols {
            let name = instrument_name(z.cols, j);
            nuisance.insert(
                &name,
                cross_fit_regressor(&self.ml_m, x, z.get_col(j), smpls, None, pool, &name)?,
            );
        }
        nuisance.insert(
            "ml_r",
            cross_fit_regressor(&self.ml_r, x, data.treatment(i_treat), smpls, None, pool, "ml_r")?,
        );
        Ok(nuisance)
    }

    fn score_elements(
        &self,
        data: &DmlData,
        i_treat: usize,
        nuisance: &NuisanceEstimate,
        smpls: &[Fold],
    ) -> Result<ScoreElements, DmlError> {
        let y = data.outcome();
        let d = data.treatment(i_treat);
        let z = data.instruments_required()?;
        let n = data.n_obs();

        if let PlivScore::Custom(score_fn) = &self.score {
            if z.cols > 1 {
                return Err(DmlError::NotImplemented(
                    "Callable score not implemented for Pliv.partialX with several instruments.".to_string(),
                ));
            }
            let (psi_a, psi_b) = score_fn.elements(y, d, data.covariates(), nuisance, smpls);
            return ScoreElements { psi_a, psi_b }.check_len(n);
        }

        let g_hat = nuisance.get("ml_g")?;
        let r_hat = nuisance.get("ml_r")?;
        let u_hat: Vec<f64> = (0..n).map(|i| y[i] - g_hat[i]).collect();
        let w_hat: Vec<f64> = (0..n).map(|i| d[i] - r_hat[i]).collect();

        let v_tilde = if z.cols == 1 {
            let m_hat = nuisance.get("ml_m")?;
            (0..n).map(|i| z.get_col(0)[i] - m_hat[i]).collect::<Vec<f64>>()
        } else {
            // First stage: project the treatment residual on the instrument
            // residuals over the covered rows.
            let mut residuals: Vec<Vec<f64>> = Vec::with_capacity(z.cols);
            for j in 0..z.cols {
                let m_hat = nuisance.get(&instrument_name(z.cols, j))?;
                residuals.push((0..n).map(|i| z.get_col(j)[i] - m_hat[i]).collect());
            }
            let rows: Vec<usize> = (0..n).filter(|&i| !w_hat[i].is_nan()).collect();
            let design: Vec<Vec<f64>> = residuals.iter().map(|r| gather(r, &rows)).collect();
            let beta = least_squares(&design, &gather(&w_hat, &rows))?;
            (0..n)
                .map(|i| residuals.iter().zip(beta.iter()).map(|(r, b)| r[i] * b).sum())
                .collect()
        };

        let psi_a: Vec<f64> = (0..n).map(|i| -v_tilde[i] * w_hat[i]).collect();
        let psi_b: Vec<f64> = (0..n).map(|i| v_tilde[i] * u_hat[i]).collect();
        Ok(ScoreElements { psi_a, psi_b })
    }
}

/// Partially linear IV model, partialZ variant. A single learner projects
/// the treatment on covariates and instruments jointly.
pub struct PlivPartialZ<R> {
    /// Learner for the treatment projection E[D|X,Z].
    pub ml_r: R,
    /// Score form.
    pub score: PlivScore,
}

impl<R> PlivPartialZ<R> {
    pub fn new(ml_r: R, score: PlivScore) -> Self {
        PlivPartialZ { ml_r, score }
    }
}

impl<R: Regressor> DmlModel for PlivPartialZ<R> {
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError> {
        data.instruments_required().map(|_| ())
    }

    fn fit_nuisance(
        &self,
        data: &DmlData,
        i_treat: usize,
        smpls: &[Fold],
        pool: &rayon::ThreadPool,
    ) -> Result<NuisanceEstimate, DmlError> {
        let x = data.covariates();
        let z = data.instruments_required()?;
        let xz_buf = x.hstack(z);
        let xz = Matrix::new(&xz_buf, data.n_obs(), x.cols + z.cols);
        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_r",
            cross_fit_regressor(&self.ml_r, &xz, data.treatment(i_treat), smpls, None, pool, "ml_r")?,
        );
        Ok(nuisance)
    }

    fn score_elements(
        &self,
        data: &DmlData,
        i_treat: usize,
        nuisance: &NuisanceEstimate,
        _smpls: &[Fold],
    ) -> Result<ScoreElements, DmlError> {
        if matches!(self.score, PlivScore::Custom(_)) {
            return Err(DmlError::NotImplemented(
                "Callable score not implemented for Pliv.partialZ.".to_string(),
            ));
        }
        let y = data.outcome();
        let d = data.treatment(i_treat);
        let r_hat = nuisance.get("ml_r")?;
        let n = data.n_obs();
        let psi_a: Vec<f64> = (0..n).map(|i| -r_hat[i] * d[i]).collect();
        let psi_b: Vec<f64> = (0..n).map(|i| r_hat[i] * y[i]).collect();
        Ok(ScoreElements { psi_a, psi_b })
    }
}

/// Partially linear IV model, partialXZ variant. The treatment projection
/// E[D|X,Z] is itself projected back on X; the difference between the two
/// acts as the instrument.
pub struct PlivPartialXZ<G, M, R> {
    /// Learner for the outcome regression E[Y|X].
    pub ml_g: G,
    /// Learner for the treatment projection E[D|X,Z].
    pub ml_m: M,
    /// Learner for the second-stage projection of E[D|X,Z] on X.
    pub ml_r: R,
    /// Score form.
    pub score: PlivScore,
}

impl<G, M, R> PlivPartialXZ<G, M, R> {
    pub fn new(ml_g: G, ml_m: M, ml_r: R, score: PlivScore) -> Self {
        PlivPartialXZ { ml_g, ml_m, ml_r, score }
    }
}

impl<G: Regressor, M: Regressor, R: Regressor> DmlModel for PlivPartialXZ<G, M, R> {
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError> {
        data.instruments_required().map(|_| ())
    }

    fn fit_nuisance(
        &self,
        data: &DmlData,
        i_treat: usize,
        smpls: &[Fold],
        pool: &rayon::ThreadPool,
    ) -> Result<NuisanceEstimate, DmlError> {
        let x = data.covariates();
        let z = data.instruments_required()?;
        let d = data.treatment(i_treat);
        let n = data.n_obs();
        let xz_buf = x.hstack(z);
        let xz = Matrix::new(&xz_buf, n, x.cols + z.cols);

        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_g",
            cross_fit_regressor(&self.ml_g, x, data.outcome(), smpls, None, pool, "ml_g")?,
        );

        // The second stage regresses the first-stage fitted values on X, so
        // both stages run inside the same fold to stay out-of-fold overall.
        let fold_preds = pool.install(|| {
            smpls
                .par_iter()
                .map(|(train, test)| {
                    let xz_train_buf = xz.take_rows(train);
                    let xz_train = Matrix::new(&xz_train_buf, train.len(), xz.cols);
                    let mut ml_m = self.ml_m.clone();
                    ml_m.fit(&xz_train, &gather(d, train))
                        .map_err(|e| DmlError::Learner("ml_m".to_string(), e.to_string()))?;
                    let xz_test_buf = xz.take_rows(test);
                    let xz_test = Matrix::new(&xz_test_buf, test.len(), xz.cols);
                    let m_hat_test = ml_m
                        .predict(&xz_test)
                        .map_err(|e| DmlError::Learner("ml_m".to_string(), e.to_string()))?;
                    let m_hat_train = ml_m
                        .predict(&xz_train)
                        .map_err(|e| DmlError::Learner("ml_m".to_string(), e.to_string()))?;

                    let x_train_buf = x.take_rows(train);
                    let x_train = Matrix::new(&x_train_buf, train.len(), x.cols);
                    let mut ml_r = self.ml_r.clone();
                    ml_r.fit(&x_train, &m_hat_train)
                        .map_err(|e| DmlError::Learner("ml_r".to_string(), e.to_string()))?;
                    let x_test_buf = x.take_rows(test);
                    let x_test = Matrix::new(&x_test_buf, test.len(), x.cols);
                    let r_hat_test = ml_r
                        .predict(&x_test)
                        .map_err(|e| DmlError::Learner("ml_r".to_string(), e.to_string()))?;
                    Ok((test.clone(), m_hat_test, r_hat_test))
                })
                .collect::<Result<Vec<_>, DmlError>>()
        })?;

        let m_folds: Vec<(Vec<usize>, Vec<f64>)> =
            fold_preds.iter().map(|(t, m, _)| (t.clone(), m.clone())).collect();
        let r_folds: Vec<(Vec<usize>, Vec<f64>)> =
            fold_preds.into_iter().map(|(t, _, r)| (t, r)).collect();
        nuisance.insert("ml_m", scatter(n, m_folds));
        nuisance.insert("ml_r", scatter(n, r_folds));
        Ok(nuisance)
    }

    fn score_elements(
        &self,
        data: &DmlData,
        i_treat: usize,
        nuisance: &NuisanceEstimate,
        _smpls: &[Fold],
    ) -> Result<ScoreElements, DmlError> {
        if matches!(self.score, PlivScore::Custom(_)) {
            return Err(DmlError::NotImplemented(
                "Callable score not implemented for Pliv.partialXZ.".to_string(),
            ));
        }
        let y = data.outcome();
        let d = data.treatment(i_treat);
        let g_hat = nuisance.get("ml_g")?;
        let m_hat = nuisance.get("ml_m")?;
        let r_hat = nuisance.get("ml_r")?;
        let n = data.n_obs();
        let mut psi_a = Vec::with_capacity(n);
        let mut psi_b = Vec::with_capacity(n);
        for i in 0..n {
            let u = y[i] - g_hat[i];
            let w = d[i] - r_hat[i];
            let v = m_hat[i] - r_hat[i];
            psi_a.push(-v * w);
            psi_b.push(v * u);
        }
        Ok(ScoreElements { psi_a, psi_b })
    }
}
