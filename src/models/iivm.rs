//! Interactive IV Model (IIVM)
//!
//! $$Y = g(D, X) + U, \qquad D = r(Z, X) + V, \qquad D, Z \in \{0, 1\}$$
//!
//! Binary treatment with a single binary instrument. Outcome and treatment
//! regressions are fitted separately per instrument arm; the instrument
//! propensity comes from a classification learner. The built-in score
//! estimates the local average treatment effect.
use crate::crossfit::{cross_fit_classifier, cross_fit_regressor, NuisanceEstimate};
use crate::data::{check_binary, DmlData};
use crate::errors::DmlError;
use crate::learner::{Classifier, Regressor};
use crate::models::DmlModel;
use crate::resampling::Fold;
use crate::score::{IivmScore, ScoreElements};

/// Interactive IV model.
pub struct Iivm<G, M, R> {
    /// Learner for the per-arm outcome regressions E[Y|X, Z=z].
    pub ml_g: G,
    /// Learner for the instrument propensity P[Z=1|X].
    pub ml_m: M,
    /// Learner for the per-arm treatment propensities P[D=1|X, Z=z].
    pub ml_r: R,
    /// Score form.
    pub score: IivmScore,
}

impl<G, M, R> Iivm<G, M, R> {
    pub fn new(ml_g: G, ml_m: M, ml_r: R, score: IivmScore) -> Self {
        Iivm { ml_g, ml_m, ml_r, score }
    }
}

impl<G: Regressor, M: Classifier, R: Classifier> DmlModel for Iivm<G, M, R> {
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError> {
        let z = data.instruments_required()?;
        if z.cols != 1 {
            return Err(DmlError::InvalidParameter(
                "z".to_string(),
                "a single binary instrument".to_string(),
                format!("{} instrument columns", z.cols),
            ));
        }
        check_binary("z", z.get_col(0))?;
        for i_treat in 0..data.n_treat() {
            check_binary(&data.treatment_names()[i_treat], data.treatment(i_treat))?;
        }
        Ok(())
    }

    fn fit_nuisance(
        &self,
        data: &DmlData,
        i_treat: usize,
        smpls: &[Fold],
        pool: &rayon::ThreadPool,
    ) -> Result<NuisanceEstimate, DmlError> {
        let x = data.covariates();
        let y = data.outcome();
        let d = data.treatment(i_treat);
        let z = data.instruments_required()?.get_col(0);
        let z_zero: Vec<bool> = z.iter().map(|&v| v == 0.0).collect();
        let z_one: Vec<bool> = z.iter().map(|&v| v == 1.0).collect();

        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_g0",
            cross_fit_regressor(&self.ml_g, x, y, smpls, Some(&z_zero), pool, "ml_g0")?,
        );
        nuisance.insert(
            "ml_g1",
            cross_fit_regressor(&self.ml_g, x, y, smpls, Some(&z_one), pool, "ml_g1")?,
        );
        nuisance.insert(
            "ml_m",
            cross_fit_classifier(&self.ml_m, x, z, smpls, None, pool, "ml_m")?,
        );
        nuisance.insert(
            "ml_r0",
            cross_fit_classifier(&self.ml_r, x, d, smpls, Some(&z_zero), pool, "ml_r0")?,
        );
        nuisance.insert(
            "ml_r1",
            cross_fit_classifier(&self.ml_r, x, d, smpls, Some(&z_one), pool, "ml_r1")?,
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
        if let IivmScore::Custom(score_fn) = &self.score {
            let (psi_a, psi_b) = score_fn.elements(y, d, data.covariates(), nuisance, smpls);
            return ScoreElements { psi_a, psi_b }.check_len(data.n_obs());
        }
        let z = data.instruments_required()?.get_col(0);
        let g_hat0 = nuisance.get("ml_g0")?;
        let g_hat1 = nuisance.get("ml_g1")?;
        let m_hat = nuisance.get("ml_m")?;
        let r_hat0 = nuisance.get("ml_r0")?;
        let r_hat1 = nuisance.get("ml_r1")?;
        let n = data.n_obs();
        let mut psi_a = Vec::with_capacity(n);
        let mut psi_b = Vec::with_capacity(n);
        for i in 0..n {
            let u0 = y[i] - g_hat0[i];
            let u1 = y[i] - g_hat1[i];
            let w0 = d[i] - r_hat0[i];
            let w1 = d[i] - r_hat1[i];
            psi_a.push(
                -(r_hat1[i] - r_hat0[i] + z[i] * w1 / m_hat[i] - (1.0 - z[i]) * w0 / (1.0 - m_hat[i])),
            );
            psi_b.push(
                g_hat1[i] - g_hat0[i] + z[i] * u1 / m_hat[i] - (1.0 - z[i]) * u0 / (1.0 - m_hat[i]),
            );
        }
        Ok(ScoreElements { psi_a, psi_b })
    }
}
