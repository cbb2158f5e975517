//! Partially Linear Regression (PLR)
//!
//! $$Y = D \theta + g(X) + \epsilon, \qquad D = m(X) + v$$
//!
//! Two regression nuisances are cross-fitted: `ml_g` for the outcome
//! equation E[Y|X] and `ml_m` for the treatment equation E[D|X]. The
//! orthogonal score combines their residuals; the `IV-type` form uses the
//! raw treatment as instrument for itself, the `DML2018` form partials the
//! treatment out completely.
use crate::crossfit::{cross_fit_regressor, NuisanceEstimate};
use crate::data::DmlData;
use crate::errors::DmlError;
use crate::learner::Regressor;
use crate::models::DmlModel;
use crate::resampling::Fold;
use crate::score::{PlrScore, ScoreElements};

/// Partially linear regression model.
pub struct Plr<G, M> {
    /// Learner for the outcome regression E[Y|X].
    pub ml_g: G,
    /// Learner for the treatment regression E[D|X].
    pub ml_m: M,
    /// Score form.
    pub score: PlrScore,
}

impl<G, M> Plr<G, M> {
    pub fn new(ml_g: G, ml_m: M, score: PlrScore) -> Self {
        Plr { ml_g, ml_m, score }
    }
}

impl<G: Regressor, M: Regressor> DmlModel for Plr<G, M> {
    fn check_data(&self, _data: &DmlData) -> Result<(), DmlError> {
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
        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_g",
            cross_fit_regressor(&self.ml_g, x, data.outcome(), smpls, None, pool, "ml_g")?,
        );
        nuisance.insert(
            "ml_m",
            cross_fit_regressor(&self.ml_m, x, data.treatment(i_treat), smpls, None, pool, "ml_m")?,
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
        if let PlrScore::Custom(score_fn) = &self.score {
            let (psi_a, psi_b) = score_fn.elements(y, d, data.covariates(), nuisance, smpls);
            return ScoreElements { psi_a, psi_b }.check_len(data.n_obs());
        }
        let g_hat = nuisance.get("ml_g")?;
        let m_hat = nuisance.get("ml_m")?;
        let n = data.n_obs();
        let mut psi_a = Vec::with_capacity(n);
        let mut psi_b = Vec::with_capacity(n);
        for i in 0..n {
            let u = y[i] - g_hat[i];
            let v = d[i] - m_hat[i];
            match self.score {
                PlrScore::IvType => psi_a.push(-v * d[i]),
                PlrScore::Dml2018 => psi_a.push(-v * v),
                PlrScore::Custom(_) => unreachable!(),
            }
            psi_b.push(v * u);
        }
        Ok(ScoreElements { psi_a, psi_b })
    }
}
