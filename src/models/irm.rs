//! Interactive Regression Model (IRM)
//!
//! $$Y = g(D, X) + U, \qquad D = m(X) + V, \qquad D \in \{0, 1\}$$
//!
//! Fully interactive binary-treatment model. Outcome regressions are fitted
//! separately per treatment arm (training rows restricted to that arm), and
//! the propensity comes from a classification learner. The `ATE` score is
//! the doubly robust augmented inverse-propensity form; `ATTE` reweights it
//! to the treated population.
use crate::crossfit::{cross_fit_classifier, cross_fit_regressor, NuisanceEstimate};
use crate::data::{check_binary, DmlData};
use crate::errors::DmlError;
use crate::learner::{Classifier, Regressor};
use crate::models::DmlModel;
use crate::resampling::Fold;
use crate::score::{IrmScore, ScoreElements};
use crate::utils::mean;

/// Interactive regression model.
pub struct Irm<G, M> {
    /// Learner for the per-arm outcome regressions E[Y|X, D=d].
    pub ml_g: G,
    /// Learner for the propensity P[D=1|X].
    pub ml_m: M,
    /// Score form.
    pub score: IrmScore,
}

impl<G, M> Irm<G, M> {
    pub fn new(ml_g: G, ml_m: M, score: IrmScore) -> Self {
        Irm { ml_g, ml_m, score }
    }
}

impl<G: Regressor, M: Classifier> DmlModel for Irm<G, M> {
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError> {
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
        let control: Vec<bool> = d.iter().map(|&v| v == 0.0).collect();
        let treated: Vec<bool> = d.iter().map(|&v| v == 1.0).collect();

        let mut nuisance = NuisanceEstimate::new();
        nuisance.insert(
            "ml_g0",
            cross_fit_regressor(&self.ml_g, x, y, smpls, Some(&control), pool, "ml_g0")?,
        );
        nuisance.insert(
            "ml_g1",
            cross_fit_regressor(&self.ml_g, x, y, smpls, Some(&treated), pool, "ml_g1")?,
        );
        nuisance.insert(
            "ml_m",
            cross_fit_classifier(&self.ml_m, x, d, smpls, None, pool, "ml_m")?,
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
        if let IrmScore::Custom(score_fn) = &self.score {
            let (psi_a, psi_b) = score_fn.elements(y, d, data.covariates(), nuisance, smpls);
            return ScoreElements { psi_a, psi_b }.check_len(data.n_obs());
        }
        let g_hat0 = nuisance.get("ml_g0")?;
        let g_hat1 = nuisance.get("ml_g1")?;
        let m_hat = nuisance.get("ml_m")?;
        let n = data.n_obs();
        let mut psi_a = Vec::with_capacity(n);
        let mut psi_b = Vec::with_capacity(n);
        match self.score {
            IrmScore::Ate => {
                for i in 0..n {
                    let u0 = y[i] - g_hat0[i];
                    let u1 = y[i] - g_hat1[i];
                    psi_a.push(-1.0);
                    psi_b.push(
                        g_hat1[i] - g_hat0[i] + d[i] * u1 / m_hat[i]
                            - (1.0 - d[i]) * u0 / (1.0 - m_hat[i]),
                    );
                }
            }
            IrmScore::Atte => {
                let p_hat = mean(d);
                for i in 0..n {
                    let u0 = y[i] - g_hat0[i];
                    psi_a.push(-d[i] / p_hat);
                    psi_b.push(
                        d[i] * u0 / p_hat - m_hat[i] * (1.0 - d[i]) * u0 / (p_hat * (1.0 - m_hat[i])),
                    );
                }
            }
            IrmScore::Custom(_) => unreachable!(),
        }
        Ok(ScoreElements { psi_a, psi_b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Matrix;

    #[derive(Clone, Default)]
    struct MeanRegressor {
        mean: f64,
    }

    impl Regressor for MeanRegressor {
        fn fit(&mut self, _x: &Matrix<f64>, y: &[f64]) -> Result<(), DmlError> {
            self.mean = y.iter().sum::<f64>() / y.len() as f64;
            Ok(())
        }
        fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
            Ok(vec![self.mean; x.rows])
        }
    }

    #[derive(Clone, Default)]
    struct PrevalenceClassifier {
        p: f64,
    }

    impl Classifier for PrevalenceClassifier {
        fn fit(&mut self, _x: &Matrix<f64>, y: &[f64]) -> Result<(), DmlError> {
            self.p = y.iter().sum::<f64>() / y.len() as f64;
            Ok(())
        }
        fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
            Ok(vec![self.p; x.rows])
        }
    }

    #[test]
    fn test_irm_requires_binary_treatment() {
        let y = vec![1.0, 2.0];
        let d = vec![0.5, 1.0];
        let x = vec![0.0, 0.0];
        let data = DmlData::new(&y, Matrix::new(&d, 2, 1), Matrix::new(&x, 2, 1), None).unwrap();
        let irm = Irm::new(MeanRegressor::default(), PrevalenceClassifier::default(), IrmScore::Ate);
        assert!(matches!(irm.check_data(&data), Err(DmlError::NonBinary(_))));
    }

    #[test]
    fn test_irm_ate_psi_a_is_minus_one() {
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let d = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let x = vec![0.0; 6];
        let data = DmlData::new(&y, Matrix::new(&d, 6, 1), Matrix::new(&x, 6, 1), None).unwrap();
        let smpls = vec![(vec![3, 4, 5], vec![0, 1, 2]), (vec![0, 1, 2], vec![3, 4, 5])];
        let pool = crate::crossfit::build_pool(Some(1)).unwrap();
        let irm = Irm::new(MeanRegressor::default(), PrevalenceClassifier::default(), IrmScore::Ate);
        let nuisance = irm.fit_nuisance(&data, 0, &smpls, &pool).unwrap();
        let elements = irm.score_elements(&data, 0, &nuisance, &smpls).unwrap();
        assert!(elements.psi_a.iter().all(|&a| a == -1.0));
        assert!(elements.psi_b.iter().all(|b| b.is_finite()));
    }
}
