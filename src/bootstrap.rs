//! Bootstrap
//!
//! Multiplier bootstrap over the estimated scores. Every replication draws
//! one multiplier per observation, perturbs the fitted psi and studentizes
//! with the repetition's Jacobian and standard error. The pooled
//! distribution across repetitions feeds joint confidence bands.
use crate::errors::DmlError;
use crate::estimator::{BootstrapDistribution, DoubleMl};
use crate::models::DmlModel;
use crate::utils::{items_to_strings, mean_at};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Multiplier distributions for the score bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapMethod {
    /// Dirichlet-style weights, `Exp(1) - 1`.
    Bayes,
    /// Standard Gaussian multipliers.
    Normal,
    /// Rademacher two-point multipliers, ±1 with probability 1/2.
    Wild,
}

impl FromStr for BootstrapMethod {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bayes" => Ok(BootstrapMethod::Bayes),
            "normal" => Ok(BootstrapMethod::Normal),
            "wild" => Ok(BootstrapMethod::Wild),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "method".to_string(),
                items_to_strings(vec!["Bayes", "normal", "wild"]),
            )),
        }
    }
}

/// Draw the multiplier matrix, one row per bootstrap replication.
pub(crate) fn draw_weights(
    method: BootstrapMethod,
    n_rep_boot: usize,
    n_obs: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f64>> {
    (0..n_rep_boot)
        .map(|_| {
            (0..n_obs)
                .map(|_| match method {
                    BootstrapMethod::Bayes => {
                        let e: f64 = rng.sample(Exp1);
                        e - 1.0
                    }
                    BootstrapMethod::Normal => rng.sample(StandardNormal),
                    BootstrapMethod::Wild => {
                        if rng.gen::<bool>() {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                })
                .collect()
        })
        .collect()
}

impl<M: DmlModel> DoubleMl<M> {
    /// Run the multiplier bootstrap over the retained scores.
    ///
    /// * `method` - Multiplier distribution.
    /// * `n_rep_boot` - Number of bootstrap replications per repetition.
    /// * `rng` - Random generator; re-seed before the call for reproducible
    ///   draws.
    pub fn bootstrap(
        &mut self,
        method: BootstrapMethod,
        n_rep_boot: usize,
        rng: &mut StdRng,
    ) -> Result<&BootstrapDistribution, DmlError> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("bootstrap".to_string()))?;
        let scores = self
            .scores
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("bootstrap".to_string()))?;
        if n_rep_boot == 0 {
            return Err(DmlError::InvalidParameter(
                "n_rep_boot".to_string(),
                "a positive integer".to_string(),
                "0".to_string(),
            ));
        }
        let smpls = self.smpls.as_ref().ok_or(DmlError::NoSampleSplitting)?;

        let n_rep = smpls.n_rep();
        let n_treat = result.coef.len();
        let mut boot_coef = vec![Vec::with_capacity(n_rep * n_rep_boot); n_treat];
        for i_rep in 0..n_rep {
            let covered = smpls.covered(i_rep);
            let n = covered.len();
            // One multiplier matrix per repetition, shared across treatments.
            let weights = draw_weights(method, n_rep_boot, n, rng);
            for (i_treat, treat_boot) in boot_coef.iter_mut().enumerate() {
                let psi = &scores.psi[i_rep][i_treat];
                let psi_a = &scores.psi_a[i_rep][i_treat];
                let jacobian = mean_at(psi_a, &covered);
                let se = result.all_se[i_rep][i_treat];
                for row in &weights {
                    let s: f64 = covered.iter().enumerate().map(|(k, &i)| row[k] * psi[i]).sum();
                    treat_boot.push(s / (n as f64 * jacobian * se));
                }
            }
        }
        let dist = BootstrapDistribution { boot_coef, n_rep_boot };
        Ok(&*self.boot.insert(dist))
    }
}
