//! Score
//!
//! Orthogonal score elements and the score configuration of every model
//! family. A score is always stored through its linear decomposition
//! `psi = psi_a * theta + psi_b`, so solving a moment condition reduces to a
//! ratio of means. Each family offers built-in closed-form scores plus a
//! `Custom` variant carrying a user-supplied score function.
use crate::crossfit::NuisanceEstimate;
use crate::data::Matrix;
use crate::errors::DmlError;
use crate::resampling::Fold;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Linear decomposition of the orthogonal score for one repetition and one
/// treatment variable. Both arrays have one entry per observation.
pub struct ScoreElements {
    pub psi_a: Vec<f64>,
    pub psi_b: Vec<f64>,
}

impl ScoreElements {
    /// Evaluate `psi = psi_a * theta + psi_b` elementwise.
    pub fn psi(&self, theta: f64) -> Vec<f64> {
        self.psi_a
            .iter()
            .zip(self.psi_b.iter())
            .map(|(a, b)| a * theta + b)
            .collect()
    }

    pub(crate) fn check_len(self, n_obs: usize) -> Result<Self, DmlError> {
        if self.psi_a.len() != n_obs {
            return Err(DmlError::ShapeMismatch("psi_a".to_string(), self.psi_a.len(), n_obs));
        }
        if self.psi_b.len() != n_obs {
            return Err(DmlError::ShapeMismatch("psi_b".to_string(), self.psi_b.len(), n_obs));
        }
        Ok(self)
    }
}

/// A user-supplied score function.
///
/// Receives the outcome, the current treatment column, the covariates, the
/// out-of-fold nuisance estimates and the fold pairs of the repetition, and
/// returns the `(psi_a, psi_b)` arrays, each of length `n_obs`.
pub trait ScoreFunction: Send + Sync {
    fn elements(
        &self,
        y: &[f64],
        d: &[f64],
        x: &Matrix<f64>,
        nuisance: &NuisanceEstimate,
        smpls: &[Fold],
    ) -> (Vec<f64>, Vec<f64>);
}

/// Score forms for the partially linear regression model.
#[derive(Clone, Serialize, Deserialize)]
pub enum PlrScore {
    /// `psi_a = -v*d`, `psi_b = v*u` with `u = y - g_hat`, `v = d - m_hat`.
    IvType,
    /// Partialling-out form: `psi_a = -v*v`, `psi_b = v*u`.
    Dml2018,
    #[serde(skip)]
    Custom(Arc<dyn ScoreFunction>),
}

impl PlrScore {
    pub fn new_custom<T>(score: T) -> Self
    where
        T: ScoreFunction + 'static,
    {
        PlrScore::Custom(Arc::new(score))
    }
}

impl FromStr for PlrScore {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IV-type" => Ok(PlrScore::IvType),
            "DML2018" => Ok(PlrScore::Dml2018),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "score".to_string(),
                items_to_strings(vec!["IV-type", "DML2018"]),
            )),
        }
    }
}

/// Score forms for the partially linear IV model.
#[derive(Clone, Serialize, Deserialize)]
pub enum PlivScore {
    /// Partialling-out form on outcome, treatment and instrument residuals.
    PartiallingOut,
    #[serde(skip)]
    Custom(Arc<dyn ScoreFunction>),
}

impl PlivScore {
    pub fn new_custom<T>(score: T) -> Self
    where
        T: ScoreFunction + 'static,
    {
        PlivScore::Custom(Arc::new(score))
    }
}

impl FromStr for PlivScore {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partialling out" => Ok(PlivScore::PartiallingOut),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "score".to_string(),
                items_to_strings(vec!["partialling out"]),
            )),
        }
    }
}

/// Score forms for the interactive regression model.
#[derive(Clone, Serialize, Deserialize)]
pub enum IrmScore {
    /// Average treatment effect.
    Ate,
    /// Average treatment effect on the treated.
    Atte,
    #[serde(skip)]
    Custom(Arc<dyn ScoreFunction>),
}

impl IrmScore {
    pub fn new_custom<T>(score: T) -> Self
    where
        T: ScoreFunction + 'static,
    {
        IrmScore::Custom(Arc::new(score))
    }
}

impl FromStr for IrmScore {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ATE" => Ok(IrmScore::Ate),
            "ATTE" => Ok(IrmScore::Atte),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "score".to_string(),
                items_to_strings(vec!["ATE", "ATTE"]),
            )),
        }
    }
}

/// Score forms for the interactive IV model.
#[derive(Clone, Serialize, Deserialize)]
pub enum IivmScore {
    /// Local average treatment effect.
    Late,
    #[serde(skip)]
    Custom(Arc<dyn ScoreFunction>),
}

impl IivmScore {
    pub fn new_custom<T>(score: T) -> Self
    where
        T: ScoreFunction + 'static,
    {
        IivmScore::Custom(Arc::new(score))
    }
}

impl FromStr for IivmScore {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LATE" => Ok(IivmScore::Late),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "score".to_string(),
                items_to_strings(vec!["LATE"]),
            )),
        }
    }
}
