//! Models
//!
//! The model families understood by the estimator: partially linear
//! regression (PLR), partially linear IV regression (PLIV, with partialX,
//! partialZ and partialXZ variants), the interactive regression model (IRM)
//! and the interactive IV model (IIVM). Each family knows which nuisance
//! learners to cross-fit and how to assemble its orthogonal score elements.

// import modules
mod iivm;
mod irm;
mod pliv;
mod plr;

// make model families public
pub use iivm::Iivm;
pub use irm::Irm;
pub use pliv::{Pliv, PlivPartialXZ, PlivPartialZ};
pub use plr::Plr;

use crate::crossfit::NuisanceEstimate;
use crate::data::DmlData;
use crate::errors::DmlError;
use crate::resampling::Fold;
use crate::score::ScoreElements;

/// One double machine learning model family.
pub trait DmlModel: Send + Sync {
    /// Validate family-specific data requirements before any fitting.
    fn check_data(&self, data: &DmlData) -> Result<(), DmlError>;

    /// Cross-fit all nuisance learners of the family for one repetition and
    /// one treatment variable.
    fn fit_nuisance(
        &self,
        data: &DmlData,
        i_treat: usize,
        smpls: &[Fold],
        pool: &rayon::ThreadPool,
    ) -> Result<NuisanceEstimate, DmlError>;

    /// Assemble the linear score decomposition from nuisance estimates.
    fn score_elements(
        &self,
        data: &DmlData,
        i_treat: usize,
        nuisance: &NuisanceEstimate,
        smpls: &[Fold],
    ) -> Result<ScoreElements, DmlError>;
}
