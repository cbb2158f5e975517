mod utils;

// Modules
pub mod bootstrap;
pub mod crossfit;
pub mod data;
pub mod errors;
pub mod estimator;
pub mod learner;
pub mod models;
pub mod resampling;
pub mod score;


// Individual classes, and functions
pub use bootstrap::BootstrapMethod;
pub use crossfit::NuisanceEstimate;
pub use data::{DmlData, Matrix};
pub use errors::DmlError;
pub use estimator::{BootstrapDistribution, ConfIntTable, DmlProcedure, DoubleMl, FitResult};
pub use learner::{Classifier, Regressor};
pub use models::{DmlModel, Iivm, Irm, Pliv, PlivPartialXZ, PlivPartialZ, Plr};
pub use resampling::{Fold, KFoldResampling, SampleSplit};
pub use score::{IivmScore, IrmScore, PlivScore, PlrScore, ScoreElements, ScoreFunction};
