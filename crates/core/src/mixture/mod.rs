//! Finite mixtures of matrix-variate normal and t distributions.
//!
//! Starting values come from [`init_mixture`] (k-means or random centers,
//! identity covariances unless given); [`fit_mixture`] runs EM to
//! convergence, or [`MixtureEngine`] can be stepped by hand.

mod engine;
mod init;
mod model;

pub use engine::{fit_mixture, MixtureEngine, MixtureOptions, MixtureState};
pub use init::{init_mixture, CenterMethod, InitRequest, MixtureInit};
pub use model::{MixtureComponent, MixtureModel, MixturePrediction, MixtureStatus};
