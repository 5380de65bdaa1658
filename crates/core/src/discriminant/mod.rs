//! Linear and quadratic discriminant analysis for matrix observations.
//!
//! [`fit_lda`] pools one (U, V, scale) over all groups, [`fit_qda`] fits one
//! per group. Both return a [`DiscriminantModel`] whose
//! [`predict`](DiscriminantModel::predict) scores each group by
//! log-density + log-prior.

mod builder;
mod model;
mod predict;
mod prior;

pub use builder::{fit_lda, fit_qda, DiscriminantBuilder};
pub use model::{DiscriminantKind, DiscriminantModel, GroupCovariance};
pub use predict::Prediction;

pub(crate) use prior::validate_prior;
