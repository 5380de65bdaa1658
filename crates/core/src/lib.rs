//! Classification and clustering of matrix-valued observations under
//! matrix-variate normal and t models.
//!
//! - [`fit`]: maximum-likelihood fitting of (mean, U, V, scale) by flip-flop
//!   (normal) and ECM (t).
//! - [`discriminant`]: linear and quadratic discriminant analysis.
//! - [`mixture`]: finite mixtures fitted by EM.
//! - [`diagnostics`]: convergence monitoring and information criteria.
//! - [`sampling`]: random matrix-normal, matrix-t and Wishart generation.

pub mod data;
pub mod density;
pub mod diagnostics;
pub mod discriminant;
pub mod error;
pub mod fit;
pub mod matrix;
pub mod mixture;
pub mod sampling;
pub mod types;

pub use data::{GroupLabels, MatrixStack};
pub use density::{CovFactors, Method};
pub use discriminant::{fit_lda, fit_qda, DiscriminantModel};
pub use error::{MatvarError, Result};
pub use fit::{fit_matrix_normal, fit_matrix_t, FitOptions, FittedParams};
pub use mixture::{fit_mixture, init_mixture, MixtureModel};
