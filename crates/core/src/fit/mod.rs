//! Maximum-likelihood fitting of matrix-variate normal and t models.
//!
//! Both fitters take an observation stack and a [`FitOptions`] and return a
//! [`FittedParams`] normalized so that `U[0,0] = V[0,0] = 1`.

mod moments;
mod normal;
mod options;
mod result;
mod t;

pub use normal::fit_matrix_normal;
pub use options::FitOptions;
pub use result::FittedParams;
pub use t::fit_matrix_t;

pub(crate) use moments::{check_degenerate, weighted_mean};
pub(crate) use t::TState;
