//! Matrix-variate normal and t log-densities.
//!
//! For an observation X (p x q) with mean M, row covariance `scale * U` and
//! column covariance V, write R = X - M and
//!
//! ```text
//! d(X) = tr(U^{-1} R V^{-1} R^T) / scale
//! ```
//!
//! Normal:
//! ```text
//! log f = -(pq/2) ln(2 pi) - (q/2) ln|scale U| - (p/2) ln|V| - d/2
//! ```
//!
//! t with nu degrees of freedom (vec(X) is multivariate t with scale matrix
//! scale * V (x) U):
//! ```text
//! log f = lnG((nu+pq)/2) - lnG(nu/2) - (pq/2) ln(nu pi)
//!         - (q/2) ln|scale U| - (p/2) ln|V| - ((nu+pq)/2) ln(1 + d/nu)
//! ```

mod params;
pub mod special;

pub use params::{CovFactors, Method};

use crate::error::{MatvarError, Result};
use crate::matrix::dense::{trace_of_product, SpdFactor};
use crate::types::DenseMatrix;

use special::ln_gamma;

/// A matrix-variate density with its factorizations cached, ready to be
/// evaluated on many observations.
///
/// The t family is the multivariate t of vec(X) with Kronecker scale
/// `scale * V (x) U`, whose exponent is `(nu + pq)/2`. This is the density
/// under which the ECM weights `(pq + nu)/(nu + d)` are exact, and it is the
/// one used for fitting, classification, mixtures and likelihoods alike. It
/// is not the matrix-t with exponent `(nu + p + q - 1)/2`.
#[derive(Debug, Clone)]
pub struct MatrixDensity {
    mean: DenseMatrix,
    /// (scale * U)^{-1}
    row_precision: DenseMatrix,
    /// V^{-1}
    col_precision: DenseMatrix,
    method: Method,
    /// Every term of log f that does not depend on X.
    log_const: f64,
}

impl MatrixDensity {
    pub fn new(mean: &DenseMatrix, factors: &CovFactors, method: Method) -> Result<Self> {
        let (p, q) = mean.shape();
        if factors.u.shape() != (p, p) || factors.v.shape() != (q, q) {
            return Err(MatvarError::DimensionMismatch {
                expected: p,
                got: factors.u.nrows(),
                context: format!(
                    "covariance factors {}x{} / {}x{} for a {}x{} mean",
                    factors.u.nrows(),
                    factors.u.ncols(),
                    factors.v.nrows(),
                    factors.v.ncols(),
                    p,
                    q
                ),
            });
        }
        if !(factors.scale.is_finite() && factors.scale > 0.0) {
            return Err(MatvarError::InvalidParameter(format!(
                "scale must be positive and finite, got {}",
                factors.scale
            )));
        }
        method.validate()?;

        let row = SpdFactor::new(&factors.u, "row covariance U")?;
        let col = SpdFactor::new(&factors.v, "column covariance V")?;

        let (pf, qf) = (p as f64, q as f64);
        let log_det_row = pf * factors.scale.ln() + row.log_det;
        let det_term = -0.5 * qf * log_det_row - 0.5 * pf * col.log_det;
        let pq = pf * qf;

        let log_const = match method {
            Method::Normal => -0.5 * pq * (2.0 * std::f64::consts::PI).ln() + det_term,
            Method::T { nu } => {
                ln_gamma(0.5 * (nu + pq)) - ln_gamma(0.5 * nu)
                    - 0.5 * pq * (nu * std::f64::consts::PI).ln()
                    + det_term
            }
        };

        Ok(Self {
            mean: mean.clone(),
            row_precision: row.inverse / factors.scale,
            col_precision: col.inverse,
            method,
            log_const,
        })
    }

    /// d(X) = tr((scale U)^{-1} R V^{-1} R^T).
    pub fn mahalanobis(&self, x: &DenseMatrix) -> f64 {
        let r = x - &self.mean;
        let left = &self.row_precision * &r;
        let right = &r * &self.col_precision;
        trace_of_product(&left, &right.transpose())
    }

    pub fn log_density(&self, x: &DenseMatrix) -> f64 {
        let d = self.mahalanobis(x);
        self.log_density_from_distance(d)
    }

    /// Evaluate log f given a precomputed d(X).
    pub fn log_density_from_distance(&self, d: f64) -> f64 {
        match self.method {
            Method::Normal => self.log_const - 0.5 * d,
            Method::T { nu } => {
                let pq = (self.mean.nrows() * self.mean.ncols()) as f64;
                self.log_const - 0.5 * (nu + pq) * (d / nu).ln_1p()
            }
        }
    }

    /// Normal family only: `(A, c)` with `log f(X) = <A, X> + c - d0(X)/2`,
    /// where `<., .>` is the Frobenius product and `d0` the distance of X from
    /// a zero mean. Densities sharing U, V and scale share `d0`, so `<A, X> + c`
    /// gives the same posterior as `log_density` without squaring X.
    pub fn linear_coefficients(&self) -> Option<(DenseMatrix, f64)> {
        if self.method != Method::Normal {
            return None;
        }
        let a = &self.row_precision * &self.mean * &self.col_precision;
        let c = self.log_const - 0.5 * a.dot(&self.mean);
        Some((a, c))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn mean(&self) -> &DenseMatrix {
        &self.mean
    }
}
