use crate::density::{CovFactors, MatrixDensity, Method};
use crate::diagnostics::IterationRecord;
use crate::error::Result;
use crate::types::DenseMatrix;

/// The result of a matrix-normal or matrix-t maximum-likelihood fit.
///
/// `factors` follow the crate-wide normalization `U[0,0] = V[0,0] = 1`, with
/// the overall variance carried by `factors.scale`.
#[derive(Debug, Clone)]
pub struct FittedParams {
    /// Estimated mean matrix (p x q).
    pub mean: DenseMatrix,
    /// Row/column covariance factors and scale.
    pub factors: CovFactors,
    /// Family; for t, the final degrees of freedom.
    pub method: Method,
    /// Whether the stopping criterion was met before the iteration cap.
    pub converged: bool,
    /// Number of iterations performed.
    pub n_iterations: usize,
    /// (Weighted) log-likelihood at the final estimates.
    pub log_likelihood: f64,
    /// Iteration history.
    pub history: Vec<IterationRecord>,
}

impl FittedParams {
    pub fn u(&self) -> &DenseMatrix {
        &self.factors.u
    }

    pub fn v(&self) -> &DenseMatrix {
        &self.factors.v
    }

    pub fn scale(&self) -> f64 {
        self.factors.scale
    }

    pub fn nu(&self) -> Option<f64> {
        self.method.nu()
    }

    /// Density at the fitted parameters.
    pub fn density(&self) -> Result<MatrixDensity> {
        MatrixDensity::new(&self.mean, &self.factors, self.method)
    }
}
