use crate::data::MatrixStack;
use crate::density::{CovFactors, MatrixDensity, Method};
use crate::diagnostics::ConvergenceMonitor;
use crate::error::Result;
use crate::matrix::dense::{inverse_spd, squared_difference, trace_of_product};
use crate::types::DenseMatrix;

use super::moments::{check_degenerate, col_scatter, residuals, row_scatter, weighted_mean};
use super::options::FitOptions;
use super::result::FittedParams;

/// Maximum-likelihood fit of a matrix-variate normal by the flip-flop
/// algorithm.
///
/// With residuals R_i = X_i - M and weights w_i (W = sum w_i), alternate
///
/// ```text
/// U = sum_i w_i R_i V^{-1} R_i^T / (q W)
/// V = sum_i w_i R_i^T U^{-1} R_i / (p W)
/// ```
///
/// rescaling after each sweep so that V[0,0] = 1 (the factor moves into U).
/// Stops when the squared change in (U, V) and the relative change in
/// log-likelihood fall below the tolerance; hitting the iteration cap is
/// reported through `converged = false`, not as an error.
///
/// Fails with `DegenerateVariable` before iterating if any cell has
/// (near-)zero weighted variance.
pub fn fit_matrix_normal(stack: &MatrixStack, options: &FitOptions) -> Result<FittedParams> {
    let (p, q) = stack.dims();
    let weights = options.resolve_weights(stack.len(), p, q)?;

    let mean = match &options.fixed_mean {
        Some(m) => m.clone(),
        None => weighted_mean(stack, &weights, options.row_mean, options.col_mean),
    };
    let resid = residuals(stack, &mean);
    check_degenerate(&resid, &weights, options.degenerate_tol)?;

    let mut cov = CovarianceState::from_options(options, p, q);

    let total_weight: f64 = weights.iter().sum();
    if !cov.update_u && !cov.update_v {
        // Only the overall scale is free: closed form.
        cov.sweep(&resid, &weights, total_weight)?;
        let factors = cov.factors()?;
        let density = MatrixDensity::new(&mean, &factors, Method::Normal)?;
        let log_likelihood = weighted_log_likelihood(stack, &weights, &density);
        return Ok(FittedParams {
            mean,
            factors,
            method: Method::Normal,
            converged: true,
            n_iterations: 0,
            log_likelihood,
            history: Vec::new(),
        });
    }

    let mut monitor = ConvergenceMonitor::with_criterion(options.tol, options.max_iter, options.criterion);
    let mut converged = false;

    while !monitor.max_reached() {
        let iter = monitor.n_iterations() + 1;
        let change = cov.sweep(&resid, &weights, total_weight)?;

        let density = MatrixDensity::new(&mean, &cov.factors()?, Method::Normal)?;
        let log_likelihood = weighted_log_likelihood(stack, &weights, &density);
        monitor.record(iter, log_likelihood, change);

        log::debug!(
            "flip-flop iteration {}: logL = {:.6}, change = {:.3e}",
            iter,
            log_likelihood,
            change
        );

        if monitor.is_converged() {
            converged = true;
            break;
        }
    }

    if !converged {
        log::warn!(
            "matrix-normal fit did not converge after {} iterations",
            options.max_iter
        );
    }

    Ok(FittedParams {
        mean,
        factors: cov.factors()?,
        method: Method::Normal,
        converged,
        n_iterations: monitor.n_iterations(),
        log_likelihood: monitor.last_logl().unwrap_or(f64::NEG_INFINITY),
        history: monitor.into_history(),
    })
}

/// Working (unnormalized) row and column covariances of an iterative fit.
#[derive(Debug, Clone)]
pub(crate) struct CovarianceState {
    pub(crate) u: DenseMatrix,
    pub(crate) v: DenseMatrix,
    pub(crate) update_u: bool,
    pub(crate) update_v: bool,
}

impl CovarianceState {
    pub(crate) fn from_options(options: &FitOptions, p: usize, q: usize) -> Self {
        let (u, update_u) = match (&options.fixed_u, &options.initial_u) {
            (Some(u), _) => (u.clone(), false),
            (None, Some(u)) => (u.clone(), true),
            (None, None) => (DenseMatrix::identity(p, p), true),
        };
        let (v, update_v) = match (&options.fixed_v, &options.initial_v) {
            (Some(v), _) => (v.clone(), false),
            (None, Some(v)) => (v.clone(), true),
            (None, None) => (DenseMatrix::identity(q, q), true),
        };
        Self {
            u,
            v,
            update_u,
            update_v,
        }
    }

    /// One flip-flop sweep over the free factors; returns the sum of squared
    /// changes in U and V.
    ///
    /// `weights` are the per-observation contributions to the scatter
    /// matrices, `total_weight` the divisor W (these differ in the t model,
    /// where contributions are w_i * delta_i but the divisor is sum w_i).
    pub(crate) fn sweep(
        &mut self,
        resid: &[DenseMatrix],
        weights: &[f64],
        total_weight: f64,
    ) -> Result<f64> {
        if !self.update_u && !self.update_v {
            return self.rescale(resid, weights, total_weight);
        }
        let (p, q) = (self.u.nrows(), self.v.nrows());
        let old_u = self.u.clone();
        let old_v = self.v.clone();

        if self.update_u {
            let v_inv = inverse_spd(&self.v, "column covariance V")?;
            self.u = row_scatter(resid, weights, &v_inv) / (q as f64 * total_weight);
        }
        if self.update_v {
            let u_inv = inverse_spd(&self.u, "row covariance U")?;
            self.v = col_scatter(resid, weights, &u_inv) / (p as f64 * total_weight);
        }
        if self.update_u && self.update_v {
            let c = self.v[(0, 0)];
            if c > 0.0 && c.is_finite() {
                self.v /= c;
                self.u *= c;
            }
        }

        Ok(squared_difference(&self.u, &old_u) + squared_difference(&self.v, &old_v))
    }

    /// Normalized factors of the current state.
    pub(crate) fn factors(&self) -> Result<CovFactors> {
        CovFactors::normalized(self.u.clone(), self.v.clone())
    }

    /// Rescale U by the closed-form scale with both shapes held:
    /// s = sum_i w_i tr(U^{-1} R_i V^{-1} R_i^T) / (p q W). Returns the
    /// squared change in U.
    pub(crate) fn rescale(&mut self, resid: &[DenseMatrix], weights: &[f64], total_weight: f64) -> Result<f64> {
        let (p, q) = (self.u.nrows(), self.v.nrows());
        let u_inv = inverse_spd(&self.u, "row covariance U")?;
        let v_inv = inverse_spd(&self.v, "column covariance V")?;
        let quad: f64 = resid
            .iter()
            .zip(weights)
            .map(|(r, &w)| w * quadratic_trace(r, &u_inv, &v_inv))
            .sum();
        let s = quad / (p as f64 * q as f64 * total_weight);
        let old_u = self.u.clone();
        self.u *= s;
        Ok(squared_difference(&self.u, &old_u))
    }

    /// tr(U^{-1} R V^{-1} R^T) for every residual, with the current (unnormalized) factors.
    pub(crate) fn distances(&self, resid: &[DenseMatrix]) -> Result<Vec<f64>> {
        let u_inv = inverse_spd(&self.u, "row covariance U")?;
        let v_inv = inverse_spd(&self.v, "column covariance V")?;
        Ok(resid.iter().map(|r| quadratic_trace(r, &u_inv, &v_inv)).collect())
    }
}

fn quadratic_trace(r: &DenseMatrix, u_inv: &DenseMatrix, v_inv: &DenseMatrix) -> f64 {
    let left = u_inv * r;
    let right = r * v_inv;
    trace_of_product(&left, &right.transpose())
}

/// sum_i w_i log f(X_i).
pub(crate) fn weighted_log_likelihood(stack: &MatrixStack, weights: &[f64], density: &MatrixDensity) -> f64 {
    stack
        .iter()
        .zip(weights)
        .filter(|(_, w)| **w > 0.0)
        .map(|(x, &w)| w * density.log_density(x))
        .sum()
}
