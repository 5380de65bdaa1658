use crate::data::MatrixStack;
use crate::density::{special::ln_gamma, CovFactors, MatrixDensity, Method};
use crate::diagnostics::ConvergenceMonitor;
use crate::error::Result;
use crate::matrix::dense::squared_difference;
use crate::types::DenseMatrix;

use super::moments::{check_degenerate, residuals, weighted_mean};
use super::normal::{weighted_log_likelihood, CovarianceState};
use super::options::FitOptions;
use super::result::FittedParams;

/// Search interval for the degrees of freedom when they are estimated.
const NU_MIN: f64 = 0.1;
const NU_MAX: f64 = 1000.0;

/// Maximum-likelihood fit of a matrix-variate t with `nu` degrees of freedom
/// by ECM.
///
/// E-step: each observation gets the latent weight
///
/// ```text
/// delta_i = (pq + nu) / (nu + tr(U^{-1} R_i V^{-1} R_i^T))
/// ```
///
/// CM-steps re-estimate the mean with weights `w_i * delta_i`, then U and V by
/// one flip-flop sweep with the same contributions (divided by sum w_i). With
/// [`FitOptions::estimate_nu`], an ECME step then maximizes the observed
/// log-likelihood over nu in [0.1, 1000].
///
/// `nu` must be finite and positive; use [`super::fit_matrix_normal`] for the
/// normal limit.
pub fn fit_matrix_t(stack: &MatrixStack, nu: f64, options: &FitOptions) -> Result<FittedParams> {
    Method::T { nu }.validate()?;
    let (p, q) = stack.dims();
    let weights = options.resolve_weights(stack.len(), p, q)?;

    let mean = match &options.fixed_mean {
        Some(m) => m.clone(),
        None => weighted_mean(stack, &weights, options.row_mean, options.col_mean),
    };
    let resid = residuals(stack, &mean);
    check_degenerate(&resid, &weights, options.degenerate_tol)?;

    let total_weight: f64 = weights.iter().sum();
    let mut cov = CovarianceState::from_options(options, p, q);
    if options.fixed_u.is_none() && options.initial_u.is_none() {
        // Start from the moment scale rather than the raw identity.
        cov.rescale(&resid, &weights, total_weight)?;
    }
    let mut state = TState::new(mean, cov, nu, options);

    let mut monitor = ConvergenceMonitor::with_criterion(options.tol, options.max_iter, options.criterion);
    let mut converged = false;

    while !monitor.max_reached() {
        let iter = monitor.n_iterations() + 1;
        let change = state.pass(stack, &weights, total_weight)?;

        let log_likelihood = weighted_log_likelihood(stack, &weights, &state.density()?);
        monitor.record(iter, log_likelihood, change);

        log::debug!(
            "ECM iteration {}: logL = {:.6}, nu = {:.4}, change = {:.3e}",
            iter,
            log_likelihood,
            state.nu,
            change
        );

        if monitor.is_converged() {
            converged = true;
            break;
        }
    }

    if !converged {
        log::warn!("matrix-t fit did not converge after {} iterations", options.max_iter);
    }

    Ok(FittedParams {
        factors: state.factors()?,
        method: Method::T { nu: state.nu },
        mean: state.mean,
        converged,
        n_iterations: monitor.n_iterations(),
        log_likelihood: monitor.last_logl().unwrap_or(f64::NEG_INFINITY),
        history: monitor.into_history(),
    })
}

/// Working state of a matrix-t ECM iteration.
///
/// Shared by the stand-alone fitter, the pooled LDA loop and the mixture
/// M-step, which differ only in the weights they feed to [`TState::pass`].
#[derive(Debug, Clone)]
pub(crate) struct TState {
    pub(crate) mean: DenseMatrix,
    pub(crate) cov: CovarianceState,
    pub(crate) nu: f64,
    fixed_mean: bool,
    row_mean: bool,
    col_mean: bool,
    estimate_nu: bool,
}

impl TState {
    pub(crate) fn new(mean: DenseMatrix, cov: CovarianceState, nu: f64, options: &FitOptions) -> Self {
        Self {
            mean,
            cov,
            nu,
            fixed_mean: options.fixed_mean.is_some(),
            row_mean: options.row_mean,
            col_mean: options.col_mean,
            estimate_nu: options.estimate_nu,
        }
    }

    /// Start from normalized factors: the working U carries the scale.
    pub(crate) fn from_factors(mean: DenseMatrix, factors: &CovFactors, nu: f64, options: &FitOptions) -> Self {
        let cov = CovarianceState {
            u: factors.row_covariance(),
            v: factors.v.clone(),
            update_u: options.fixed_u.is_none(),
            update_v: options.fixed_v.is_none(),
        };
        Self::new(mean, cov, nu, options)
    }

    /// One E + CM (+ ECME) cycle. `weights` are the observation weights,
    /// `total_weight` their sum. Returns the sum of squared parameter changes.
    pub(crate) fn pass(&mut self, stack: &MatrixStack, weights: &[f64], total_weight: f64) -> Result<f64> {
        let (p, q) = stack.dims();
        let pq = (p * q) as f64;

        // E-step
        let resid = residuals(stack, &self.mean);
        let dist = self.cov.distances(&resid)?;
        let combined: Vec<f64> = weights
            .iter()
            .zip(&dist)
            .map(|(&w, &d)| w * (pq + self.nu) / (self.nu + d))
            .collect();

        // CM-step: mean
        let old_mean = self.mean.clone();
        if !self.fixed_mean {
            self.mean = weighted_mean(stack, &combined, self.row_mean, self.col_mean);
        }
        let resid = residuals(stack, &self.mean);

        // CM-step: U then V
        let mut change = self.cov.sweep(&resid, &combined, total_weight)?;
        change += squared_difference(&self.mean, &old_mean);

        if self.estimate_nu {
            let dist = self.cov.distances(&resid)?;
            let new_nu = maximize_nu(&dist, weights, pq);
            change += (new_nu.ln() - self.nu.ln()).powi(2);
            self.nu = new_nu;
        }

        Ok(change)
    }

    pub(crate) fn factors(&self) -> Result<CovFactors> {
        self.cov.factors()
    }

    pub(crate) fn density(&self) -> Result<MatrixDensity> {
        MatrixDensity::new(&self.mean, &self.factors()?, Method::T { nu: self.nu })
    }
}

/// The nu-dependent part of sum_i w_i log f(X_i) given distances d_i.
fn nu_profile(nu: f64, dist: &[f64], weights: &[f64], pq: f64) -> f64 {
    let per_obs = ln_gamma(0.5 * (nu + pq)) - ln_gamma(0.5 * nu) - 0.5 * pq * nu.ln();
    dist.iter()
        .zip(weights)
        .map(|(&d, &w)| w * (per_obs - 0.5 * (nu + pq) * (d / nu).ln_1p()))
        .sum()
}

/// Golden-section search for the maximizing nu on a log scale.
pub(crate) fn maximize_nu(dist: &[f64], weights: &[f64], pq: f64) -> f64 {
    let ratio = 0.5 * (5.0_f64.sqrt() - 1.0);
    let objective = |x: f64| nu_profile(x.exp(), dist, weights, pq);

    let (mut a, mut b) = (NU_MIN.ln(), NU_MAX.ln());
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let (mut fc, mut fd) = (objective(c), objective(d));

    for _ in 0..200 {
        if (b - a).abs() < 1e-8 {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = objective(d);
        }
    }
    (0.5 * (a + b)).exp()
}
