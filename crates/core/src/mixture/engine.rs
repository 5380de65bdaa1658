use crate::data::MatrixStack;
use crate::density::{CovFactors, MatrixDensity, Method};
use crate::diagnostics::{ConvergenceCriterion, ConvergenceMonitor};
use crate::error::{MatvarError, Result};
use crate::fit::{fit_matrix_normal, FitOptions, TState};
use crate::matrix::dense::{normalize_log_rows, row_argmax, squared_difference};
use crate::types::DenseMatrix;

use super::init::{check_covariances, MixtureInit};
use super::model::{MixtureComponent, MixtureModel, MixtureStatus};

/// Lifecycle of a [`MixtureEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixtureState {
    Uninitialized,
    Initializing,
    Iterating,
    Converged,
    MaxIterReached,
    Failed,
}

impl MixtureState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MixtureState::Converged | MixtureState::MaxIterReached | MixtureState::Failed
        )
    }
}

/// Settings of a mixture fit.
#[derive(Debug, Clone)]
pub struct MixtureOptions {
    method: Method,
    tol: f64,
    max_iter: usize,
    criterion: ConvergenceCriterion,
    row_mean: bool,
    col_mean: bool,
    estimate_nu: bool,
}

impl Default for MixtureOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl MixtureOptions {
    /// Normal components, Aitken stopping rule with tolerance 1e-6, at most
    /// 1000 EM iterations.
    pub fn new() -> Self {
        Self {
            method: Method::Normal,
            tol: 1e-6,
            max_iter: 1000,
            criterion: ConvergenceCriterion::Aitken,
            row_mean: false,
            col_mean: false,
            estimate_nu: false,
        }
    }

    /// Component family; for t, the (starting) degrees of freedom.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    /// Stopping rule; [`ConvergenceCriterion::Aitken`] (default) or
    /// [`ConvergenceCriterion::LogLikelihood`] for the raw difference.
    pub fn criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn row_mean(mut self, on: bool) -> Self {
        self.row_mean = on;
        self
    }

    pub fn col_mean(mut self, on: bool) -> Self {
        self.col_mean = on;
        self
    }

    /// Estimate each component's nu (t family only).
    pub fn estimate_nu(mut self, on: bool) -> Self {
        self.estimate_nu = on;
        self
    }

    fn fit_options(&self) -> FitOptions {
        FitOptions::new()
            .row_mean(self.row_mean)
            .col_mean(self.col_mean)
            .estimate_nu(self.estimate_nu)
    }
}

/// EM for finite mixtures of matrix-variate normal or t components, driven
/// one transition at a time by [`MixtureEngine::step`].
///
/// `Uninitialized -> Initializing` validates the starting values,
/// `Initializing -> Iterating` runs the first E-step, and every further step
/// is one M-step + E-step followed by the convergence check.
pub struct MixtureEngine<'a> {
    stack: &'a MatrixStack,
    options: MixtureOptions,
    init: MixtureInit,
    state: MixtureState,
    components: Vec<MixtureComponent>,
    responsibilities: DenseMatrix,
    monitor: ConvergenceMonitor,
    iteration: usize,
}

impl<'a> MixtureEngine<'a> {
    pub fn new(stack: &'a MatrixStack, init: &MixtureInit, options: &MixtureOptions) -> Self {
        let k = init.n_components();
        Self {
            stack,
            options: options.clone(),
            init: init.clone(),
            state: MixtureState::Uninitialized,
            components: Vec::with_capacity(k),
            responsibilities: DenseMatrix::zeros(stack.len(), k),
            monitor: ConvergenceMonitor::with_criterion(options.tol, options.max_iter, options.criterion),
            iteration: 0,
        }
    }

    pub fn state(&self) -> MixtureState {
        self.state
    }

    /// Responsibilities of the latest E-step (n x K).
    pub fn responsibilities(&self) -> &DenseMatrix {
        &self.responsibilities
    }

    /// Log-likelihood after every E-step so far.
    pub fn log_likelihood_trace(&self) -> Vec<f64> {
        self.monitor.history().iter().map(|r| r.log_likelihood).collect()
    }

    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    /// Advance one transition. A failure moves the engine to `Failed` and is
    /// returned as [`MatvarError::MixtureFailed`].
    pub fn step(&mut self) -> Result<MixtureState> {
        let outcome = match self.state {
            MixtureState::Uninitialized => self.initialize().map(|_| MixtureState::Initializing),
            MixtureState::Initializing => self.e_step().map(|_| MixtureState::Iterating),
            MixtureState::Iterating => self.iterate(),
            terminal => return Ok(terminal),
        };
        match outcome {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(err) => {
                self.state = MixtureState::Failed;
                let reason = match err {
                    MatvarError::MixtureFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(MatvarError::MixtureFailed {
                    iteration: self.iteration,
                    reason,
                })
            }
        }
    }

    fn initialize(&mut self) -> Result<()> {
        let init = &self.init;
        let k = init.n_components();
        let (p, q) = self.stack.dims();
        if k == 0 || init.centers.len() != k || init.u.len() != k || init.v.len() != k {
            return Err(MatvarError::Validation(format!(
                "inconsistent starting values: {} proportions, {} centers, {} U, {} V",
                k,
                init.centers.len(),
                init.u.len(),
                init.v.len()
            )));
        }
        if let Some(c) = init.centers.iter().find(|c| c.shape() != (p, q)) {
            return Err(MatvarError::Validation(format!(
                "mixture center is {}x{}, observations are {}x{}",
                c.nrows(),
                c.ncols(),
                p,
                q
            )));
        }
        check_covariances("row covariance", &init.u, p)?;
        check_covariances("column covariance", &init.v, q)?;
        crate::discriminant::validate_prior(&init.prior, k)?;
        self.options.method.validate()?;

        self.components = (0..k)
            .map(|j| -> Result<MixtureComponent> {
                Ok(MixtureComponent {
                    mean: init.centers[j].clone(),
                    factors: CovFactors::normalized(init.u[j].clone(), init.v[j].clone())?,
                    proportion: init.prior[j],
                    method: self.options.method,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Responsibilities and total log-likelihood at the current parameters.
    fn e_step(&mut self) -> Result<()> {
        let densities = self
            .components
            .iter()
            .map(|c| MatrixDensity::new(&c.mean, &c.factors, c.method))
            .collect::<Result<Vec<_>>>()?;

        let data = self.stack.as_slice();
        let mut scores = DenseMatrix::from_fn(data.len(), self.components.len(), |i, k| {
            self.components[k].proportion.ln() + densities[k].log_density(&data[i])
        });
        let row_totals = normalize_log_rows(&mut scores)?;
        let log_likelihood: f64 = row_totals.iter().sum();
        if !log_likelihood.is_finite() {
            return Err(MatvarError::MixtureFailed {
                iteration: self.iteration,
                reason: format!("log-likelihood is {}", log_likelihood),
            });
        }

        let change = squared_difference(&scores, &self.responsibilities);
        self.responsibilities = scores;
        self.monitor.record(self.iteration, log_likelihood, change);
        log::debug!("EM iteration {}: logL = {:.6}", self.iteration, log_likelihood);
        Ok(())
    }

    fn m_step(&mut self) -> Result<()> {
        let n = self.stack.len() as f64;
        let base = self.options.fit_options();

        for (k, comp) in self.components.iter_mut().enumerate() {
            let tau: Vec<f64> = self.responsibilities.column(k).iter().copied().collect();
            let total: f64 = tau.iter().sum();
            comp.proportion = total / n;

            match comp.method {
                Method::Normal => {
                    let fit = fit_matrix_normal(
                        self.stack,
                        &base.clone().weights(tau).initial_v(comp.factors.v.clone()),
                    )?;
                    comp.mean = fit.mean;
                    comp.factors = fit.factors;
                }
                Method::T { nu } => {
                    let mut state = TState::from_factors(comp.mean.clone(), &comp.factors, nu, &base);
                    state.pass(self.stack, &tau, total)?;
                    comp.factors = state.factors()?;
                    comp.method = Method::T { nu: state.nu };
                    comp.mean = state.mean;
                }
            }
        }
        Ok(())
    }

    fn iterate(&mut self) -> Result<MixtureState> {
        self.iteration += 1;
        self.m_step()?;
        self.e_step()?;

        if self.monitor.is_converged() {
            Ok(MixtureState::Converged)
        } else if self.iteration >= self.options.max_iter {
            log::warn!(
                "mixture EM did not converge after {} iterations",
                self.options.max_iter
            );
            Ok(MixtureState::MaxIterReached)
        } else {
            Ok(MixtureState::Iterating)
        }
    }

    /// Finished model; `None` unless the engine reached `Converged` or
    /// `MaxIterReached`.
    pub fn into_model(self) -> Option<MixtureModel> {
        let status = match self.state {
            MixtureState::Converged => MixtureStatus::Converged,
            MixtureState::MaxIterReached => MixtureStatus::MaxIterReached,
            _ => return None,
        };
        let log_likelihood_trace = self.log_likelihood_trace();
        Some(MixtureModel {
            clusters: row_argmax(&self.responsibilities),
            components: self.components,
            responsibilities: self.responsibilities,
            log_likelihood_trace,
            status,
            n_iterations: self.iteration,
            row_mean: self.options.row_mean,
            col_mean: self.options.col_mean,
            nu_estimated: self.options.estimate_nu,
            n_obs: self.stack.len(),
            dims: self.stack.dims(),
        })
    }
}

/// Fit a finite mixture of matrix-variate normal or t distributions by EM.
///
/// Reaching the iteration cap is not an error: the model reports
/// [`MixtureStatus::MaxIterReached`]. A non-finite likelihood or a
/// covariance that is no longer positive definite ends the fit with
/// [`MatvarError::MixtureFailed`].
pub fn fit_mixture(stack: &MatrixStack, init: &MixtureInit, options: &MixtureOptions) -> Result<MixtureModel> {
    let mut engine = MixtureEngine::new(stack, init, options);
    while !engine.state().is_terminal() {
        engine.step()?;
    }
    let iteration = engine.iteration;
    engine.into_model().ok_or_else(|| MatvarError::MixtureFailed {
        iteration,
        reason: "engine stopped without a result".into(),
    })
}
