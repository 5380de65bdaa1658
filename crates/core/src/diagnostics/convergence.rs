/// Stopping rule applied by [`ConvergenceMonitor`] after every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvergenceCriterion {
    /// Squared parameter change and relative log-likelihood change both
    /// below tolerance.
    #[default]
    Joint,
    /// Squared parameter change below tolerance.
    Parameters,
    /// Raw successive log-likelihood difference below tolerance.
    LogLikelihood,
    /// Aitken-extrapolated limit of the log-likelihood within tolerance of
    /// the current value.
    Aitken,
}

/// Monitors convergence of an iterative fit.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    tol: f64,
    max_iter: usize,
    criterion: ConvergenceCriterion,
    history: Vec<IterationRecord>,
}

/// One recorded iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub log_likelihood: f64,
    /// Sum of squared parameter changes against the previous iterate.
    pub param_change: f64,
    /// |l_k - l_{k-1}| / (1 + |l_k|), infinite on the first iteration.
    pub logl_change: f64,
}

impl ConvergenceMonitor {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self::with_criterion(tol, max_iter, ConvergenceCriterion::default())
    }

    pub fn with_criterion(tol: f64, max_iter: usize, criterion: ConvergenceCriterion) -> Self {
        Self {
            tol,
            max_iter,
            criterion,
            history: Vec::new(),
        }
    }

    /// Record a new iteration.
    pub fn record(&mut self, iteration: usize, log_likelihood: f64, param_change: f64) {
        let logl_change = if let Some(prev) = self.history.last() {
            (log_likelihood - prev.log_likelihood).abs() / (1.0 + log_likelihood.abs())
        } else {
            f64::INFINITY
        };

        self.history.push(IterationRecord {
            iteration,
            log_likelihood,
            param_change,
            logl_change,
        });
    }

    /// Check if the stopping criterion is met.
    pub fn is_converged(&self) -> bool {
        let Some(last) = self.history.last() else {
            return false;
        };
        match self.criterion {
            ConvergenceCriterion::Joint => {
                last.param_change < self.tol && last.logl_change < self.tol
            }
            ConvergenceCriterion::Parameters => last.param_change < self.tol,
            ConvergenceCriterion::LogLikelihood => {
                let n = self.history.len();
                n >= 2
                    && (last.log_likelihood - self.history[n - 2].log_likelihood).abs() < self.tol
            }
            ConvergenceCriterion::Aitken => match self.aitken_limit() {
                Some((limit, previous)) => (limit - previous).abs() < self.tol,
                None => false,
            },
        }
    }

    /// Aitken extrapolation from the last three log-likelihoods
    /// l_{k-1}, l_k, l_{k+1}:
    ///
    /// ```text
    /// a     = (l_{k+1} - l_k) / (l_k - l_{k-1})
    /// l_inf = l_k + (l_{k+1} - l_k) / (1 - a)
    /// ```
    ///
    /// Returns `(l_inf, l_k)`, or `None` with fewer than three iterations or
    /// when the sequence is not contracting (a >= 1).
    pub fn aitken_limit(&self) -> Option<(f64, f64)> {
        let n = self.history.len();
        if n < 3 {
            return None;
        }
        let l0 = self.history[n - 3].log_likelihood;
        let l1 = self.history[n - 2].log_likelihood;
        let l2 = self.history[n - 1].log_likelihood;

        let step = l2 - l1;
        let prev_step = l1 - l0;
        if step == 0.0 {
            return Some((l2, l1));
        }
        if prev_step == 0.0 {
            return None;
        }
        let a = step / prev_step;
        if !a.is_finite() || a >= 1.0 {
            return None;
        }
        Some((l1 + step / (1.0 - a), l1))
    }

    /// Check if maximum iterations reached.
    pub fn max_reached(&self) -> bool {
        self.history.len() >= self.max_iter
    }

    /// Get the last log-likelihood value.
    pub fn last_logl(&self) -> Option<f64> {
        self.history.last().map(|r| r.log_likelihood)
    }

    /// Number of iterations recorded.
    pub fn n_iterations(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<IterationRecord> {
        self.history
    }
}
