use crate::diagnostics::ConvergenceCriterion;
use crate::error::{MatvarError, Result};
use crate::matrix::dense::is_spd;
use crate::types::DenseMatrix;

/// Configuration shared by the matrix-normal and matrix-t fitters.
///
/// ```
/// use matvar_core::fit::FitOptions;
///
/// let opts = FitOptions::new()
///     .row_mean(true)
///     .max_iterations(200)
///     .tolerance(1e-9);
/// assert_eq!(opts.max_iter(), 200);
/// ```
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub(crate) weights: Option<Vec<f64>>,
    pub(crate) row_mean: bool,
    pub(crate) col_mean: bool,
    pub(crate) fixed_mean: Option<DenseMatrix>,
    pub(crate) fixed_u: Option<DenseMatrix>,
    pub(crate) fixed_v: Option<DenseMatrix>,
    pub(crate) initial_u: Option<DenseMatrix>,
    pub(crate) initial_v: Option<DenseMatrix>,
    pub(crate) tol: f64,
    pub(crate) max_iter: usize,
    pub(crate) degenerate_tol: f64,
    pub(crate) criterion: ConvergenceCriterion,
    pub(crate) estimate_nu: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl FitOptions {
    /// Create options with sensible defaults: unit weights, unconstrained
    /// mean, tolerance 1e-7, at most 1000 iterations.
    pub fn new() -> Self {
        Self {
            weights: None,
            row_mean: false,
            col_mean: false,
            fixed_mean: None,
            fixed_u: None,
            fixed_v: None,
            initial_u: None,
            initial_v: None,
            tol: 1e-7,
            max_iter: 1000,
            degenerate_tol: 1e-10,
            criterion: ConvergenceCriterion::Joint,
            estimate_nu: false,
        }
    }

    /// Non-negative observation weights (need not sum to one).
    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Constrain the mean to be constant within each row.
    pub fn row_mean(mut self, on: bool) -> Self {
        self.row_mean = on;
        self
    }

    /// Constrain the mean to be constant within each column.
    pub fn col_mean(mut self, on: bool) -> Self {
        self.col_mean = on;
        self
    }

    /// Use a known mean instead of estimating it.
    pub fn fixed_mean(mut self, mean: DenseMatrix) -> Self {
        self.fixed_mean = Some(mean);
        self
    }

    /// Hold the row covariance shape fixed at `u`.
    pub fn fixed_u(mut self, u: DenseMatrix) -> Self {
        self.fixed_u = Some(u);
        self
    }

    /// Hold the column covariance shape fixed at `v`.
    pub fn fixed_v(mut self, v: DenseMatrix) -> Self {
        self.fixed_v = Some(v);
        self
    }

    /// Starting value for U (the t fitter's first E-step uses it).
    pub fn initial_u(mut self, u: DenseMatrix) -> Self {
        self.initial_u = Some(u);
        self
    }

    /// Starting value for V (default identity).
    pub fn initial_v(mut self, v: DenseMatrix) -> Self {
        self.initial_v = Some(v);
        self
    }

    /// Convergence tolerance (default: 1e-7).
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Maximum iterations (default: 1000).
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    /// Cells whose weighted standard deviation falls below this are degenerate
    /// (default: 1e-10).
    pub fn degenerate_tolerance(mut self, tol: f64) -> Self {
        self.degenerate_tol = tol;
        self
    }

    pub fn criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Estimate the degrees of freedom of the t model as well (ECME step).
    pub fn estimate_nu(mut self, on: bool) -> Self {
        self.estimate_nu = on;
        self
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn is_row_mean(&self) -> bool {
        self.row_mean
    }

    pub fn is_col_mean(&self) -> bool {
        self.col_mean
    }

    pub fn estimates_nu(&self) -> bool {
        self.estimate_nu
    }

    /// Validate against a stack of `n` observations of shape `p x q` and
    /// return the effective weights.
    pub(crate) fn resolve_weights(&self, n: usize, p: usize, q: usize) -> Result<Vec<f64>> {
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(MatvarError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.tol
            )));
        }
        if self.max_iter == 0 {
            return Err(MatvarError::InvalidParameter(
                "max_iterations must be at least 1".into(),
            ));
        }

        check_square("fixed U", self.fixed_u.as_ref(), p)?;
        check_square("initial U", self.initial_u.as_ref(), p)?;
        check_square("fixed V", self.fixed_v.as_ref(), q)?;
        check_square("initial V", self.initial_v.as_ref(), q)?;
        if let Some(m) = &self.fixed_mean {
            if m.shape() != (p, q) {
                return Err(MatvarError::DimensionMismatch {
                    expected: p * q,
                    got: m.len(),
                    context: format!("fixed mean is {}x{}, data is {}x{}", m.nrows(), m.ncols(), p, q),
                });
            }
        }

        let weights = match &self.weights {
            None => vec![1.0; n],
            Some(w) => {
                if w.len() != n {
                    return Err(MatvarError::DimensionMismatch {
                        expected: n,
                        got: w.len(),
                        context: "observation weights".into(),
                    });
                }
                if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                    return Err(MatvarError::Validation(
                        "weights must be finite and non-negative".into(),
                    ));
                }
                w.clone()
            }
        };
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(MatvarError::Validation("weights sum to zero".into()));
        }
        Ok(weights)
    }
}

fn check_square(name: &str, m: Option<&DenseMatrix>, dim: usize) -> Result<()> {
    let Some(m) = m else {
        return Ok(());
    };
    if m.shape() != (dim, dim) {
        return Err(MatvarError::DimensionMismatch {
            expected: dim,
            got: m.nrows(),
            context: format!("{} should be {}x{} but is {}x{}", name, dim, dim, m.nrows(), m.ncols()),
        });
    }
    if !is_spd(m) {
        return Err(MatvarError::SingularMatrix {
            context: format!("{} is not symmetric positive definite", name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_are_ones() {
        let w = FitOptions::new().resolve_weights(3, 2, 2).unwrap();
        assert_eq!(w, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_bad_weights() {
        let opts = FitOptions::new().weights(vec![1.0, -1.0]);
        assert!(matches!(opts.resolve_weights(2, 2, 2), Err(MatvarError::Validation(_))));
        let opts = FitOptions::new().weights(vec![1.0]);
        assert!(matches!(
            opts.resolve_weights(2, 2, 2),
            Err(MatvarError::DimensionMismatch { .. })
        ));
        let opts = FitOptions::new().weights(vec![0.0, 0.0]);
        assert!(opts.resolve_weights(2, 2, 2).is_err());
    }

    #[test]
    fn test_fixed_factor_checked() {
        let opts = FitOptions::new().fixed_u(DenseMatrix::identity(3, 3));
        assert!(opts.resolve_weights(4, 2, 2).is_err());

        let not_pd = DenseMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let opts = FitOptions::new().fixed_v(not_pd);
        assert!(matches!(
            opts.resolve_weights(4, 2, 2),
            Err(MatvarError::SingularMatrix { .. })
        ));
    }
}
