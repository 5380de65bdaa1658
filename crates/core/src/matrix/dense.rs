use logsumexp::LogSumExp;
use nalgebra::DMatrix;

use crate::error::{MatvarError, Result};

/// Cholesky-based factorization of a symmetric positive-definite matrix,
/// keeping the pieces every density evaluation needs.
#[derive(Debug, Clone)]
pub struct SpdFactor {
    /// Lower-triangular L with A = L * L^T.
    pub lower: DMatrix<f64>,
    /// A^{-1}.
    pub inverse: DMatrix<f64>,
    /// log|A| = 2 * sum(log(diag(L))).
    pub log_det: f64,
}

impl SpdFactor {
    /// Factor `a`, reporting `context` in the error if `a` is not SPD.
    pub fn new(a: &DMatrix<f64>, context: &str) -> Result<Self> {
        let chol = a
            .clone()
            .cholesky()
            .ok_or_else(|| MatvarError::SingularMatrix {
                context: context.to_string(),
            })?;
        let lower = chol.l();
        let log_det = 2.0 * (0..lower.nrows()).map(|i| lower[(i, i)].ln()).sum::<f64>();
        if !log_det.is_finite() {
            return Err(MatvarError::SingularMatrix {
                context: context.to_string(),
            });
        }
        let inverse = chol.inverse();
        Ok(Self {
            lower,
            inverse,
            log_det,
        })
    }
}

/// Compute the Cholesky factorization of a symmetric positive-definite matrix.
/// Returns the lower-triangular factor L such that A = L * L^T.
pub fn cholesky_lower(a: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    let chol = a
        .clone()
        .cholesky()
        .ok_or_else(|| MatvarError::SingularMatrix {
            context: context.to_string(),
        })?;
    Ok(chol.l())
}

/// Compute the log-determinant of an SPD matrix via Cholesky: log|A| = 2 * sum(log(diag(L))).
pub fn log_determinant_spd(a: &DMatrix<f64>, context: &str) -> Result<f64> {
    Ok(SpdFactor::new(a, context)?.log_det)
}

/// Compute the inverse of an SPD matrix via Cholesky.
pub fn inverse_spd(a: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    Ok(SpdFactor::new(a, context)?.inverse)
}

/// Compute the trace of a matrix.
pub fn trace(a: &DMatrix<f64>) -> f64 {
    (0..a.nrows().min(a.ncols())).map(|i| a[(i, i)]).sum()
}

/// tr(A * B) without forming the product.
pub fn trace_of_product(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    let mut tr = 0.0;
    for i in 0..a.nrows() {
        for k in 0..a.ncols() {
            tr += a[(i, k)] * b[(k, i)];
        }
    }
    tr
}

/// Sum of squared element-wise differences, sum((A - B)^2).
pub fn squared_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Replace A by (A + A^T) / 2 to wash out round-off asymmetry.
pub fn symmetrize(a: &mut DMatrix<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (a[(i, j)] + a[(j, i)]);
            a[(i, j)] = avg;
            a[(j, i)] = avg;
        }
    }
}

/// Check that a matrix is square, symmetric (to a relative tolerance) and
/// admits a Cholesky factorization.
pub fn is_spd(a: &DMatrix<f64>) -> bool {
    if a.nrows() != a.ncols() || a.iter().any(|x| !x.is_finite()) {
        return false;
    }
    let scale = a.iter().fold(0.0_f64, |m, x| m.max(x.abs())).max(1.0);
    for i in 0..a.nrows() {
        for j in (i + 1)..a.ncols() {
            if (a[(i, j)] - a[(j, i)]).abs() > 1e-8 * scale {
                return false;
            }
        }
    }
    a.clone().cholesky().is_some()
}

/// Turn each row of log-scores into probabilities in place.
///
/// Returns the log-sum-exp of every row, i.e. the log of the unnormalized
/// row total. A row without a finite total (every score `-inf`, or a NaN or
/// `+inf` entry) cannot be normalized and is an error.
pub fn normalize_log_rows(scores: &mut DMatrix<f64>) -> Result<Vec<f64>> {
    let mut log_totals = Vec::with_capacity(scores.nrows());
    for (i, mut row) in scores.row_iter_mut().enumerate() {
        let usable = row.iter().all(|&x| x.is_finite() || x == f64::NEG_INFINITY)
            && row.iter().any(|x| x.is_finite());
        // -inf entries contribute nothing to the total.
        let total = if usable {
            row.iter().filter(|x| x.is_finite()).ln_sum_exp()
        } else {
            f64::NAN
        };
        if !total.is_finite() {
            return Err(MatvarError::Validation(format!(
                "row {} has no finite log-score to normalize",
                i
            )));
        }
        for x in row.iter_mut() {
            *x = (*x - total).exp();
        }
        log_totals.push(total);
    }
    Ok(log_totals)
}

/// Index of the largest entry of each row; ties go to the first.
pub fn row_argmax(m: &DMatrix<f64>) -> Vec<usize> {
    m.row_iter()
        .map(|row| {
            let mut best = 0;
            for (k, &x) in row.iter().enumerate() {
                if x > row[best] {
                    best = k;
                }
            }
            best
        })
        .collect()
}
