//! Weighted moment computations shared by the fitters.

use crate::data::MatrixStack;
use crate::error::{MatvarError, Result};
use crate::matrix::dense::symmetrize;
use crate::types::DenseMatrix;

/// Weighted mean sum_i w_i X_i / sum_i w_i, then the row/column constraints.
pub(crate) fn weighted_mean(
    stack: &MatrixStack,
    weights: &[f64],
    row_mean: bool,
    col_mean: bool,
) -> DenseMatrix {
    let (p, q) = stack.dims();
    let mut mean = DenseMatrix::zeros(p, q);
    let mut total = 0.0;
    for (x, &w) in stack.iter().zip(weights) {
        if w == 0.0 {
            continue;
        }
        mean += x * w;
        total += w;
    }
    if total > 0.0 {
        mean /= total;
    }
    constrain_mean(&mut mean, row_mean, col_mean);
    mean
}

/// Replace each row by its average (`row_mean`) and/or each column by its
/// average (`col_mean`). Both together give the grand mean everywhere.
fn constrain_mean(mean: &mut DenseMatrix, row_mean: bool, col_mean: bool) {
    let (p, q) = mean.shape();
    if row_mean {
        for i in 0..p {
            let avg = mean.row(i).sum() / q as f64;
            mean.row_mut(i).fill(avg);
        }
    }
    if col_mean {
        for j in 0..q {
            let avg = mean.column(j).sum() / p as f64;
            mean.column_mut(j).fill(avg);
        }
    }
}

/// Fail when any cell's weighted standard deviation of the residuals is
/// below `tol`.
///
/// Offending cells are reported as 0-based column-major linear indices.
pub(crate) fn check_degenerate(residuals: &[DenseMatrix], weights: &[f64], tol: f64) -> Result<()> {
    let Some(first) = residuals.first() else {
        return Ok(());
    };
    let (p, q) = first.shape();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(MatvarError::Validation("weights sum to zero".into()));
    }

    let mut second = DenseMatrix::zeros(p, q);
    for (r, &w) in residuals.iter().zip(weights) {
        for (acc, x) in second.iter_mut().zip(r.iter()) {
            *acc += w * x * x;
        }
    }
    second /= total;

    let positions: Vec<usize> = second
        .iter()
        .enumerate()
        .filter(|(_, var)| var.sqrt() < tol)
        .map(|(idx, _)| idx)
        .collect();

    if positions.is_empty() {
        Ok(())
    } else {
        Err(MatvarError::DegenerateVariable { positions })
    }
}

/// sum_i w_i R_i V^{-1} R_i^T   (p x p)
pub(crate) fn row_scatter(residuals: &[DenseMatrix], weights: &[f64], v_inv: &DenseMatrix) -> DenseMatrix {
    let p = residuals.first().map_or(0, |r| r.nrows());
    let mut acc = DenseMatrix::zeros(p, p);
    for (r, &w) in residuals.iter().zip(weights) {
        if w == 0.0 {
            continue;
        }
        let rv = r * v_inv;
        acc.gemm(w, &rv, &r.transpose(), 1.0);
    }
    symmetrize(&mut acc);
    acc
}

/// sum_i w_i R_i^T U^{-1} R_i   (q x q)
pub(crate) fn col_scatter(residuals: &[DenseMatrix], weights: &[f64], u_inv: &DenseMatrix) -> DenseMatrix {
    let q = residuals.first().map_or(0, |r| r.ncols());
    let mut acc = DenseMatrix::zeros(q, q);
    for (r, &w) in residuals.iter().zip(weights) {
        if w == 0.0 {
            continue;
        }
        let ur = u_inv * r;
        acc.gemm(w, &r.transpose(), &ur, 1.0);
    }
    symmetrize(&mut acc);
    acc
}

/// Residuals X_i - M.
pub(crate) fn residuals(stack: &MatrixStack, mean: &DenseMatrix) -> Vec<DenseMatrix> {
    stack.iter().map(|x| x - mean).collect()
}
