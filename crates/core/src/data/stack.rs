use crate::error::{MatvarError, Result};
use crate::types::{DenseMatrix, DenseVector};

/// An ordered stack of `n` real matrices, all of shape `p x q`.
///
/// Invariants enforced at construction: `n >= 1`, every matrix has the same
/// shape with `p, q >= 1`, and every entry is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixStack {
    rows: usize,
    cols: usize,
    matrices: Vec<DenseMatrix>,
}

impl MatrixStack {
    /// Build a stack from owned matrices.
    pub fn new(matrices: Vec<DenseMatrix>) -> Result<Self> {
        let first = matrices
            .first()
            .ok_or_else(|| MatvarError::Validation("observation stack is empty".into()))?;
        let (rows, cols) = first.shape();
        if rows == 0 || cols == 0 {
            return Err(MatvarError::Validation(format!(
                "observations must have at least one row and column, got {}x{}",
                rows, cols
            )));
        }

        for (k, m) in matrices.iter().enumerate() {
            if m.shape() != (rows, cols) {
                return Err(MatvarError::Validation(format!(
                    "observation {} is {}x{} but the stack is {}x{}",
                    k,
                    m.nrows(),
                    m.ncols(),
                    rows,
                    cols
                )));
            }
            if m.iter().any(|x| !x.is_finite()) {
                return Err(MatvarError::Validation(format!(
                    "observation {} contains non-finite values",
                    k
                )));
            }
        }

        Ok(Self {
            rows,
            cols,
            matrices,
        })
    }

    /// Promote a single matrix to a one-observation stack.
    pub fn from_matrix(matrix: DenseMatrix) -> Result<Self> {
        Self::new(vec![matrix])
    }

    /// Build a stack from a flat column-major 3-index array of length `p*q*n`:
    /// element `(i, j, k)` lives at `i + j*p + k*p*q`.
    pub fn from_array(p: usize, q: usize, n: usize, data: &[f64]) -> Result<Self> {
        let per = p * q;
        if data.len() != per * n {
            return Err(MatvarError::DimensionMismatch {
                expected: per * n,
                got: data.len(),
                context: format!("array of {} x {} x {}", p, q, n),
            });
        }
        if n == 0 {
            return Err(MatvarError::Validation("observation stack is empty".into()));
        }
        let matrices = data
            .chunks(per)
            .map(|chunk| DenseMatrix::from_column_slice(p, q, chunk))
            .collect();
        Self::new(matrices)
    }

    /// Number of rows `p` of every observation.
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns `q` of every observation.
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// `(p, q)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Fail unless the observations are `expected.0 x expected.1`. Rows are
    /// compared before columns so the error names the dimension that differs.
    pub fn ensure_dims(&self, expected: (usize, usize), what: &str) -> Result<()> {
        if self.rows != expected.0 {
            return Err(MatvarError::DimensionMismatch {
                expected: expected.0,
                got: self.rows,
                context: format!("rows of observations for the {}", what),
            });
        }
        if self.cols != expected.1 {
            return Err(MatvarError::DimensionMismatch {
                expected: expected.1,
                got: self.cols,
                context: format!("columns of observations for the {}", what),
            });
        }
        Ok(())
    }

    /// Number of observations `n`.
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Always false for a constructed stack; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn get(&self, k: usize) -> Option<&DenseMatrix> {
        self.matrices.get(k)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DenseMatrix> {
        self.matrices.iter()
    }

    pub fn as_slice(&self) -> &[DenseMatrix] {
        &self.matrices
    }

    /// A new stack holding the observations at `indices` (in that order).
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let matrices = indices
            .iter()
            .map(|&k| {
                self.matrices.get(k).cloned().ok_or_else(|| {
                    MatvarError::Validation(format!(
                        "observation index {} out of range for {} observations",
                        k,
                        self.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(matrices)
    }

    /// Column-major vectorization vec(X_k) of every observation.
    pub fn vectorized(&self) -> Vec<DenseVector> {
        self.matrices
            .iter()
            .map(|m| DenseVector::from_column_slice(m.as_slice()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a MatrixStack {
    type Item = &'a DenseMatrix;
    type IntoIter = std::slice::Iter<'a, DenseMatrix>;

    fn into_iter(self) -> Self::IntoIter {
        self.matrices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_array_layout() {
        // Two 2x2 observations laid out column-major.
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let s = MatrixStack::from_array(2, 2, 2, &data).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.dims(), (2, 2));
        assert_eq!(s.as_slice()[0][(1, 0)], 2.0);
        assert_eq!(s.as_slice()[0][(0, 1)], 3.0);
        assert_eq!(s.as_slice()[1][(1, 1)], 8.0);
    }

    #[test]
    fn test_from_array_length_mismatch() {
        let err = MatrixStack::from_array(2, 2, 2, &[1.0; 7]).unwrap_err();
        assert!(matches!(err, MatvarError::DimensionMismatch { expected: 8, got: 7, .. }));
    }

    #[test]
    fn test_rejects_ragged_and_non_finite() {
        let a = DenseMatrix::zeros(2, 3);
        let b = DenseMatrix::zeros(3, 2);
        assert!(MatrixStack::new(vec![a.clone(), b]).is_err());

        let mut c = a.clone();
        c[(0, 0)] = f64::NAN;
        assert!(MatrixStack::new(vec![a, c]).is_err());
        assert!(MatrixStack::new(Vec::new()).is_err());
    }

    #[test]
    fn test_ensure_dims_names_the_differing_side() {
        let s = MatrixStack::from_matrix(DenseMatrix::zeros(4, 3)).unwrap();
        let err = s.ensure_dims((3, 4), "model").unwrap_err();
        assert!(matches!(err, MatvarError::DimensionMismatch { expected: 3, got: 4, .. }));

        let s = MatrixStack::from_matrix(DenseMatrix::zeros(3, 5)).unwrap();
        let err = s.ensure_dims((3, 4), "model").unwrap_err();
        assert_eq!(
            err,
            MatvarError::DimensionMismatch {
                expected: 4,
                got: 5,
                context: "columns of observations for the model".into(),
            }
        );
        assert!(s.ensure_dims((3, 5), "model").is_ok());
    }

    #[test]
    fn test_single_matrix_promoted() {
        let s = MatrixStack::from_matrix(DenseMatrix::identity(3, 4)).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.dims(), (3, 4));
    }

    #[test]
    fn test_vectorized_and_select() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let s = MatrixStack::from_array(2, 3, 2, &data).unwrap();
        let v = s.vectorized();
        assert_eq!(v[1].len(), 6);
        assert_eq!(v[1][0], 6.0);
        let sub = s.select(&[1]).unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.as_slice()[0][(0, 0)], 6.0);
        assert!(s.select(&[5]).is_err());
    }
}
