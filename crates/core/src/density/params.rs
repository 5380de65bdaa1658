use crate::error::{MatvarError, Result};
use crate::matrix::dense::squared_difference;
use crate::types::DenseMatrix;

/// Distribution family of a fitted model. The t variant carries its degrees
/// of freedom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    Normal,
    T { nu: f64 },
}

impl Method {
    /// Degrees of freedom, `None` for the normal family.
    pub fn nu(&self) -> Option<f64> {
        match *self {
            Method::Normal => None,
            Method::T { nu } => Some(nu),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Normal => "normal",
            Method::T { .. } => "t",
        }
    }

    /// nu must be positive and finite.
    pub fn validate(&self) -> Result<()> {
        if let Method::T { nu } = *self {
            if !(nu.is_finite() && nu > 0.0) {
                return Err(MatvarError::InvalidParameter(format!(
                    "degrees of freedom must be positive and finite, got {}",
                    nu
                )));
            }
        }
        Ok(())
    }
}

/// Row/column covariance factors of a matrix-variate law.
///
/// Normalized so that `u[(0,0)] == 1` and `v[(0,0)] == 1`; `scale` carries
/// the overall variance, i.e. Cov(vec X) = scale * (V (x) U).
#[derive(Debug, Clone, PartialEq)]
pub struct CovFactors {
    pub u: DenseMatrix,
    pub v: DenseMatrix,
    pub scale: f64,
}

impl CovFactors {
    /// U = I_p, V = I_q, scale = 1.
    pub fn identity(p: usize, q: usize) -> Self {
        Self {
            u: DenseMatrix::identity(p, p),
            v: DenseMatrix::identity(q, q),
            scale: 1.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Split an unnormalized pair (U, V) into the normalized convention,
    /// moving U[0,0] * V[0,0] into `scale`.
    pub fn normalized(u: DenseMatrix, v: DenseMatrix) -> Result<Self> {
        let (u00, v00) = (u[(0, 0)], v[(0, 0)]);
        if !(u00 > 0.0 && v00 > 0.0 && u00.is_finite() && v00.is_finite()) {
            return Err(MatvarError::SingularMatrix {
                context: format!(
                    "normalizing covariance factors (U[0,0] = {}, V[0,0] = {})",
                    u00, v00
                ),
            });
        }
        Ok(Self {
            u: u / u00,
            v: v / v00,
            scale: u00 * v00,
        })
    }

    /// The unnormalized row covariance scale * U.
    pub fn row_covariance(&self) -> DenseMatrix {
        &self.u * self.scale
    }

    /// Covariance of vec(X): scale * (V (x) U).
    pub fn vec_covariance(&self) -> DenseMatrix {
        self.v.kronecker(&self.u) * self.scale
    }

    /// Sum of squared changes against another pair, including the scale.
    pub fn squared_change(&self, other: &CovFactors) -> f64 {
        squared_difference(&self.u, &other.u)
            + squared_difference(&self.v, &other.v)
            + (self.scale - other.scale).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalized_preserves_kronecker_product() {
        let u = DenseMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let v = DenseMatrix::from_row_slice(2, 2, &[0.5, 0.1, 0.1, 2.0]);
        let raw = v.kronecker(&u);
        let f = CovFactors::normalized(u, v).unwrap();
        assert_relative_eq!(f.u[(0, 0)], 1.0);
        assert_relative_eq!(f.v[(0, 0)], 1.0);
        assert_relative_eq!(f.scale, 2.0);
        let rebuilt = f.vec_covariance();
        for (a, b) in rebuilt.iter().zip(raw.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_method_validation() {
        assert!(Method::Normal.validate().is_ok());
        assert!(Method::T { nu: 3.0 }.validate().is_ok());
        assert!(Method::T { nu: 0.0 }.validate().is_err());
        assert!(Method::T { nu: f64::INFINITY }.validate().is_err());
        assert_eq!(Method::T { nu: 3.0 }.nu(), Some(3.0));
        assert_eq!(Method::Normal.name(), "normal");
    }
}
