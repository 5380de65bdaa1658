//! Random generation of matrix-variate normal, matrix-variate t and Wishart
//! variates.
//!
//! All samplers take a caller-supplied RNG so results are reproducible with
//! a seeded `StdRng`.

use rand::Rng;
use rand_distr::{ChiSquared, Distribution, Gamma, StandardNormal};

use crate::data::MatrixStack;
use crate::error::{MatvarError, Result};
use crate::matrix::dense::cholesky_lower;
use crate::types::DenseMatrix;

fn standard_normal_matrix<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> DenseMatrix {
    DenseMatrix::from_fn(rows, cols, |_, _| rng.sample::<f64, _>(StandardNormal))
}

fn check_factors(mean: &DenseMatrix, u: &DenseMatrix, v: &DenseMatrix) -> Result<()> {
    let (p, q) = mean.shape();
    if u.shape() != (p, p) || v.shape() != (q, q) {
        return Err(MatvarError::DimensionMismatch {
            expected: p,
            got: u.nrows(),
            context: format!(
                "U is {}x{} and V is {}x{} for a {}x{} mean",
                u.nrows(),
                u.ncols(),
                v.nrows(),
                v.ncols(),
                p,
                q
            ),
        });
    }
    Ok(())
}

/// Draw `n` observations X = M + A Z B^T with U = A A^T, V = B B^T and Z
/// standard normal, so that Cov(vec X) = V (x) U.
pub fn sample_matrix_normal<R: Rng + ?Sized>(
    mean: &DenseMatrix,
    u: &DenseMatrix,
    v: &DenseMatrix,
    n: usize,
    rng: &mut R,
) -> Result<MatrixStack> {
    check_factors(mean, u, v)?;
    let a = cholesky_lower(u, "row covariance U")?;
    let b_t = cholesky_lower(v, "column covariance V")?.transpose();
    let (p, q) = mean.shape();

    let draws = (0..n)
        .map(|_| mean + &a * standard_normal_matrix(p, q, rng) * &b_t)
        .collect();
    MatrixStack::new(draws)
}

/// Draw `n` matrix-t observations with `nu` degrees of freedom:
/// X = M + A Z B^T / sqrt(w) with w ~ Gamma(nu/2, rate nu/2).
pub fn sample_matrix_t<R: Rng + ?Sized>(
    mean: &DenseMatrix,
    u: &DenseMatrix,
    v: &DenseMatrix,
    nu: f64,
    n: usize,
    rng: &mut R,
) -> Result<MatrixStack> {
    check_factors(mean, u, v)?;
    if !(nu.is_finite() && nu > 0.0) {
        return Err(MatvarError::InvalidParameter(format!(
            "degrees of freedom must be positive and finite, got {}",
            nu
        )));
    }
    let gamma = Gamma::new(0.5 * nu, 2.0 / nu)
        .map_err(|e| MatvarError::InvalidParameter(format!("gamma mixing law: {}", e)))?;
    let a = cholesky_lower(u, "row covariance U")?;
    let b_t = cholesky_lower(v, "column covariance V")?.transpose();
    let (p, q) = mean.shape();

    let draws = (0..n)
        .map(|_| {
            let w: f64 = gamma.sample(rng);
            mean + &a * standard_normal_matrix(p, q, rng) * &b_t / w.sqrt()
        })
        .collect();
    MatrixStack::new(draws)
}

/// Upper-triangular Bartlett factor Z of a standard Wishart(nu, I_p):
/// Z[j,j] = sqrt(chi^2_{nu-j}), Z[i,j] ~ N(0,1) for i < j, so Z^T Z ~ W_p(nu, I).
fn standard_wishart_factor<R: Rng + ?Sized>(nu: f64, p: usize, rng: &mut R) -> Result<DenseMatrix> {
    if p == 0 || !nu.is_finite() || nu < p as f64 {
        return Err(MatvarError::InvalidParameter(format!(
            "inconsistent degrees of freedom ({}) and dimension ({})",
            nu, p
        )));
    }
    let mut z = DenseMatrix::zeros(p, p);
    for j in 0..p {
        let chi = ChiSquared::new(nu - j as f64)
            .map_err(|e| MatvarError::InvalidParameter(format!("chi-squared law: {}", e)))?;
        z[(j, j)] = chi.sample(rng).sqrt();
        for i in 0..j {
            z[(i, j)] = rng.sample(StandardNormal);
        }
    }
    Ok(z)
}

/// Upper-triangular C with C^T C ~ Wishart(nu, sigma), without forming the
/// Wishart matrix itself.
pub fn sample_chol_wishart<R: Rng + ?Sized>(nu: f64, sigma: &DenseMatrix, rng: &mut R) -> Result<DenseMatrix> {
    let r = cholesky_lower(sigma, "Wishart scale matrix")?.transpose();
    let z = standard_wishart_factor(nu, sigma.nrows(), rng)?;
    Ok(z * r)
}

/// A Wishart(nu, sigma) draw.
pub fn sample_wishart<R: Rng + ?Sized>(nu: f64, sigma: &DenseMatrix, rng: &mut R) -> Result<DenseMatrix> {
    let c = sample_chol_wishart(nu, sigma, rng)?;
    Ok(c.transpose() * c)
}

/// Inverse of the Cholesky factor of a Wishart(nu, sigma^{-1}) draw.
///
/// The returned upper-triangular D satisfies D D^T ~ InverseWishart(nu, sigma).
pub fn sample_inv_chol_wishart<R: Rng + ?Sized>(
    nu: f64,
    sigma: &DenseMatrix,
    rng: &mut R,
) -> Result<DenseMatrix> {
    let sigma_inv = crate::matrix::dense::inverse_spd(sigma, "inverse Wishart scale matrix")?;
    let c = sample_chol_wishart(nu, &sigma_inv, rng)?;
    c.solve_upper_triangular(&DenseMatrix::identity(c.nrows(), c.ncols()))
        .ok_or_else(|| MatvarError::SingularMatrix {
            context: "inverting Wishart Cholesky factor".into(),
        })
}
