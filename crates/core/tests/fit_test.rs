//! Matrix-normal and matrix-t maximum-likelihood fits through the public API.

use approx::assert_relative_eq;
use matvar_core::density::Method;
use matvar_core::fit::{fit_matrix_normal, fit_matrix_t, FitOptions};
use matvar_core::sampling::{sample_matrix_normal, sample_matrix_t};
use matvar_core::types::DenseMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn row_cov() -> DenseMatrix {
    DenseMatrix::from_row_slice(3, 3, &[2.0, 0.6, 0.0, 0.6, 1.0, 0.2, 0.0, 0.2, 0.5])
}

fn col_cov() -> DenseMatrix {
    DenseMatrix::from_row_slice(4, 4, &[
        1.0, 0.5, 0.25, 0.125,
        0.5, 1.0, 0.5, 0.25,
        0.25, 0.5, 1.0, 0.5,
        0.125, 0.25, 0.5, 1.0,
    ])
}

#[test]
fn test_flip_flop_fixed_point() {
    let mut rng = StdRng::seed_from_u64(100);
    let stack = sample_matrix_normal(&DenseMatrix::zeros(3, 4), &row_cov(), &col_cov(), 150, &mut rng).unwrap();

    let fit = fit_matrix_normal(&stack, &FitOptions::new()).unwrap();
    assert!(fit.converged);

    // One more sweep from the fitted parameters barely moves them.
    let again = fit_matrix_normal(
        &stack,
        &FitOptions::new()
            .fixed_mean(fit.mean.clone())
            .initial_v(fit.v().clone())
            .max_iterations(1),
    )
    .unwrap();
    assert!(again.factors.squared_change(&fit.factors) < 1e-6);
    assert_relative_eq!(again.log_likelihood, fit.log_likelihood, epsilon = 1e-3);
}

#[test]
fn test_normalization_convention() {
    let mut rng = StdRng::seed_from_u64(101);
    let u = row_cov() * 3.0;
    let stack = sample_matrix_normal(&DenseMatrix::zeros(3, 4), &u, &col_cov(), 400, &mut rng).unwrap();
    let fit = fit_matrix_normal(&stack, &FitOptions::new()).unwrap();

    assert_relative_eq!(fit.u()[(0, 0)], 1.0, epsilon = 1e-12);
    assert_relative_eq!(fit.v()[(0, 0)], 1.0, epsilon = 1e-12);
    // Truth: scale = 6, U[1,1] = 1 / 2.
    assert_relative_eq!(fit.scale(), 6.0, epsilon = 0.6);
    assert_relative_eq!(fit.u()[(1, 1)], 0.5, epsilon = 0.06);
    assert_relative_eq!(fit.factors.row_covariance()[(2, 2)], 1.5, epsilon = 0.2);
}

#[test]
fn test_matrix_t_fit_beats_normal_on_heavy_tails() {
    let mut rng = StdRng::seed_from_u64(102);
    let stack = sample_matrix_t(&DenseMatrix::zeros(3, 4), &row_cov(), &col_cov(), 3.0, 300, &mut rng).unwrap();

    let normal = fit_matrix_normal(&stack, &FitOptions::new()).unwrap();
    let t = fit_matrix_t(&stack, 3.0, &FitOptions::new()).unwrap();
    assert_eq!(t.method, Method::T { nu: 3.0 });
    assert!(t.log_likelihood > normal.log_likelihood);

    let estimated = fit_matrix_t(&stack, 30.0, &FitOptions::new().estimate_nu(true)).unwrap();
    assert!(estimated.log_likelihood >= t.log_likelihood - 1e-3);
    let nu = estimated.nu().unwrap();
    assert!(nu > 1.5 && nu < 6.0, "estimated nu = {}", nu);
}

#[test]
fn test_weighted_fit_equals_replicated_data() {
    let mut rng = StdRng::seed_from_u64(103);
    let stack = sample_matrix_normal(&DenseMatrix::zeros(3, 4), &row_cov(), &col_cov(), 40, &mut rng).unwrap();

    let weights: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 2.0 } else { 1.0 }).collect();
    let weighted = fit_matrix_normal(&stack, &FitOptions::new().weights(weights)).unwrap();

    let mut replicated: Vec<DenseMatrix> = stack.iter().cloned().collect();
    replicated.extend(stack.iter().step_by(2).cloned());
    let replicated = matvar_core::data::MatrixStack::new(replicated).unwrap();
    let plain = fit_matrix_normal(&replicated, &FitOptions::new()).unwrap();

    assert_relative_eq!(weighted.scale(), plain.scale(), epsilon = 1e-6);
    for (a, b) in weighted.u().iter().zip(plain.u().iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-6);
    }
    for (a, b) in weighted.mean.iter().zip(plain.mean.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
}
