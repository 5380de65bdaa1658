//! End-to-end discriminant analysis on simulated 3x4 matrix observations.
//!
//! Two groups, U = V = I, means 0 and 1 in every cell.

use approx::assert_relative_eq;
use matvar_core::data::{GroupLabels, MatrixStack};
use matvar_core::density::Method;
use matvar_core::discriminant::{fit_lda, fit_qda, DiscriminantBuilder, GroupCovariance};
use matvar_core::error::MatvarError;
use matvar_core::sampling::{sample_matrix_normal, sample_matrix_t};
use matvar_core::types::DenseMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn simulate(n_per_group: usize, seed: u64) -> (MatrixStack, GroupLabels) {
    let mut rng = StdRng::seed_from_u64(seed);
    let u = DenseMatrix::identity(3, 3);
    let v = DenseMatrix::identity(4, 4);
    let g0 = sample_matrix_normal(&DenseMatrix::zeros(3, 4), &u, &v, n_per_group, &mut rng).unwrap();
    let g1 = sample_matrix_normal(&DenseMatrix::from_element(3, 4, 1.0), &u, &v, n_per_group, &mut rng).unwrap();

    let mut all: Vec<DenseMatrix> = g0.iter().cloned().collect();
    all.extend(g1.iter().cloned());
    let mut names = vec!["zero"; n_per_group];
    names.extend(vec!["one"; n_per_group]);
    (MatrixStack::new(all).unwrap(), GroupLabels::new(&names))
}

fn accuracy(predicted: &[usize], truth: &[usize]) -> f64 {
    let hits = predicted.iter().zip(truth).filter(|(a, b)| a == b).count();
    hits as f64 / truth.len() as f64
}

#[test]
fn test_lda_round_trip() {
    let (train, labels) = simulate(30, 2024);
    let model = fit_lda(&train, &labels, None, Method::Normal).unwrap();

    assert!(model.converged);
    assert_eq!(model.levels, vec!["zero".to_string(), "one".to_string()]);
    let GroupCovariance::Shared(factors) = &model.covariance else {
        panic!("LDA must share its covariance");
    };
    assert_relative_eq!(factors.scale, 1.0, epsilon = 0.3);
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(factors.u[(i, j)], expected, epsilon = 0.35);
        }
    }
    for i in 0..4 {
        assert_relative_eq!(factors.v[(i, i)], 1.0, epsilon = 0.35);
    }

    let (test, test_labels) = simulate(200, 7);
    let pred = model.predict(Some(&test), None).unwrap();
    let acc = accuracy(&pred.class_codes, test_labels.codes());
    assert!(acc > 0.9, "held-out accuracy {}", acc);
}

#[test]
fn test_posterior_rows_sum_to_one() {
    let (train, labels) = simulate(30, 11);
    let (test, _) = simulate(25, 12);
    for model in [
        fit_lda(&train, &labels, None, Method::Normal).unwrap(),
        fit_qda(&train, &labels, None, Method::Normal).unwrap(),
        fit_qda(&train, &labels, None, Method::T { nu: 4.0 }).unwrap(),
    ] {
        let pred = model.predict(Some(&test), Some(&[0.9, 0.1])).unwrap();
        assert_eq!(pred.posterior.shape(), (50, 2));
        for row in pred.posterior.row_iter() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-8);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }
}

#[test]
fn test_predict_defaults_to_training_data() {
    let (train, labels) = simulate(30, 5);
    let model = fit_qda(&train, &labels, None, Method::Normal).unwrap();
    let pred = model.predict(None, None).unwrap();
    assert_eq!(pred.classes.len(), 60);
    assert!(accuracy(&pred.class_codes, labels.codes()) > 0.9);

    let single = model.predict_matrix(&DenseMatrix::from_element(3, 4, 1.2), None).unwrap();
    assert_eq!(single.classes, vec!["one".to_string()]);
}

#[test]
fn test_prediction_dimension_mismatch() {
    let (train, labels) = simulate(20, 3);
    let model = fit_lda(&train, &labels, None, Method::Normal).unwrap();
    let wrong = MatrixStack::from_matrix(DenseMatrix::zeros(4, 3)).unwrap();
    assert!(matches!(
        model.predict(Some(&wrong), None),
        Err(MatvarError::DimensionMismatch { expected: 3, got: 4, .. })
    ));
    assert!(matches!(
        model.predict(None, Some(&[0.3, 0.3])),
        Err(MatvarError::Validation(_))
    ));
}

fn with_constant_cell(seed: u64) -> (MatrixStack, GroupLabels) {
    let (stack, labels) = simulate(15, seed);
    let matrices = stack
        .iter()
        .zip(labels.codes())
        .map(|(x, &g)| {
            let mut x = x.clone();
            x[(1, 2)] = 5.0 + g as f64;
            x
        })
        .collect();
    (MatrixStack::new(matrices).unwrap(), labels)
}

#[test]
fn test_degenerate_cell_named_by_position() {
    let (stack, labels) = with_constant_cell(8);
    // (1, 2) in a 3x4 matrix is column-major index 7.
    for result in [
        fit_lda(&stack, &labels, None, Method::Normal),
        fit_qda(&stack, &labels, None, Method::Normal),
        fit_qda(&stack, &labels, None, Method::T { nu: 5.0 }),
    ] {
        assert_eq!(result.unwrap_err(), MatvarError::DegenerateVariable { positions: vec![7] });
    }
}

#[test]
fn test_invalid_prior_rejected_before_fitting() {
    // The data are degenerate too, but the prior is checked first.
    let (stack, labels) = with_constant_cell(9);
    for prior in [vec![0.7, 0.7], vec![1.2, -0.2], vec![1.0]] {
        assert!(matches!(
            fit_lda(&stack, &labels, Some(&prior), Method::Normal),
            Err(MatvarError::Validation(_))
        ));
        assert!(matches!(
            fit_qda(&stack, &labels, Some(&prior), Method::Normal),
            Err(MatvarError::Validation(_))
        ));
    }
}

#[test]
fn test_t_discriminants_classify() {
    let (train, labels) = simulate(30, 21);
    let (test, test_labels) = simulate(100, 22);

    let lda = fit_lda(&train, &labels, None, Method::T { nu: 10.0 }).unwrap();
    assert!(lda.converged);
    let qda = DiscriminantBuilder::new()
        .data(&train)
        .labels(&labels)
        .method(Method::T { nu: 10.0 })
        .group_nu(vec![5.0, 20.0])
        .fit_qda()
        .unwrap();
    assert_eq!(qda.methods[1], Method::T { nu: 20.0 });

    for model in [lda, qda] {
        let pred = model.predict(Some(&test), None).unwrap();
        assert!(accuracy(&pred.class_codes, test_labels.codes()) > 0.85);
    }
}

#[test]
fn test_log_likelihood_bookkeeping() {
    let (train, labels) = simulate(30, 31);
    let lda = fit_lda(&train, &labels, None, Method::Normal).unwrap();
    let qda = fit_qda(&train, &labels, None, Method::Normal).unwrap();

    let l_lda = lda.log_likelihood().unwrap();
    let l_qda = qda.log_likelihood().unwrap();
    // (6 + 10 - 1) + 2 * 12 - 1
    assert_relative_eq!(l_lda.df, 38.0);
    // 2 * (6 + 10 - 1) + 2 * 12 - 1
    assert_relative_eq!(l_qda.df, 53.0);
    assert_eq!(l_lda.n_obs, 60);
    // Separate covariances can only fit the training data better.
    assert!(l_qda.value >= l_lda.value - 1e-6);

    let row = DiscriminantBuilder::new()
        .data(&train)
        .labels(&labels)
        .row_mean(true)
        .fit_lda()
        .unwrap();
    assert_relative_eq!(row.log_likelihood().unwrap().df, 15.0 + 12.0 - 1.0);
}

#[test]
fn test_small_scale_data_is_not_degenerate() {
    // Same design as `simulate`, expressed in units 200 times larger: the
    // within-group standard deviation is 0.005.
    let shrink = |(stack, labels): (MatrixStack, GroupLabels)| {
        let scaled = stack.iter().map(|x| x * 0.005).collect();
        (MatrixStack::new(scaled).unwrap(), labels)
    };
    let (train, labels) = shrink(simulate(30, 2024));
    let (test, test_labels) = shrink(simulate(200, 7));

    let lda = fit_lda(&train, &labels, None, Method::Normal).unwrap();
    assert!(lda.converged);
    let GroupCovariance::Shared(factors) = &lda.covariance else {
        panic!("LDA must share its covariance");
    };
    assert_relative_eq!(factors.scale, 0.005 * 0.005, max_relative = 0.3);
    let pred = lda.predict(Some(&test), None).unwrap();
    assert!(accuracy(&pred.class_codes, test_labels.codes()) > 0.9);

    let qda = fit_qda(&train, &labels, None, Method::Normal).unwrap();
    assert!(qda.converged);
}

#[test]
fn test_far_observations_get_proper_posteriors() {
    let (train, labels) = simulate(30, 41);
    let lda = fit_lda(&train, &labels, None, Method::Normal).unwrap();
    // Both points lie far beyond the "one" mean: the squared distances overflow
    // (1e160) or swamp their own difference (1e100).
    for far in [1e100, 1e160] {
        let pred = lda.predict_matrix(&DenseMatrix::from_element(3, 4, far), None).unwrap();
        assert_relative_eq!(pred.posterior.row(0).sum(), 1.0, epsilon = 1e-12);
        assert_eq!(pred.classes, vec!["one".to_string()]);
    }

    // Per-group covariances have no common term to drop: an observation whose
    // log-density is -inf under every group is an error, not a posterior.
    let qda = fit_qda(&train, &labels, None, Method::Normal).unwrap();
    let err = qda
        .predict_matrix(&DenseMatrix::from_element(3, 4, 1e160), None)
        .unwrap_err();
    assert!(matches!(err, MatvarError::Validation(_)));
}

#[test]
fn test_pooled_t_estimates_nu() {
    let mut rng = StdRng::seed_from_u64(51);
    let u = DenseMatrix::identity(3, 3);
    let v = DenseMatrix::identity(4, 4);
    let g0 = sample_matrix_t(&DenseMatrix::zeros(3, 4), &u, &v, 4.0, 200, &mut rng).unwrap();
    let g1 = sample_matrix_t(&DenseMatrix::from_element(3, 4, 2.0), &u, &v, 4.0, 200, &mut rng).unwrap();
    let mut all: Vec<DenseMatrix> = g0.iter().cloned().collect();
    all.extend(g1.iter().cloned());
    let mut names = vec!["zero"; 200];
    names.extend(vec!["two"; 200]);
    let (stack, labels) = (MatrixStack::new(all).unwrap(), GroupLabels::new(&names));

    let model = DiscriminantBuilder::new()
        .data(&stack)
        .labels(&labels)
        .method(Method::T { nu: 10.0 })
        .estimate_nu(true)
        .fit_lda()
        .unwrap();

    assert!(model.nu_estimated);
    assert_eq!(model.methods[0], model.methods[1]);
    let nu = model.methods[0].nu().unwrap();
    assert!(nu > 2.0 && nu < 8.0, "pooled nu {}", nu);

    // One extra free parameter for nu: (6 + 10 - 1 + 1) + 2 * 12 - 1
    assert_relative_eq!(model.log_likelihood().unwrap().df, 39.0);
}
