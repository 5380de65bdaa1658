use rayon::prelude::*;

use crate::data::{GroupLabels, MatrixStack};
use crate::density::{CovFactors, Method};
use crate::error::{MatvarError, Result};
use crate::fit::{
    check_degenerate, fit_matrix_normal, fit_matrix_t, weighted_mean, FitOptions, FittedParams, TState,
};
use crate::types::DenseMatrix;

use super::model::{DiscriminantKind, DiscriminantModel, GroupCovariance};
use super::prior::{proportions, restrict, validate_prior};

/// Stopping rule of the pooled matrix-t loop.
const POOLED_TOL: f64 = 1e-7;
const POOLED_MAX_ITER: usize = 10_000;

/// Fit a linear discriminant rule (shared U, V, scale).
///
/// `prior` defaults to the group proportions.
pub fn fit_lda(
    stack: &MatrixStack,
    labels: &GroupLabels,
    prior: Option<&[f64]>,
    method: Method,
) -> Result<DiscriminantModel> {
    let mut builder = DiscriminantBuilder::new().data(stack).labels(labels).method(method);
    if let Some(p) = prior {
        builder = builder.prior(p.to_vec());
    }
    builder.fit_lda()
}

/// Fit a quadratic discriminant rule (one U, V, scale per group).
pub fn fit_qda(
    stack: &MatrixStack,
    labels: &GroupLabels,
    prior: Option<&[f64]>,
    method: Method,
) -> Result<DiscriminantModel> {
    let mut builder = DiscriminantBuilder::new().data(stack).labels(labels).method(method);
    if let Some(p) = prior {
        builder = builder.prior(p.to_vec());
    }
    builder.fit_qda()
}

/// Builder for [`DiscriminantModel`]s.
///
/// ```no_run
/// use matvar_core::data::{GroupLabels, MatrixStack};
/// use matvar_core::density::Method;
/// use matvar_core::discriminant::DiscriminantBuilder;
///
/// # fn demo(stack: &MatrixStack, labels: &GroupLabels) -> matvar_core::error::Result<()> {
/// let model = DiscriminantBuilder::new()
///     .data(stack)
///     .labels(labels)
///     .method(Method::T { nu: 5.0 })
///     .group_nu(vec![5.0, 10.0])
///     .fit_qda()?;
/// let pred = model.predict(None, None)?;
/// # Ok(())
/// # }
/// ```
pub struct DiscriminantBuilder<'a> {
    stack: Option<&'a MatrixStack>,
    labels: Option<&'a GroupLabels>,
    prior: Option<Vec<f64>>,
    method: Method,
    group_nu: Option<Vec<f64>>,
    estimate_nu: bool,
    row_mean: bool,
    col_mean: bool,
    degenerate_tol: f64,
    tol: f64,
    max_iter: usize,
}

impl<'a> Default for DiscriminantBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated groups of a training set.
struct Groups {
    levels: Vec<String>,
    dropped: Vec<String>,
    prior: Vec<f64>,
    counts: Vec<usize>,
    /// Observation indices of each retained group.
    members: Vec<Vec<usize>>,
    /// Retained group index of every observation.
    codes: Vec<usize>,
    /// Positions of the retained groups among the declared levels.
    kept: Vec<usize>,
}

impl<'a> DiscriminantBuilder<'a> {
    /// Defaults: normal family, group-proportion prior, degenerate standard-deviation
    /// tolerance 1e-4, fit tolerance 1e-7, at most 1000 iterations per fit.
    pub fn new() -> Self {
        Self {
            stack: None,
            labels: None,
            prior: None,
            method: Method::Normal,
            group_nu: None,
            estimate_nu: false,
            row_mean: false,
            col_mean: false,
            degenerate_tol: 1e-4,
            tol: 1e-7,
            max_iter: 1000,
        }
    }

    pub fn data(mut self, stack: &'a MatrixStack) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Group of each observation; must have the same length as the data.
    pub fn labels(mut self, labels: &'a GroupLabels) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Prior over the declared levels (default: group proportions).
    pub fn prior(mut self, prior: Vec<f64>) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Per-group degrees of freedom for QDA with the t family: one per
    /// declared level, or a single value for all.
    pub fn group_nu(mut self, nu: Vec<f64>) -> Self {
        self.group_nu = Some(nu);
        self
    }

    /// Estimate nu instead of holding it fixed (t family only).
    pub fn estimate_nu(mut self, on: bool) -> Self {
        self.estimate_nu = on;
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

    /// Cells whose within-group standard deviation is below this are rejected (default: 1e-4).
    pub fn degenerate_tolerance(mut self, tol: f64) -> Self {
        self.degenerate_tol = tol;
        self
    }

    /// Convergence tolerance of the underlying fits (default: 1e-7).
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Iteration cap of the underlying fits (default: 1000).
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    fn fit_options(&self) -> FitOptions {
        FitOptions::new()
            .row_mean(self.row_mean)
            .col_mean(self.col_mean)
            .tolerance(self.tol)
            .max_iterations(self.max_iter)
            .estimate_nu(self.estimate_nu)
    }

    /// Validate inputs and resolve the retained groups and their prior.
    fn groups(&self) -> Result<(&'a MatrixStack, Groups)> {
        let stack = self
            .stack
            .ok_or_else(|| MatvarError::Validation("no data provided".into()))?;
        let labels = self
            .labels
            .ok_or_else(|| MatvarError::Validation("no group labels provided".into()))?;

        if labels.len() != stack.len() {
            return Err(MatvarError::Validation(format!(
                "{} labels for {} observations",
                labels.len(),
                stack.len()
            )));
        }
        self.method.validate()?;
        if let Some(prior) = &self.prior {
            validate_prior(prior, labels.n_levels())?;
        }

        let all_counts = labels.counts();
        let names = labels.level_names();
        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for (k, &count) in all_counts.iter().enumerate() {
            if count > 0 {
                kept.push(k);
            } else {
                log::warn!("group '{}' has no observations and is dropped", names[k]);
                dropped.push(names[k].clone());
            }
        }
        if kept.is_empty() {
            return Err(MatvarError::Validation("no non-empty groups".into()));
        }

        let counts: Vec<usize> = kept.iter().map(|&k| all_counts[k]).collect();
        let prior = match &self.prior {
            Some(p) => restrict(p, &kept)?,
            None => proportions(&counts),
        };

        let mut remap = vec![usize::MAX; labels.n_levels()];
        for (new, &old) in kept.iter().enumerate() {
            remap[old] = new;
        }
        let codes: Vec<usize> = labels.codes().iter().map(|&c| remap[c]).collect();
        let mut members = vec![Vec::new(); kept.len()];
        for (i, &g) in codes.iter().enumerate() {
            members[g].push(i);
        }

        Ok((
            stack,
            Groups {
                levels: kept.iter().map(|&k| names[k].clone()).collect(),
                dropped,
                prior,
                counts,
                members,
                codes,
                kept,
            },
        ))
    }

    /// Group means by indicator-weighted averaging, then the degenerate check
    /// on within-group residuals.
    fn group_means(&self, stack: &MatrixStack, groups: &Groups) -> Result<(Vec<DenseMatrix>, Vec<DenseMatrix>)> {
        let means: Vec<DenseMatrix> = (0..groups.levels.len())
            .map(|g| {
                let indicator: Vec<f64> = groups.codes.iter().map(|&c| if c == g { 1.0 } else { 0.0 }).collect();
                weighted_mean(stack, &indicator, self.row_mean, self.col_mean)
            })
            .collect();

        let resid: Vec<DenseMatrix> = stack
            .iter()
            .zip(&groups.codes)
            .map(|(x, &g)| x - &means[g])
            .collect();
        check_degenerate(&resid, &vec![1.0; resid.len()], self.degenerate_tol)?;
        Ok((means, resid))
    }

    /// Fit a linear discriminant rule.
    ///
    /// Normal: one flip-flop fit on the within-group residuals with the mean
    /// held at zero. t: starting from that fit, alternate one ECM pass per
    /// group (from the shared factors) with prior-weighted averaging of
    /// U, V, scale (and nu when estimated) until the summed squared change
    /// falls below 1e-7.
    pub fn fit_lda(self) -> Result<DiscriminantModel> {
        let (stack, groups) = self.groups()?;
        let (p, q) = stack.dims();
        let (mut means, resid) = self.group_means(stack, &groups)?;

        let pooled = fit_matrix_normal(
            &MatrixStack::new(resid)?,
            &self
                .fit_options()
                .estimate_nu(false)
                .fixed_mean(DenseMatrix::zeros(p, q)),
        )?;
        let mut converged = pooled.converged;
        let mut shared = pooled.factors;
        let mut method = self.method;

        if let Method::T { nu } = self.method {
            let (factors, nu, means_t, ok) = self.pooled_t(stack, &groups, means, shared, nu)?;
            shared = factors;
            means = means_t;
            method = Method::T { nu };
            converged &= ok;
        }

        Ok(DiscriminantModel {
            kind: DiscriminantKind::Linear,
            methods: vec![method; groups.levels.len()],
            levels: groups.levels,
            prior: groups.prior,
            counts: groups.counts,
            means,
            covariance: GroupCovariance::Shared(shared),
            n_obs: stack.len(),
            row_mean: self.row_mean,
            col_mean: self.col_mean,
            nu_estimated: self.estimate_nu && method.nu().is_some(),
            converged,
            dropped_levels: groups.dropped,
            training: stack.clone(),
            codes: groups.codes,
        })
    }

    fn pooled_t(
        &self,
        stack: &MatrixStack,
        groups: &Groups,
        mut means: Vec<DenseMatrix>,
        mut shared: CovFactors,
        mut nu: f64,
    ) -> Result<(CovFactors, f64, Vec<DenseMatrix>, bool)> {
        let options = self.fit_options();
        let group_stacks = groups
            .members
            .iter()
            .map(|idx| stack.select(idx))
            .collect::<Result<Vec<_>>>()?;

        for iter in 0..POOLED_MAX_ITER {
            let updates = group_stacks
                .par_iter()
                .zip(means.par_iter())
                .map(|(group, mean)| -> Result<(CovFactors, f64, DenseMatrix)> {
                    let mut state = TState::from_factors(mean.clone(), &shared, nu, &options);
                    let ones = vec![1.0; group.len()];
                    state.pass(group, &ones, group.len() as f64)?;
                    Ok((state.factors()?, state.nu, state.mean))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut u = DenseMatrix::zeros(shared.u.nrows(), shared.u.ncols());
            let mut v = DenseMatrix::zeros(shared.v.nrows(), shared.v.ncols());
            let mut scale = 0.0;
            let mut new_nu = 0.0;
            for ((factors, group_nu, _), &w) in updates.iter().zip(&groups.prior) {
                u += &factors.u * w;
                v += &factors.v * w;
                scale += w * factors.scale;
                new_nu += w * group_nu;
            }
            let next = CovFactors { u, v, scale };
            let mut change = next.squared_change(&shared);
            if self.estimate_nu {
                change += (new_nu - nu).powi(2);
                nu = new_nu;
            }
            shared = next;
            means = updates.into_iter().map(|(_, _, m)| m).collect();

            log::debug!("pooled t iteration {}: change = {:.3e}, nu = {:.4}", iter + 1, change, nu);
            if change < POOLED_TOL {
                return Ok((shared, nu, means, true));
            }
        }

        log::warn!(
            "pooled matrix-t discriminant fit did not converge after {} iterations",
            POOLED_MAX_ITER
        );
        Ok((shared, nu, means, false))
    }

    /// Fit a quadratic discriminant rule: an independent fit per group, run
    /// in parallel.
    pub fn fit_qda(self) -> Result<DiscriminantModel> {
        let (stack, groups) = self.groups()?;
        let group_nu = self.resolve_group_nu(&groups)?;

        let options = self.fit_options().degenerate_tolerance(self.degenerate_tol);
        let group_stacks = groups
            .members
            .iter()
            .map(|idx| stack.select(idx))
            .collect::<Result<Vec<_>>>()?;

        let fits: Vec<FittedParams> = group_stacks
            .par_iter()
            .zip(group_nu.par_iter())
            .map(|(group, nu)| match nu {
                Some(nu) => fit_matrix_t(group, *nu, &options),
                None => fit_matrix_normal(group, &options),
            })
            .collect::<Result<Vec<_>>>()?;

        let converged = fits.iter().all(|f| f.converged);
        let mut means = Vec::with_capacity(fits.len());
        let mut factors = Vec::with_capacity(fits.len());
        let mut methods = Vec::with_capacity(fits.len());
        for fit in fits {
            methods.push(fit.method);
            factors.push(fit.factors);
            means.push(fit.mean);
        }

        Ok(DiscriminantModel {
            kind: DiscriminantKind::Quadratic,
            levels: groups.levels,
            prior: groups.prior,
            counts: groups.counts,
            means,
            covariance: GroupCovariance::PerGroup(factors),
            methods,
            n_obs: stack.len(),
            row_mean: self.row_mean,
            col_mean: self.col_mean,
            nu_estimated: self.estimate_nu && self.method.nu().is_some(),
            converged,
            dropped_levels: groups.dropped,
            training: stack.clone(),
            codes: groups.codes,
        })
    }

    /// nu of each retained group (`None` for the normal family).
    fn resolve_group_nu(&self, groups: &Groups) -> Result<Vec<Option<f64>>> {
        let Method::T { nu } = self.method else {
            return Ok(vec![None; groups.levels.len()]);
        };
        let declared = groups.kept.len() + groups.dropped.len();
        let per_level = match &self.group_nu {
            None => vec![nu; declared],
            Some(v) if v.len() == 1 => vec![v[0]; declared],
            Some(v) if v.len() == declared => v.clone(),
            Some(v) => {
                return Err(MatvarError::Validation(format!(
                    "{} degrees of freedom given for {} groups",
                    v.len(),
                    declared
                )))
            }
        };
        groups
            .kept
            .iter()
            .map(|&k| -> Result<Option<f64>> {
                let nu = per_level[k];
                Method::T { nu }.validate()?;
                Ok(Some(nu))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::sample_matrix_normal;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_groups(n: usize, seed: u64) -> (MatrixStack, GroupLabels) {
        let mut rng = StdRng::seed_from_u64(seed);
        let u = DenseMatrix::identity(2, 2);
        let v = DenseMatrix::identity(2, 2);
        let a = sample_matrix_normal(&DenseMatrix::zeros(2, 2), &u, &v, n, &mut rng).unwrap();
        let b = sample_matrix_normal(&DenseMatrix::from_element(2, 2, 2.0), &u, &v, n, &mut rng).unwrap();
        let mut all: Vec<DenseMatrix> = a.iter().cloned().collect();
        all.extend(b.iter().cloned());
        let mut names = vec!["a"; n];
        names.extend(vec!["b"; n]);
        (MatrixStack::new(all).unwrap(), GroupLabels::new(&names))
    }

    #[test]
    fn test_default_prior_is_proportions() {
        let (stack, labels) = two_groups(20, 1);
        let model = fit_lda(&stack, &labels, None, Method::Normal).unwrap();
        assert_eq!(model.prior, vec![0.5, 0.5]);
        assert_eq!(model.counts, vec![20, 20]);
        assert_eq!(model.kind, DiscriminantKind::Linear);
    }

    #[test]
    fn test_empty_level_dropped() {
        let (stack, _) = two_groups(10, 2);
        let mut names = vec!["a"; 10];
        names.extend(vec!["b"; 10]);
        let labels = GroupLabels::with_levels(&names, &["a", "ghost", "b"]).unwrap();
        let model = DiscriminantBuilder::new()
            .data(&stack)
            .labels(&labels)
            .prior(vec![0.25, 0.5, 0.25])
            .fit_lda()
            .unwrap();
        assert_eq!(model.levels, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(model.dropped_levels, vec!["ghost".to_string()]);
        assert_eq!(model.prior, vec![0.5, 0.5]);
    }

    #[test]
    fn test_label_length_checked() {
        let (stack, _) = two_groups(5, 3);
        let labels = GroupLabels::new(&["a", "b"]);
        assert!(matches!(
            fit_qda(&stack, &labels, None, Method::Normal),
            Err(MatvarError::Validation(_))
        ));
    }

    #[test]
    fn test_group_nu_broadcast_and_length() {
        let (stack, labels) = two_groups(40, 4);
        let model = DiscriminantBuilder::new()
            .data(&stack)
            .labels(&labels)
            .method(Method::T { nu: 6.0 })
            .group_nu(vec![3.0, 9.0])
            .fit_qda()
            .unwrap();
        assert_eq!(model.methods, vec![Method::T { nu: 3.0 }, Method::T { nu: 9.0 }]);

        let err = DiscriminantBuilder::new()
            .data(&stack)
            .labels(&labels)
            .method(Method::T { nu: 6.0 })
            .group_nu(vec![3.0, 9.0, 1.0])
            .fit_qda();
        assert!(err.is_err());
    }

    #[test]
    fn test_pooled_t_shares_nu() {
        let (stack, labels) = two_groups(40, 5);
        let model = fit_lda(&stack, &labels, None, Method::T { nu: 5.0 }).unwrap();
        assert!(model.converged);
        assert_eq!(model.methods[0], model.methods[1]);
        assert_eq!(model.methods[0], Method::T { nu: 5.0 });
        match &model.covariance {
            GroupCovariance::Shared(f) => {
                assert!((f.u[(0, 0)] - 1.0).abs() < 1e-12);
                assert!((f.v[(0, 0)] - 1.0).abs() < 1e-12);
            }
            other => panic!("expected shared covariance, got {:?}", other),
        }
    }
}
