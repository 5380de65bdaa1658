use crate::data::MatrixStack;
use crate::density::{CovFactors, MatrixDensity, Method};
use crate::diagnostics::{CovStructure, LogLikelihood, ParameterCount};
use crate::error::Result;
use crate::types::DenseMatrix;

/// Linear (shared covariance) or quadratic (per-group covariance) rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminantKind {
    Linear,
    Quadratic,
}

/// Covariance factors of a discriminant model.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupCovariance {
    /// One (U, V, scale) shared by all groups.
    Shared(CovFactors),
    /// One (U, V, scale) per group, in level order.
    PerGroup(Vec<CovFactors>),
}

impl GroupCovariance {
    /// Factors used for group `k`.
    pub fn group(&self, k: usize) -> &CovFactors {
        match self {
            GroupCovariance::Shared(f) => f,
            GroupCovariance::PerGroup(fs) => &fs[k],
        }
    }

    pub fn n_blocks(&self) -> usize {
        match self {
            GroupCovariance::Shared(_) => 1,
            GroupCovariance::PerGroup(fs) => fs.len(),
        }
    }
}

/// A fitted linear or quadratic discriminant rule for matrix observations.
///
/// Groups are the non-empty levels of the training labels, in level order.
#[derive(Debug, Clone)]
pub struct DiscriminantModel {
    pub kind: DiscriminantKind,
    /// Names of the retained groups.
    pub levels: Vec<String>,
    /// Prior probabilities (sum to one).
    pub prior: Vec<f64>,
    /// Training observations per group.
    pub counts: Vec<usize>,
    /// Group mean matrices.
    pub means: Vec<DenseMatrix>,
    pub covariance: GroupCovariance,
    /// Family of each group (one entry per group; equal for LDA).
    pub methods: Vec<Method>,
    /// Total number of training observations.
    pub n_obs: usize,
    pub row_mean: bool,
    pub col_mean: bool,
    /// Whether nu was estimated rather than given.
    pub nu_estimated: bool,
    /// Whether every underlying fit met its stopping rule.
    pub converged: bool,
    /// Declared levels that had no observations and were dropped.
    pub dropped_levels: Vec<String>,
    pub(crate) training: MatrixStack,
    /// Group index of every training observation.
    pub(crate) codes: Vec<usize>,
}

impl DiscriminantModel {
    pub fn n_groups(&self) -> usize {
        self.levels.len()
    }

    /// (p, q) of the observations the model was trained on.
    pub fn dims(&self) -> (usize, usize) {
        self.training.dims()
    }

    /// Group index of every training observation.
    pub fn training_codes(&self) -> &[usize] {
        &self.codes
    }

    /// Fitted densities of all groups, in level order.
    pub fn densities(&self) -> Result<Vec<MatrixDensity>> {
        self.means
            .iter()
            .enumerate()
            .map(|(k, mean)| MatrixDensity::new(mean, self.covariance.group(k), self.methods[k]))
            .collect()
    }

    /// Training log-likelihood: each observation evaluated under its own
    /// group's fitted density, with the free-parameter count for AIC/BIC.
    pub fn log_likelihood(&self) -> Result<LogLikelihood> {
        let densities = self.densities()?;
        let value = self
            .training
            .iter()
            .zip(&self.codes)
            .map(|(x, &k)| densities[k].log_density(x))
            .sum();

        let (p, q) = self.dims();
        let has_t = self.methods.iter().any(|m| matches!(m, Method::T { .. }));
        let count = ParameterCount {
            p,
            q,
            row_structure: CovStructure::Unstructured,
            col_structure: CovStructure::Unstructured,
            n_groups: self.n_groups(),
            n_cov_blocks: self.covariance.n_blocks(),
            nu_free: usize::from(has_t && self.nu_estimated),
            row_mean: self.row_mean,
            col_mean: self.col_mean,
        };

        Ok(LogLikelihood {
            value,
            df: count.degrees_of_freedom(),
            n_obs: self.n_obs,
        })
    }
}
