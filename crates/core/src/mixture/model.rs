use crate::data::MatrixStack;
use crate::density::{CovFactors, MatrixDensity, Method};
use crate::diagnostics::{CovStructure, LogLikelihood, ParameterCount};
use crate::error::Result;
use crate::matrix::dense::{normalize_log_rows, row_argmax};
use crate::types::DenseMatrix;

/// One fitted component of a mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureComponent {
    pub mean: DenseMatrix,
    pub factors: CovFactors,
    /// Mixing proportion.
    pub proportion: f64,
    pub method: Method,
}

/// How the EM loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixtureStatus {
    Converged,
    MaxIterReached,
}

/// A fitted finite mixture of matrix-variate distributions.
#[derive(Debug, Clone)]
pub struct MixtureModel {
    pub components: Vec<MixtureComponent>,
    /// Posterior component probabilities of the training data (n x K).
    pub responsibilities: DenseMatrix,
    /// Hard assignment: most probable component of every observation.
    pub clusters: Vec<usize>,
    /// Log-likelihood after every E-step, starting values first.
    pub log_likelihood_trace: Vec<f64>,
    pub status: MixtureStatus,
    /// Number of EM iterations (M-steps) performed.
    pub n_iterations: usize,
    pub row_mean: bool,
    pub col_mean: bool,
    pub nu_estimated: bool,
    pub(crate) n_obs: usize,
    pub(crate) dims: (usize, usize),
}

/// Soft and hard component assignments of new data.
#[derive(Debug, Clone)]
pub struct MixturePrediction {
    pub posterior: DenseMatrix,
    pub clusters: Vec<usize>,
}

impl MixtureModel {
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn converged(&self) -> bool {
        self.status == MixtureStatus::Converged
    }

    pub fn proportions(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.proportion).collect()
    }

    /// Posterior component probabilities of `data`.
    pub fn predict(&self, data: &MatrixStack) -> Result<MixturePrediction> {
        data.ensure_dims(self.dims, "mixture model")?;
        let densities = self
            .components
            .iter()
            .map(|c| MatrixDensity::new(&c.mean, &c.factors, c.method))
            .collect::<Result<Vec<_>>>()?;

        let mut posterior = DenseMatrix::from_fn(data.len(), self.n_components(), |i, k| {
            self.components[k].proportion.ln() + densities[k].log_density(&data.as_slice()[i])
        });
        normalize_log_rows(&mut posterior)?;
        let clusters = row_argmax(&posterior);
        Ok(MixturePrediction { posterior, clusters })
    }

    /// Final log-likelihood with the parameter count of K unstructured
    /// components.
    pub fn log_likelihood(&self) -> LogLikelihood {
        let (p, q) = self.dims;
        let has_t = self.components.iter().any(|c| matches!(c.method, Method::T { .. }));
        let count = ParameterCount {
            p,
            q,
            row_structure: CovStructure::Unstructured,
            col_structure: CovStructure::Unstructured,
            n_groups: self.n_components(),
            n_cov_blocks: self.n_components(),
            nu_free: usize::from(has_t && self.nu_estimated),
            row_mean: self.row_mean,
            col_mean: self.col_mean,
        };
        LogLikelihood {
            value: self.log_likelihood_trace.last().copied().unwrap_or(f64::NEG_INFINITY),
            df: count.degrees_of_freedom(),
            n_obs: self.n_obs,
        }
    }
}
