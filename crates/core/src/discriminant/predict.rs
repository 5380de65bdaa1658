use crate::data::MatrixStack;
use crate::density::MatrixDensity;
use crate::error::Result;
use crate::matrix::dense::{normalize_log_rows, row_argmax};
use crate::types::DenseMatrix;

use super::model::{DiscriminantModel, GroupCovariance};
use super::prior::validate_prior;

/// Classification of a set of observations.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// MAP group name of each observation.
    pub classes: Vec<String>,
    /// MAP group index of each observation.
    pub class_codes: Vec<usize>,
    /// Posterior probabilities, n x K; rows sum to one.
    pub posterior: DenseMatrix,
}

impl DiscriminantModel {
    /// Posterior group probabilities and MAP classes.
    ///
    /// With `data = None` the training observations are classified. `prior`
    /// overrides the model's prior and is validated the same way.
    pub fn predict(&self, data: Option<&MatrixStack>, prior: Option<&[f64]>) -> Result<Prediction> {
        let data = data.unwrap_or(&self.training);
        data.ensure_dims(self.dims(), "discriminant model")?;

        let prior = match prior {
            Some(pr) => {
                validate_prior(pr, self.n_groups())?;
                pr
            }
            None => self.prior.as_slice(),
        };

        let densities = self.densities()?;
        // A shared normal covariance scores through the linear discriminant,
        // which stays finite and exact far from every mean.
        let linear: Option<Vec<(DenseMatrix, f64)>> = match self.covariance {
            GroupCovariance::Shared(_) => densities.iter().map(MatrixDensity::linear_coefficients).collect(),
            GroupCovariance::PerGroup(_) => None,
        };
        let obs = data.as_slice();
        let mut scores = DenseMatrix::from_fn(data.len(), self.n_groups(), |i, k| {
            let log_f = match &linear {
                Some(coefs) => coefs[k].0.dot(&obs[i]) + coefs[k].1,
                None => densities[k].log_density(&obs[i]),
            };
            log_f + prior[k].ln()
        });
        normalize_log_rows(&mut scores)?;

        let class_codes = row_argmax(&scores);
        let classes = class_codes.iter().map(|&k| self.levels[k].clone()).collect();

        Ok(Prediction {
            classes,
            class_codes,
            posterior: scores,
        })
    }

    /// Classify a single observation.
    pub fn predict_matrix(&self, x: &DenseMatrix, prior: Option<&[f64]>) -> Result<Prediction> {
        let stack = MatrixStack::from_matrix(x.clone())?;
        self.predict(Some(&stack), prior)
    }
}
