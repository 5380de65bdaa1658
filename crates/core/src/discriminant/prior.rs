use crate::error::{MatvarError, Result};

/// Check a prior against `n_groups`: right length, finite, non-negative and
/// summing to one once rounded to five decimals.
pub(crate) fn validate_prior(prior: &[f64], n_groups: usize) -> Result<()> {
    if prior.len() != n_groups {
        return Err(MatvarError::Validation(format!(
            "prior has {} entries but there are {} groups",
            prior.len(),
            n_groups
        )));
    }
    if prior.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(MatvarError::Validation(
            "prior probabilities must be finite and non-negative".into(),
        ));
    }
    let sum: f64 = prior.iter().sum();
    if (sum * 1e5).round() != 1e5 {
        return Err(MatvarError::Validation(format!(
            "prior probabilities must sum to 1, got {}",
            sum
        )));
    }
    Ok(())
}

/// Group proportions n_k / N.
pub(crate) fn proportions(counts: &[usize]) -> Vec<f64> {
    let total: usize = counts.iter().sum();
    counts
        .iter()
        .map(|&c| c as f64 / total.max(1) as f64)
        .collect()
}

/// Keep the entries at `keep` and renormalize them to sum to one.
pub(crate) fn restrict(prior: &[f64], keep: &[usize]) -> Result<Vec<f64>> {
    let kept: Vec<f64> = keep.iter().map(|&k| prior[k]).collect();
    let total: f64 = kept.iter().sum();
    if total <= 0.0 {
        return Err(MatvarError::Validation(
            "prior puts no mass on any non-empty group".into(),
        ));
    }
    Ok(kept.into_iter().map(|p| p / total).collect())
}
