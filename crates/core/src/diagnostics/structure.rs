/// Covariance structure tag of a row or column factor.
///
/// Only `Unstructured` and `Identity` are produced by the fitters in this
/// crate; the remaining tags exist for parameter counting when comparing
/// against models fitted elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovStructure {
    #[default]
    Unstructured,
    Ar1,
    CompoundSymmetry,
    /// Identity (or otherwise fixed) factor. Counted as one parameter by
    /// convention; the variance itself is carried by the shared scale.
    Identity,
    /// Free correlations plus one variance.
    Correlation,
}

impl CovStructure {
    /// Number of free parameters of a `dim x dim` factor with this structure.
    pub fn n_params(&self, dim: usize) -> usize {
        match self {
            CovStructure::Unstructured => dim * (dim + 1) / 2,
            CovStructure::Ar1 | CovStructure::CompoundSymmetry => 2,
            CovStructure::Identity => 1,
            CovStructure::Correlation => dim * dim.saturating_sub(1) / 2 + 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CovStructure::Unstructured => "unstructured",
            CovStructure::Ar1 => "AR(1)",
            CovStructure::CompoundSymmetry => "CS",
            CovStructure::Identity => "I",
            CovStructure::Correlation => "correlation",
        }
    }
}

/// Inputs to the degrees-of-freedom count of a discriminant or mixture model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterCount {
    pub p: usize,
    pub q: usize,
    pub row_structure: CovStructure,
    pub col_structure: CovStructure,
    /// Number of groups/components carrying a mean.
    pub n_groups: usize,
    /// Number of independently estimated covariance blocks (1 for LDA,
    /// `n_groups` for QDA and mixtures).
    pub n_cov_blocks: usize,
    /// Estimated degrees-of-freedom parameters per covariance block (0 or 1).
    pub nu_free: usize,
    pub row_mean: bool,
    pub col_mean: bool,
}

impl ParameterCount {
    /// Number of free mean parameters per group: p*q, halved when a row- or
    /// column-mean constraint is active.
    pub fn mean_params(&self) -> f64 {
        let full = (self.p * self.q) as f64;
        if self.row_mean || self.col_mean {
            full / 2.0
        } else {
            full
        }
    }

    /// ```text
    /// df = blocks * (k(U) + k(V) - 1 + nu_free) + groups * mean_params - 1
    /// ```
    /// The `- 1` inside the block removes the scale shared between U and V;
    /// the trailing `- 1` is the prior simplex constraint.
    pub fn degrees_of_freedom(&self) -> f64 {
        let per_block = self.row_structure.n_params(self.p) + self.col_structure.n_params(self.q)
            - 1
            + self.nu_free;
        (self.n_cov_blocks * per_block) as f64 + self.n_groups as f64 * self.mean_params() - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_structure_counts() {
        assert_eq!(CovStructure::Unstructured.n_params(3), 6);
        assert_eq!(CovStructure::Ar1.n_params(5), 2);
        assert_eq!(CovStructure::CompoundSymmetry.n_params(5), 2);
        assert_eq!(CovStructure::Identity.n_params(4), 1);
        assert_eq!(CovStructure::Correlation.n_params(4), 7);
        assert_eq!(CovStructure::Correlation.n_params(1), 1);
    }

    #[test]
    fn test_lda_degrees_of_freedom() {
        // 3x4, two groups, unstructured: 6 + 10 - 1 + 0 + 2*12 - 1 = 38
        let count = ParameterCount {
            p: 3,
            q: 4,
            row_structure: CovStructure::Unstructured,
            col_structure: CovStructure::Unstructured,
            n_groups: 2,
            n_cov_blocks: 1,
            nu_free: 0,
            row_mean: false,
            col_mean: false,
        };
        assert_relative_eq!(count.degrees_of_freedom(), 38.0);

        let constrained = ParameterCount {
            row_mean: true,
            nu_free: 1,
            ..count
        };
        // 6 + 10 - 1 + 1 + 2*6 - 1 = 27
        assert_relative_eq!(constrained.degrees_of_freedom(), 27.0);
    }

    #[test]
    fn test_per_group_blocks() {
        let count = ParameterCount {
            p: 2,
            q: 2,
            row_structure: CovStructure::Unstructured,
            col_structure: CovStructure::Identity,
            n_groups: 3,
            n_cov_blocks: 3,
            nu_free: 0,
            row_mean: false,
            col_mean: false,
        };
        // 3 * (3 + 1 - 1) + 3*4 - 1 = 20
        assert_relative_eq!(count.degrees_of_freedom(), 20.0);
    }
}
