/// Log-likelihood of a fitted model together with the bookkeeping needed for
/// information criteria.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLikelihood {
    pub value: f64,
    /// Effective number of free parameters.
    pub df: f64,
    pub n_obs: usize,
}

impl LogLikelihood {
    /// AIC = -2 * logL + 2 * df.
    pub fn aic(&self) -> f64 {
        -2.0 * self.value + 2.0 * self.df
    }

    /// BIC = -2 * logL + df * ln(n).
    pub fn bic(&self) -> f64 {
        -2.0 * self.value + self.df * (self.n_obs as f64).ln()
    }

    /// Corrected AIC (AICc) for small sample sizes.
    pub fn aicc(&self) -> f64 {
        let n = self.n_obs as f64;
        self.aic() + 2.0 * self.df * (self.df + 1.0) / (n - self.df - 1.0)
    }
}
