use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatvarError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    /// Cells whose variance vanishes, as 0-based column-major linear indices.
    #[error("Variable(s) appear to be constant at position(s) {positions:?}")]
    DegenerateVariable { positions: Vec<usize> },

    #[error("Singular matrix encountered in {context}")]
    SingularMatrix { context: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Mixture fit failed at iteration {iteration}: {reason}")]
    MixtureFailed { iteration: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, MatvarError>;
