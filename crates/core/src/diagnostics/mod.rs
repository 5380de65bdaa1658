mod convergence;
mod information;
mod structure;

pub use convergence::{ConvergenceCriterion, ConvergenceMonitor, IterationRecord};
pub use information::LogLikelihood;
pub use structure::{CovStructure, ParameterCount};
