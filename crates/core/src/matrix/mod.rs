pub mod dense;

pub use dense::{inverse_spd, log_determinant_spd, trace, SpdFactor};
