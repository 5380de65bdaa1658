mod factor;
mod stack;

pub use factor::GroupLabels;
pub use stack::MatrixStack;
