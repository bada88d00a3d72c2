pub mod distribution;
pub mod scorer;

pub use distribution::distribution;
pub use scorer::{annotate, classify, score};
