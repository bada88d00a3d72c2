pub mod filter;
pub mod rank;

pub use filter::FilterConstraints;
pub use rank::{rank, RankingStrategy};
