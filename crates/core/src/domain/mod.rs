pub mod contract;
pub mod opportunity;
pub mod recommendation;
