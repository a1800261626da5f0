pub mod metrics;
pub mod parse;
pub mod rating;
pub mod recommendation;
