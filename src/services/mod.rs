pub mod recommendation;
pub mod serving;
pub mod store;
pub mod training;
