pub mod active_set;
pub mod frontier;
