pub mod matrix;
pub mod statistics;
