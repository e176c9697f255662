pub mod allocate;
pub mod frontier;
pub mod matching;
pub mod sample;
