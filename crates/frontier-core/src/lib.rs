pub mod error;
pub mod linalg;
pub mod returns;
pub mod types;

#[cfg(feature = "sampling")]
pub mod sampling;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "matching")]
pub mod matching;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::FrontierError;
pub use types::*;

/// Standard result type for all frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;
