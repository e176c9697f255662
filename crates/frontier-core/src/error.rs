use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Empty candidate set: {0}")]
    EmptyCandidateSet(String),

    #[error("Singular system: {0}")]
    SingularSystem(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FrontierError {
    fn from(e: serde_json::Error) -> Self {
        FrontierError::SerializationError(e.to_string())
    }
}
