use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChimeError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChimeError>;
