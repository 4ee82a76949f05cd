use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocketError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job queue is full")]
    QueueFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DocketError>;
