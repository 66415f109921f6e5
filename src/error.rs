use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
    #[error("invalid message: {0}")]
    Validation(String),
    #[error("storage inconsistency: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
